//! Playback status model
//!
//! `PlayerStatus` is owned exclusively by the [`StreamManager`]; nothing else
//! mutates it. Stream-type transitions replace the whole snapshot (carrying
//! the volume over), while metrics refreshes mutate fields in place.
//!
//! [`StreamManager`]: crate::manager::StreamManager

use serde::{Deserialize, Serialize};

/// Which kind of source is currently feeding the renderer.
///
/// Exactly one is active at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamType {
    Idle,
    Metadata,
    Whip,
}

impl StreamType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Metadata => "METADATA",
            Self::Whip => "WHIP",
        }
    }
}

/// Snapshot of the renderer state as tracked by the stream manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub stream_type: StreamType,
    pub title: Option<String>,
    pub is_playing: bool,
    /// Volume in `[0.0, 1.0]`. Survives stream-type transitions.
    pub volume: f64,
    /// Playback position in seconds, when known.
    pub position: Option<f64>,
    /// Media duration in seconds, when known.
    pub duration: Option<f64>,
    pub is_seekable: bool,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            stream_type: StreamType::Idle,
            title: None,
            is_playing: false,
            volume: 1.0,
            position: None,
            duration: None,
            is_seekable: false,
        }
    }
}

impl PlayerStatus {
    /// Fresh status for a newly started stream, carrying the volume over
    /// from the previous snapshot.
    #[must_use]
    pub fn for_stream(
        stream_type: StreamType,
        title: Option<String>,
        position: Option<f64>,
        is_seekable: bool,
        volume: f64,
    ) -> Self {
        Self {
            stream_type,
            title,
            is_playing: true,
            volume,
            position,
            duration: None,
            is_seekable,
        }
    }

    /// Idle status after a stop, preserving the given volume.
    #[must_use]
    pub fn idle_with_volume(volume: f64) -> Self {
        Self {
            volume,
            ..Self::default()
        }
    }
}
