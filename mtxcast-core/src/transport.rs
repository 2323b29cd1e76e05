//! Renderer transport contract
//!
//! The stream manager drives a rendering endpoint only through the
//! [`PlayerTransport`] trait; the concrete renderer (mpv, a test double, ...)
//! lives outside this crate. Live WebRTC tracks cross the boundary as
//! [`LiveTrack`] trait objects so the core stays independent of any
//! particular WebRTC engine.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;

/// Media track kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    #[must_use]
    pub const fn is_video(&self) -> bool {
        matches!(self, Self::Video)
    }
}

/// RTP codec parameters of an inbound live track, enough for a renderer to
/// set up a depacketizing consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtpCodecParams {
    /// MIME type, e.g. `video/H264` or `audio/opus`.
    pub mime_type: String,
    pub clock_rate: u32,
    pub payload_type: u8,
}

/// An inbound live media track handed over from an ingestion session.
///
/// `read_rtp` yields raw RTP packets until the track ends, at which point it
/// returns an error and the consumer stops.
#[async_trait]
pub trait LiveTrack: Send + Sync {
    fn kind(&self) -> TrackKind;

    fn codec(&self) -> RtpCodecParams;

    async fn read_rtp(&self) -> Result<Bytes>;
}

/// Position/duration/seekability as reported by the renderer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PlaybackMetrics {
    /// Position in seconds.
    pub position: Option<f64>,
    /// Duration in seconds.
    pub duration: Option<f64>,
    pub is_seekable: bool,
}

/// Capability contract for the rendering endpoint.
///
/// Implementations must be safe to call from concurrent tasks; the stream
/// manager serializes state-affecting calls itself but makes no further
/// guarantees.
#[async_trait]
pub trait PlayerTransport: Send + Sync {
    /// Start playback of a single muxed URL (or `file://` locator).
    async fn play_url(&self, url: &str, start_time: f64, title: Option<&str>) -> Result<()>;

    /// Start synchronized playback of separated video and audio URLs.
    async fn play_separated_streams(
        &self,
        video_url: &str,
        audio_url: &str,
        start_time: f64,
        title: Option<&str>,
    ) -> Result<()>;

    /// Attach an inbound live track as the active source.
    async fn attach_live_track(&self, track: Arc<dyn LiveTrack>) -> Result<()>;

    async fn pause(&self) -> Result<()>;

    async fn resume(&self) -> Result<()>;

    /// Seek to an absolute position in seconds.
    async fn seek(&self, position: f64) -> Result<()>;

    /// Set volume; callers pass values already clamped to `[0.0, 1.0]`.
    async fn set_volume(&self, volume: f64) -> Result<()>;

    async fn get_metrics(&self) -> Result<PlaybackMetrics>;

    async fn stop(&self) -> Result<()>;
}
