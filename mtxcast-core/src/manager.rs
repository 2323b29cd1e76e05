//! Stream orchestration
//!
//! [`StreamManager`] is the single authority over playback state. Every
//! command and status query goes through one command lock, so at most one
//! state-affecting operation is in flight at a time and the reported status
//! never races a transport call.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::resolver::{MediaSource, MetadataPayload, MetadataResolver};
use crate::status::{PlayerStatus, StreamType};
use crate::transport::{LiveTrack, PlayerTransport};

/// Title used for live ingestion sessions that carry no title of their own.
const LIVE_STREAM_TITLE: &str = "Live WHIP Stream";

/// Sole owner and mutator of [`PlayerStatus`].
///
/// Commands fully serialize on the internal lock. Metadata resolution runs
/// inside the locked section, so a slow extraction stalls concurrent
/// commands and status queries until it completes; callers must expect that.
pub struct StreamManager {
    player: Arc<dyn PlayerTransport>,
    resolver: MetadataResolver,
    state: Mutex<PlayerStatus>,
}

impl StreamManager {
    pub fn new(player: Arc<dyn PlayerTransport>, resolver: MetadataResolver) -> Self {
        Self {
            player,
            resolver,
            state: Mutex::new(PlayerStatus::default()),
        }
    }

    /// Resolve a source reference and start playback of the result.
    ///
    /// Holds the command lock across resolution and the transport call so
    /// the status transition is atomic with respect to other commands.
    pub async fn handle_metadata(&self, payload: &MetadataPayload) -> Result<PlayerStatus> {
        let mut state = self.state.lock().await;
        let resolved = self.resolver.resolve(payload).await?;
        let title = resolved.title;
        let start_time = resolved.start_time;

        match resolved.source {
            MediaSource::File { path } => {
                info!(path = %path.display(), "Resolved source pre-downloaded, playing local file");
                return self
                    .play_file_locked(&mut state, &path, start_time, title)
                    .await;
            }
            MediaSource::SeparatedStreams {
                video_url,
                audio_url,
            } => {
                self.player
                    .play_separated_streams(&video_url, &audio_url, start_time, title.as_deref())
                    .await?;
            }
            MediaSource::Url { url } => {
                self.player
                    .play_url(&url, start_time, title.as_deref())
                    .await?;
            }
        }

        *state = PlayerStatus::for_stream(
            StreamType::Metadata,
            title,
            Some(start_time),
            true,
            state.volume,
        );
        Ok(state.clone())
    }

    /// Play a local file, deriving the title from the file name if none is
    /// given.
    pub async fn handle_file(
        &self,
        path: &Path,
        start_time: f64,
        title: Option<String>,
    ) -> Result<PlayerStatus> {
        let mut state = self.state.lock().await;
        self.play_file_locked(&mut state, path, start_time, title)
            .await
    }

    /// File playback with the command lock already held.
    async fn play_file_locked(
        &self,
        state: &mut PlayerStatus,
        path: &Path,
        start_time: f64,
        title: Option<String>,
    ) -> Result<PlayerStatus> {
        if !path.exists() {
            warn!(path = %path.display(), "Requested file does not exist");
            return Err(Error::NotFound(format!(
                "file not found: {}",
                path.display()
            )));
        }

        let title = title.or_else(|| {
            path.file_name()
                .map(|name| name.to_string_lossy().into_owned())
        });

        let locator = file_locator(path)?;
        info!(locator = %locator, start_time, "Playing local file");
        self.player
            .play_url(&locator, start_time, title.as_deref())
            .await?;

        *state = PlayerStatus::for_stream(
            StreamType::Metadata,
            title,
            Some(start_time),
            true,
            state.volume,
        );
        Ok(state.clone())
    }

    /// Attach an inbound live track as the active source.
    pub async fn handle_whip_track(
        &self,
        track: Arc<dyn LiveTrack>,
        title: Option<String>,
    ) -> Result<PlayerStatus> {
        let mut state = self.state.lock().await;
        info!(codec = %track.codec().mime_type, "Attaching live track to renderer");
        self.player.attach_live_track(track).await?;

        // Live streams are not seekable and report no position or duration.
        *state = PlayerStatus::for_stream(
            StreamType::Whip,
            Some(title.unwrap_or_else(|| LIVE_STREAM_TITLE.to_string())),
            None,
            false,
            state.volume,
        );
        Ok(state.clone())
    }

    /// Start or resume playback. Issues the transport call even when
    /// already playing.
    pub async fn play(&self) -> Result<PlayerStatus> {
        let mut state = self.state.lock().await;
        self.player.resume().await?;
        state.is_playing = true;
        Ok(state.clone())
    }

    pub async fn pause(&self) -> Result<PlayerStatus> {
        let mut state = self.state.lock().await;
        self.player.pause().await?;
        state.is_playing = false;
        Ok(state.clone())
    }

    /// Seek to an absolute position. The local `position` field is not
    /// updated here; the next metrics refresh is authoritative.
    pub async fn seek(&self, position: f64) -> Result<PlayerStatus> {
        let state = self.state.lock().await;
        self.player.seek(position).await?;
        Ok(state.clone())
    }

    /// Clamp to `[0.0, 1.0]`, forward, and store the clamped value.
    pub async fn set_volume(&self, volume: f64) -> Result<PlayerStatus> {
        let mut state = self.state.lock().await;
        let volume = volume.clamp(0.0, 1.0);
        self.player.set_volume(volume).await?;
        state.volume = volume;
        Ok(state.clone())
    }

    /// Current status with position/duration/seekability refreshed from the
    /// renderer. Stream type, title, playing flag and volume are untouched.
    pub async fn current_status(&self) -> Result<PlayerStatus> {
        let mut state = self.state.lock().await;
        let metrics = self.player.get_metrics().await?;
        state.position = metrics.position;
        state.duration = metrics.duration;
        state.is_seekable = metrics.is_seekable;
        Ok(state.clone())
    }

    /// Stop playback and reset to idle, preserving the volume.
    pub async fn stop(&self) -> Result<PlayerStatus> {
        let mut state = self.state.lock().await;
        self.player.stop().await?;
        *state = PlayerStatus::idle_with_volume(state.volume);
        Ok(state.clone())
    }
}

/// Convert a local path into a `file://` locator the renderer can consume.
fn file_locator(path: &Path) -> Result<String> {
    let absolute = path
        .canonicalize()
        .map_err(|e| Error::InvalidInput(format!("cannot canonicalize {}: {e}", path.display())))?;
    url::Url::from_file_path(&absolute)
        .map(|u| u.to_string())
        .map_err(|()| Error::InvalidInput(format!("not a valid file path: {}", path.display())))
}
