//! Source resolution
//!
//! Turns an arbitrary source URL into a concretely playable descriptor via a
//! deterministic fallback chain over a [`MetadataBackend`]. The backend is a
//! collaborator (yt-dlp in production, a stub in tests); this module owns
//! only the selection logic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Request payload for metadata-driven playback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataPayload {
    pub source_url: String,
    #[serde(default)]
    pub start_time: Option<f64>,
    #[serde(default)]
    pub title: Option<String>,
}

/// A single candidate format reported by the extraction backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaFormat {
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub manifest_url: Option<String>,
    /// Video codec name, `"none"` for audio-only entries.
    #[serde(default)]
    pub vcodec: Option<String>,
    /// Audio codec name, `"none"` for video-only entries.
    #[serde(default)]
    pub acodec: Option<String>,
}

impl MediaFormat {
    /// Direct or manifest URL, whichever the backend exposed.
    #[must_use]
    pub fn playable_url(&self) -> Option<&str> {
        self.url.as_deref().or(self.manifest_url.as_deref())
    }

    fn codec_present(codec: &Option<String>) -> bool {
        matches!(codec.as_deref(), Some(c) if c != "none")
    }

    #[must_use]
    pub fn has_video(&self) -> bool {
        Self::codec_present(&self.vcodec)
    }

    #[must_use]
    pub fn has_audio(&self) -> bool {
        Self::codec_present(&self.acodec)
    }

    #[must_use]
    pub fn is_video_only(&self) -> bool {
        self.has_video() && !self.has_audio()
    }

    #[must_use]
    pub fn is_audio_only(&self) -> bool {
        self.has_audio() && !self.has_video()
    }

    #[must_use]
    pub fn is_combined(&self) -> bool {
        self.has_video() && self.has_audio()
    }
}

/// Extraction result for one source URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub title: Option<String>,
    /// Combined direct/manifest URL of the backend-selected best format.
    #[serde(default)]
    pub url: Option<String>,
    /// Formats the backend actually selected (two entries when it picked
    /// separated video and audio streams).
    #[serde(default)]
    pub requested_formats: Vec<MediaFormat>,
    /// All candidate formats.
    #[serde(default)]
    pub formats: Vec<MediaFormat>,
}

/// Capability contract for the extraction backend.
#[async_trait]
pub trait MetadataBackend: Send + Sync {
    /// Resolve a source URL into raw candidate formats without downloading.
    async fn extract_info(&self, url: &str) -> Result<MediaInfo>;

    /// Download the source to a local file; used for sites whose streams
    /// cannot be consumed directly.
    async fn download_to_file(&self, url: &str, title_hint: Option<&str>) -> Result<PathBuf>;
}

/// The playable resource a source reference resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaSource {
    /// One muxed direct/manifest URL.
    Url { url: String },
    /// Independent video and audio URLs requiring synchronized playback.
    SeparatedStreams {
        video_url: String,
        audio_url: String,
    },
    /// Pre-downloaded local file.
    File { path: PathBuf },
}

/// Output of resolution: what to play plus presentation hints.
#[derive(Debug, Clone)]
pub struct ResolvedMedia {
    pub source: MediaSource,
    pub title: Option<String>,
    pub start_time: f64,
}

/// Deterministic resolver over a metadata backend.
///
/// Fallback chain, first success wins:
/// 1. download-required host → extract, download, local file
/// 2. backend-selected separated video/audio streams
/// 3. combined direct/manifest URL on the info
/// 4. first candidate format exposing any URL (combined preferred)
pub struct MetadataResolver {
    backend: Arc<dyn MetadataBackend>,
    /// Host suffixes that require pre-download instead of direct streaming.
    predownload_hosts: Vec<String>,
}

impl MetadataResolver {
    pub fn new(backend: Arc<dyn MetadataBackend>, predownload_hosts: Vec<String>) -> Self {
        Self {
            backend,
            predownload_hosts,
        }
    }

    /// Resolve `payload.source_url` into a playable descriptor.
    ///
    /// May take seconds: the backend performs network I/O (and a full
    /// download for pre-download hosts).
    pub async fn resolve(&self, payload: &MetadataPayload) -> Result<ResolvedMedia> {
        let source_url = payload.source_url.as_str();
        let start_time = payload.start_time.unwrap_or(0.0);

        if self.requires_predownload(source_url) {
            return self.resolve_via_download(payload, start_time).await;
        }

        let info = self
            .backend
            .extract_info(source_url)
            .await
            .map_err(|e| Error::resolution("extract_info", e))?;
        let title = payload.title.clone().or_else(|| info.title.clone());

        if let Some((video_url, audio_url)) = separated_streams(&info) {
            debug!(source_url, "Resolved to separated video/audio streams");
            return Ok(ResolvedMedia {
                source: MediaSource::SeparatedStreams {
                    video_url,
                    audio_url,
                },
                title,
                start_time,
            });
        }

        if let Some(url) = info.url.clone() {
            debug!(source_url, "Resolved to combined best-format URL");
            return Ok(ResolvedMedia {
                source: MediaSource::Url { url },
                title,
                start_time,
            });
        }

        // The backend's "best" selection can be a composite the renderer
        // cannot consume; fall back to any format with a retrievable URL.
        if let Some(url) = scan_formats(&info.formats) {
            debug!(source_url, "Resolved via formats scan");
            return Ok(ResolvedMedia {
                source: MediaSource::Url { url },
                title,
                start_time,
            });
        }

        Err(Error::Resolution("no playable format".to_string()))
    }

    async fn resolve_via_download(
        &self,
        payload: &MetadataPayload,
        start_time: f64,
    ) -> Result<ResolvedMedia> {
        let source_url = payload.source_url.as_str();
        info!(source_url, "Host requires pre-download, fetching to local file");

        let info = self
            .backend
            .extract_info(source_url)
            .await
            .map_err(|e| Error::resolution("extract_info", e))?;
        let title = payload.title.clone().or_else(|| info.title.clone());

        // Download failure is final for these hosts; direct streaming is
        // known not to work so there is no further fallback.
        let path = self
            .backend
            .download_to_file(source_url, title.as_deref())
            .await
            .map_err(|e| Error::resolution("download_to_file", e))?;

        Ok(ResolvedMedia {
            source: MediaSource::File { path },
            title,
            start_time,
        })
    }

    fn requires_predownload(&self, source_url: &str) -> bool {
        let Ok(parsed) = url::Url::parse(source_url) else {
            return false;
        };
        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.predownload_hosts
            .iter()
            .any(|suffix| host == suffix || host.ends_with(&format!(".{suffix}")))
    }
}

/// Detect a backend selection of separated video-only and audio-only
/// streams, each with a retrievable URL.
fn separated_streams(info: &MediaInfo) -> Option<(String, String)> {
    let video = info
        .requested_formats
        .iter()
        .find(|f| f.is_video_only())?;
    let audio = info
        .requested_formats
        .iter()
        .find(|f| f.is_audio_only())?;
    Some((
        video.playable_url()?.to_string(),
        audio.playable_url()?.to_string(),
    ))
}

/// First format exposing any URL, preferring combined video+audio entries
/// over partial ones.
fn scan_formats(formats: &[MediaFormat]) -> Option<String> {
    formats
        .iter()
        .find(|f| f.is_combined() && f.playable_url().is_some())
        .or_else(|| formats.iter().find(|f| f.playable_url().is_some()))
        .and_then(|f| f.playable_url().map(str::to_string))
}
