//! yt-dlp subprocess client
//!
//! Drives the yt-dlp executable for the two backend operations the core
//! needs: dump a source's info document as JSON (`-J`) and download a source
//! to a local file. Site-specific extraction logic stays entirely inside
//! yt-dlp.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

use mtxcast_core::resolver::{MediaInfo, MetadataBackend};
use mtxcast_core::Result;

use crate::error::{YtDlpError, MAX_INFO_SIZE};

/// Subprocess-backed extraction client.
#[derive(Debug, Clone)]
pub struct YtDlpClient {
    bin: String,
    format: String,
    download_dir: PathBuf,
}

impl YtDlpClient {
    pub fn new(bin: impl Into<String>, format: impl Into<String>, download_dir: PathBuf) -> Self {
        Self {
            bin: bin.into(),
            format: format.into(),
            download_dir,
        }
    }

    async fn run(&self, args: &[&str]) -> std::result::Result<Vec<u8>, YtDlpError> {
        debug!(bin = %self.bin, ?args, "Running extractor");
        let output = Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| YtDlpError::Spawn {
                bin: self.bin.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // yt-dlp prints warnings to stderr even on success, so only the
            // tail is worth surfacing on failure.
            let tail = stderr.lines().rev().take(4).collect::<Vec<_>>();
            return Err(YtDlpError::Failed {
                status: output.status,
                stderr: tail.into_iter().rev().collect::<Vec<_>>().join(" | "),
            });
        }

        Ok(output.stdout)
    }

    async fn dump_info(&self, url: &str) -> std::result::Result<MediaInfo, YtDlpError> {
        let stdout = self
            .run(&[
                "--quiet",
                "--no-warnings",
                "--no-playlist",
                "--format",
                &self.format,
                "-J",
                url,
            ])
            .await?;
        parse_info(&stdout)
    }

    async fn download(
        &self,
        url: &str,
        title_hint: Option<&str>,
    ) -> std::result::Result<PathBuf, YtDlpError> {
        tokio::fs::create_dir_all(&self.download_dir).await?;

        let template = match title_hint {
            Some(hint) => format!(
                "{}/{}.%(ext)s",
                self.download_dir.display(),
                sanitize_file_name(hint)
            ),
            None => format!("{}/%(title)s.%(ext)s", self.download_dir.display()),
        };

        info!(url, dir = %self.download_dir.display(), "Downloading source to local file");
        let stdout = self
            .run(&[
                "--quiet",
                "--no-warnings",
                "--no-playlist",
                "--format",
                &self.format,
                "--output",
                &template,
                "--print",
                "after_move:filepath",
                "--no-simulate",
                url,
            ])
            .await?;

        // `--print after_move:filepath` emits the final path on stdout.
        let text = String::from_utf8_lossy(&stdout);
        let path = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .next_back()
            .map(PathBuf::from)
            .ok_or(YtDlpError::NoDownloadPath)?;

        if !path.exists() {
            warn!(path = %path.display(), "Downloader reported a path that does not exist");
            return Err(YtDlpError::NoDownloadPath);
        }
        Ok(path)
    }
}

#[async_trait]
impl MetadataBackend for YtDlpClient {
    async fn extract_info(&self, url: &str) -> Result<MediaInfo> {
        Ok(self.dump_info(url).await?)
    }

    async fn download_to_file(&self, url: &str, title_hint: Option<&str>) -> Result<PathBuf> {
        Ok(self.download(url, title_hint).await?)
    }
}

/// Parse a `yt-dlp -J` document. Unknown fields are ignored.
fn parse_info(bytes: &[u8]) -> std::result::Result<MediaInfo, YtDlpError> {
    if bytes.len() > MAX_INFO_SIZE {
        return Err(YtDlpError::InfoTooLarge { size: bytes.len() });
    }
    serde_json::from_slice(bytes).map_err(|e| YtDlpError::Parse(e.to_string()))
}

/// Strip path separators and shell-hostile characters from a title hint
/// before using it in an output template.
fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' | '%' => '_',
            c => c,
        })
        .collect()
}
