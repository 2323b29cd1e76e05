//! Extraction backend error types.

use thiserror::Error;

/// Maximum size of an extractor JSON document we are willing to parse
/// (16 MB). Prevents OOM from a misbehaving extractor process.
pub const MAX_INFO_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum YtDlpError {
    #[error("Failed to spawn {bin}: {source}")]
    Spawn {
        bin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("yt-dlp exited with {status}: {stderr}")]
    Failed {
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Info document too large ({size} bytes, max {MAX_INFO_SIZE})")]
    InfoTooLarge { size: usize },

    #[error("Download produced no file path")]
    NoDownloadPath,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<YtDlpError> for mtxcast_core::Error {
    fn from(err: YtDlpError) -> Self {
        Self::Backend(err.to_string())
    }
}
