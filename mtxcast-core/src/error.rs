use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Resolution failed: {0}")]
    Resolution(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Playback rejected: {0}")]
    Playback(String),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a collaborator failure with the stage that produced it.
    pub fn resolution(stage: &str, err: impl std::fmt::Display) -> Self {
        Self::Resolution(format!("{stage}: {err}"))
    }

    pub fn playback(stage: &str, err: impl std::fmt::Display) -> Self {
        Self::Playback(format!("{stage}: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
