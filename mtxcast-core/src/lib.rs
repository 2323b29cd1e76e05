//! MTXCast core: stream orchestration and source resolution.
//!
//! This crate owns playback state and the command state machine
//! ([`manager::StreamManager`]), resolves arbitrary source references into
//! playable descriptors ([`resolver::MetadataResolver`]), and defines the
//! capability contracts its collaborators implement: the rendering endpoint
//! ([`transport::PlayerTransport`]) and the extraction backend
//! ([`resolver::MetadataBackend`]).

pub mod config;
pub mod error;
pub mod logging;
pub mod manager;
pub mod resolver;
pub mod status;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use manager::StreamManager;
pub use resolver::{MediaSource, MetadataPayload, MetadataResolver, ResolvedMedia};
pub use status::{PlayerStatus, StreamType};
pub use transport::{LiveTrack, PlaybackMetrics, PlayerTransport};
