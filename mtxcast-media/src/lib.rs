// MTXCast media backend
//
// Subprocess client for the yt-dlp extractor, implementing the core's
// MetadataBackend capability. Independent of any HTTP or renderer concern.

pub mod error;
pub mod ytdlp;

pub use error::YtDlpError;
pub use ytdlp::YtDlpClient;
