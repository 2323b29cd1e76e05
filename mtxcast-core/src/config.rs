use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub media: MediaConfig,
    pub whip: WhipConfig,
    pub renderer: RendererConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared secret checked against the `X-API-Token` header. No auth when
    /// unset.
    pub api_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            api_token: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// yt-dlp executable name or path.
    pub ytdlp_bin: String,
    /// Format selection string passed to yt-dlp.
    pub format: String,
    /// Host suffixes whose streams must be downloaded before playback.
    pub predownload_hosts: Vec<String>,
    /// Directory for pre-downloaded media.
    pub download_dir: PathBuf,
    /// Directory for files uploaded through the HTTP API.
    pub upload_dir: PathBuf,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ytdlp_bin: "yt-dlp".to_string(),
            format: "best".to_string(),
            predownload_hosts: vec!["nicovideo.jp".to_string()],
            download_dir: std::env::temp_dir().join("mtxcast/downloads"),
            upload_dir: std::env::temp_dir().join("mtxcast/uploads"),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WhipConfig {
    /// Skip DTLS certificate fingerprint verification. Some WHIP clients
    /// (certain OBS builds) present certificates that fail strict
    /// validation; enabling this accepts them. Deliberate compatibility
    /// relaxation, off by default.
    pub tolerate_nonstandard_certs: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Unix socket path of the mpv JSON IPC endpoint.
    pub mpv_socket: PathBuf,
    /// Loopback port live RTP is forwarded to for the renderer.
    pub rtp_port: u16,
    /// Keep the system awake while playback is active.
    pub inhibit_sleep: bool,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            mpv_socket: PathBuf::from("/tmp/mtxcast-mpv.sock"),
            rtp_port: 5004,
            inhibit_sleep: true,
        }
    }
}

impl Config {
    /// Load configuration from an optional file with `MTXCAST_*` environment
    /// overrides (e.g. `MTXCAST_SERVER__PORT=9090`).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        } else {
            builder = builder.add_source(File::with_name("mtxcast").required(false));
        }
        builder
            .add_source(Environment::with_prefix("MTXCAST").separator("__"))
            .build()?
            .try_deserialize()
    }

    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
