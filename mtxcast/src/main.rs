mod inhibitor;
mod mpv;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use mtxcast_core::{logging, Config, MetadataResolver, StreamManager};
use mtxcast_media::YtDlpClient;
use mtxcast_whip::{RtcEngine, RtcEngineConfig, WhipEndpoint};

use inhibitor::SleepInhibitor;
use mpv::MpvTransport;

/// Cast receiver: resolves media sources, ingests WHIP streams and drives a
/// local mpv renderer.
#[derive(Debug, Parser)]
#[command(name = "mtxcast", version, about)]
struct Args {
    /// Path to the configuration file.
    #[arg(short, long, env = "MTXCAST_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log level.
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    logging::init_logging(&config.logging)?;
    info!("MTXCast starting...");
    info!("HTTP address: {}", config.http_address());

    let backend = Arc::new(YtDlpClient::new(
        config.media.ytdlp_bin.clone(),
        config.media.format.clone(),
        config.media.download_dir.clone(),
    ));
    let resolver = MetadataResolver::new(backend, config.media.predownload_hosts.clone());

    let inhibitor = Arc::new(SleepInhibitor::new(config.renderer.inhibit_sleep));
    let transport = Arc::new(MpvTransport::new(
        config.renderer.mpv_socket.clone(),
        config.renderer.rtp_port,
        inhibitor,
    ));
    info!(socket = %config.renderer.mpv_socket.display(), "mpv renderer transport ready");

    let manager = Arc::new(StreamManager::new(transport, resolver));

    let engine = Arc::new(RtcEngine::new(RtcEngineConfig {
        tolerate_nonstandard_certs: config.whip.tolerate_nonstandard_certs,
    }));
    let whip = WhipEndpoint::new(Arc::clone(&manager), engine);
    info!("WHIP endpoint ready");

    let router = mtxcast_api::create_router(
        Arc::clone(&manager),
        Arc::clone(&whip),
        config.server.api_token.clone(),
        config.media.upload_dir.clone(),
    );

    let listener = tokio::net::TcpListener::bind(config.http_address()).await?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server stopped, cleaning up");
    whip.shutdown().await;
    if let Err(e) = manager.stop().await {
        // The renderer may already be gone at this point.
        tracing::debug!(error = %e, "Playback stop during shutdown failed");
    }
    info!("Shutdown complete");
    Ok(())
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
