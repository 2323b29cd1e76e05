// Module: mtxcast-api
// HTTP/JSON surface over the stream manager and the WHIP endpoint.

pub mod control;
pub mod error;
pub mod media;
pub mod middleware;
pub mod whip;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use mtxcast_core::StreamManager;
use mtxcast_whip::WhipEndpoint;

pub use error::{AppError, AppResult};

/// Upload body cap (1 GiB). Media files are large; axum's default 2 MB
/// limit is far too small for them.
const MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<StreamManager>,
    pub whip: Arc<WhipEndpoint>,
    pub api_token: Option<String>,
    pub upload_dir: PathBuf,
}

/// Create the HTTP router with all routes
pub fn create_router(
    manager: Arc<StreamManager>,
    whip: Arc<WhipEndpoint>,
    api_token: Option<String>,
    upload_dir: PathBuf,
) -> Router {
    let state = AppState {
        manager,
        whip,
        api_token,
        upload_dir,
    };

    let protected = Router::new()
        .route("/metadata", post(media::post_metadata))
        .route(
            "/file",
            post(media::post_file).route_layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/whip", post(whip::post_offer))
        .route("/whip/{resource_id}", delete(whip::delete_resource))
        .route("/status", get(control::get_status))
        .route("/control/play", post(control::control_play))
        .route("/control/pause", post(control::control_pause))
        .route("/control/stop", post(control::control_stop))
        .route("/control/seek", post(control::control_seek))
        .route("/control/volume", post(control::control_volume))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_api_token));

    Router::new()
        .route("/health", get(control::health))
        .merge(protected)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use mtxcast_core::resolver::{MediaInfo, MetadataBackend, MetadataResolver};
    use mtxcast_core::transport::{LiveTrack, PlaybackMetrics, PlayerTransport};
    use mtxcast_core::Result as CoreResult;
    use mtxcast_whip::{RtcEngine, RtcEngineConfig};
    use tower::ServiceExt;

    struct NullTransport;

    #[async_trait]
    impl PlayerTransport for NullTransport {
        async fn play_url(&self, _url: &str, _s: f64, _t: Option<&str>) -> CoreResult<()> {
            Ok(())
        }

        async fn play_separated_streams(
            &self,
            _v: &str,
            _a: &str,
            _s: f64,
            _t: Option<&str>,
        ) -> CoreResult<()> {
            Ok(())
        }

        async fn attach_live_track(&self, _track: Arc<dyn LiveTrack>) -> CoreResult<()> {
            Ok(())
        }

        async fn pause(&self) -> CoreResult<()> {
            Ok(())
        }

        async fn resume(&self) -> CoreResult<()> {
            Ok(())
        }

        async fn seek(&self, _p: f64) -> CoreResult<()> {
            Ok(())
        }

        async fn set_volume(&self, _v: f64) -> CoreResult<()> {
            Ok(())
        }

        async fn get_metrics(&self) -> CoreResult<PlaybackMetrics> {
            Ok(PlaybackMetrics::default())
        }

        async fn stop(&self) -> CoreResult<()> {
            Ok(())
        }
    }

    struct NullBackend;

    #[async_trait]
    impl MetadataBackend for NullBackend {
        async fn extract_info(&self, _url: &str) -> CoreResult<MediaInfo> {
            Ok(MediaInfo {
                url: Some("https://cdn/test".to_string()),
                ..Default::default()
            })
        }

        async fn download_to_file(
            &self,
            _url: &str,
            _hint: Option<&str>,
        ) -> CoreResult<std::path::PathBuf> {
            Err(mtxcast_core::Error::Backend("unused".to_string()))
        }
    }

    fn test_router(api_token: Option<String>) -> Router {
        let manager = Arc::new(StreamManager::new(
            Arc::new(NullTransport),
            MetadataResolver::new(Arc::new(NullBackend), vec![]),
        ));
        let whip = WhipEndpoint::new(
            Arc::clone(&manager),
            Arc::new(RtcEngine::new(RtcEngineConfig::default())),
        );
        create_router(manager, whip, api_token, std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let router = test_router(Some("secret".to_string()));
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_requires_token() {
        let router = test_router(Some("secret".to_string()));
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_status_with_token() {
        let router = test_router(Some("secret".to_string()));
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .header("X-API-Token", "secret")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_status_open_without_configured_token() {
        let router = test_router(None);
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/status")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metadata_playback_round_trip() {
        let router = test_router(None);
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/metadata")
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"source_url":"https://example.com/w","start_time":12.0}"#,
                    ))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_whip_delete_unknown_is_no_content() {
        let router = test_router(None);
        let response = router
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/whip/not-a-session")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_empty_file_upload_rejected() {
        let router = test_router(None);
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/file")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
