//! WHIP ingestion endpoint
//!
//! Manages the lifecycle of WebRTC ingestion sessions: offer/answer
//! negotiation, connection-state supervision, and teardown. Sessions are
//! keyed by a generated resource id the client uses for later deletion.
//! Accepted video tracks are handed to the stream manager; other tracks are
//! drained to keep the peer alive.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use mtxcast_core::transport::LiveTrack;
use mtxcast_core::{Error, Result, StreamManager};

use crate::engine::{PeerEvent, PeerSession, WebRtcEngine};

struct Session {
    peer: Arc<dyn PeerSession>,
    client_info: Option<String>,
}

/// WHIP session registry and supervisor.
///
/// Negotiation of independent sessions proceeds concurrently; only the
/// teardown path is serialized, so a state-change callback racing an
/// explicit delete closes the connection exactly once.
pub struct WhipEndpoint {
    manager: Arc<StreamManager>,
    engine: Arc<dyn WebRtcEngine>,
    sessions: DashMap<String, Session>,
    cleanup_lock: Mutex<()>,
}

impl WhipEndpoint {
    pub fn new(manager: Arc<StreamManager>, engine: Arc<dyn WebRtcEngine>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            engine,
            sessions: DashMap::new(),
            cleanup_lock: Mutex::new(()),
        })
    }

    /// Negotiate a new ingestion session from a raw SDP offer.
    ///
    /// Returns the local answer SDP and the resource id naming the session.
    /// A negotiation failure leaves no session behind.
    pub async fn handle_offer(
        self: &Arc<Self>,
        sdp_offer: &str,
        client_info: Option<String>,
    ) -> Result<(String, String)> {
        let resource_id = uuid::Uuid::new_v4().to_string();
        let (peer, events) = self.engine.create_peer().await?;

        self.sessions.insert(
            resource_id.clone(),
            Session {
                peer: Arc::clone(&peer),
                client_info: client_info.clone(),
            },
        );

        let endpoint = Arc::clone(self);
        let event_resource_id = resource_id.clone();
        tokio::spawn(async move {
            endpoint.supervise_session(event_resource_id, events).await;
        });

        info!(
            resource_id = %resource_id,
            client = client_info.as_deref().unwrap_or("unknown"),
            "Negotiating WHIP session"
        );

        match peer.negotiate(sdp_offer).await {
            Ok(answer_sdp) => Ok((answer_sdp, resource_id)),
            Err(e) => {
                // Partially-created sessions must not linger in the map.
                error!(resource_id = %resource_id, error = %e, "WHIP negotiation failed");
                self.cleanup_peer(&resource_id).await;
                Err(Error::Negotiation(format!("offer/answer exchange: {e}")))
            }
        }
    }

    /// Explicit client-initiated teardown. Idempotent: deleting an unknown
    /// or already-removed resource is a no-op.
    pub async fn delete_resource(&self, resource_id: &str) {
        self.cleanup_peer(resource_id).await;
    }

    /// Number of live sessions, for status reporting.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Close every active session, for server shutdown.
    pub async fn shutdown(&self) {
        let resource_ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for resource_id in resource_ids {
            self.cleanup_peer(&resource_id).await;
        }
    }

    /// Consume session events until the session ends.
    async fn supervise_session(
        self: Arc<Self>,
        resource_id: String,
        mut events: mpsc::Receiver<PeerEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                PeerEvent::StateChanged(state) => {
                    let client = self
                        .sessions
                        .get(&resource_id)
                        .and_then(|s| s.client_info.clone());
                    info!(
                        resource_id = %resource_id,
                        client = client.as_deref().unwrap_or("unknown"),
                        ?state,
                        "WHIP peer state changed"
                    );
                    if state.is_terminal() {
                        warn!(resource_id = %resource_id, ?state, "WHIP peer gone, tearing down");
                        self.cleanup_peer(&resource_id).await;
                        break;
                    }
                }
                PeerEvent::TrackReceived(track) => {
                    self.route_track(&resource_id, track).await;
                }
            }
        }
        debug!(resource_id = %resource_id, "Session supervisor finished");
    }

    async fn route_track(&self, resource_id: &str, track: Arc<dyn LiveTrack>) {
        if track.kind().is_video() {
            info!(
                resource_id = %resource_id,
                codec = %track.codec().mime_type,
                "Routing inbound video track to stream manager"
            );
            if let Err(e) = self.manager.handle_whip_track(track, None).await {
                error!(resource_id = %resource_id, error = %e, "Failed to attach WHIP track");
            }
        } else {
            // Drain non-video tracks so RTCP keeps flowing and the peer
            // stays alive even though we do not render them.
            debug!(resource_id = %resource_id, "Sinking non-video track");
            tokio::spawn(async move {
                while track.read_rtp().await.is_ok() {}
            });
        }
    }

    /// Remove the session and close its connection. Guarded so concurrent
    /// teardown triggers execute the close exactly once.
    async fn cleanup_peer(&self, resource_id: &str) {
        let _guard = self.cleanup_lock.lock().await;
        if let Some((_, session)) = self.sessions.remove(resource_id) {
            info!(resource_id = %resource_id, "Closing WHIP session");
            if let Err(e) = session.peer.close().await {
                warn!(resource_id = %resource_id, error = %e, "Error closing peer connection");
            }
        } else {
            debug!(resource_id = %resource_id, "Session already removed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::ConnectionState;
    use async_trait::async_trait;
    use bytes::Bytes;
    use mtxcast_core::resolver::{MediaInfo, MetadataBackend, MetadataResolver};
    use mtxcast_core::transport::{PlaybackMetrics, PlayerTransport, RtpCodecParams, TrackKind};
    use mtxcast_core::StreamType;
    use parking_lot::Mutex as SyncMutex;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct NullTransport;

    #[async_trait]
    impl PlayerTransport for NullTransport {
        async fn play_url(&self, _url: &str, _start: f64, _title: Option<&str>) -> Result<()> {
            Ok(())
        }

        async fn play_separated_streams(
            &self,
            _video: &str,
            _audio: &str,
            _start: f64,
            _title: Option<&str>,
        ) -> Result<()> {
            Ok(())
        }

        async fn attach_live_track(&self, _track: Arc<dyn LiveTrack>) -> Result<()> {
            Ok(())
        }

        async fn pause(&self) -> Result<()> {
            Ok(())
        }

        async fn resume(&self) -> Result<()> {
            Ok(())
        }

        async fn seek(&self, _position: f64) -> Result<()> {
            Ok(())
        }

        async fn set_volume(&self, _volume: f64) -> Result<()> {
            Ok(())
        }

        async fn get_metrics(&self) -> Result<PlaybackMetrics> {
            Ok(PlaybackMetrics::default())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }
    }

    struct NullBackend;

    #[async_trait]
    impl MetadataBackend for NullBackend {
        async fn extract_info(&self, _url: &str) -> Result<MediaInfo> {
            Ok(MediaInfo::default())
        }

        async fn download_to_file(
            &self,
            _url: &str,
            _title_hint: Option<&str>,
        ) -> Result<PathBuf> {
            Err(Error::Backend("unused".to_string()))
        }
    }

    fn test_manager() -> Arc<StreamManager> {
        Arc::new(StreamManager::new(
            Arc::new(NullTransport),
            MetadataResolver::new(Arc::new(NullBackend), vec![]),
        ))
    }

    struct FakePeer {
        close_count: AtomicUsize,
        fail_negotiation: bool,
    }

    #[async_trait]
    impl PeerSession for FakePeer {
        async fn negotiate(&self, offer_sdp: &str) -> Result<String> {
            if self.fail_negotiation {
                return Err(Error::Negotiation("bad offer".to_string()));
            }
            Ok(format!("answer-for:{}", offer_sdp.len()))
        }

        async fn close(&self) -> Result<()> {
            self.close_count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeEngine {
        fail_negotiation: bool,
        peers: SyncMutex<Vec<Arc<FakePeer>>>,
        event_senders: SyncMutex<Vec<mpsc::Sender<PeerEvent>>>,
    }

    impl FakeEngine {
        fn new(fail_negotiation: bool) -> Arc<Self> {
            Arc::new(Self {
                fail_negotiation,
                peers: SyncMutex::new(Vec::new()),
                event_senders: SyncMutex::new(Vec::new()),
            })
        }

        fn last_peer(&self) -> Arc<FakePeer> {
            self.peers.lock().last().cloned().expect("no peer created")
        }

        async fn inject(&self, event: PeerEvent) {
            let tx = self
                .event_senders
                .lock()
                .last()
                .cloned()
                .expect("no event channel");
            tx.send(event).await.expect("event channel closed");
        }
    }

    #[async_trait]
    impl WebRtcEngine for FakeEngine {
        async fn create_peer(&self) -> Result<(Arc<dyn PeerSession>, mpsc::Receiver<PeerEvent>)> {
            let peer = Arc::new(FakePeer {
                close_count: AtomicUsize::new(0),
                fail_negotiation: self.fail_negotiation,
            });
            let (tx, rx) = mpsc::channel(16);
            self.peers.lock().push(Arc::clone(&peer));
            self.event_senders.lock().push(tx);
            Ok((peer, rx))
        }
    }

    struct FakeLiveTrack {
        kind: TrackKind,
        read_called: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LiveTrack for FakeLiveTrack {
        fn kind(&self) -> TrackKind {
            self.kind
        }

        fn codec(&self) -> RtpCodecParams {
            RtpCodecParams {
                mime_type: match self.kind {
                    TrackKind::Video => "video/VP8".to_string(),
                    TrackKind::Audio => "audio/opus".to_string(),
                },
                clock_rate: 90000,
                payload_type: 96,
            }
        }

        async fn read_rtp(&self) -> Result<Bytes> {
            self.read_called.store(true, Ordering::SeqCst);
            Err(Error::Internal("track ended".to_string()))
        }
    }

    #[tokio::test]
    async fn test_offer_creates_session() {
        let engine = FakeEngine::new(false);
        let endpoint = WhipEndpoint::new(test_manager(), engine.clone());

        let (answer, resource_id) = endpoint
            .handle_offer("v=0 fake offer", Some("obs".to_string()))
            .await
            .expect("offer should succeed");

        assert!(answer.starts_with("answer-for:"));
        assert!(!resource_id.is_empty());
        assert_eq!(endpoint.session_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let engine = FakeEngine::new(false);
        let endpoint = WhipEndpoint::new(test_manager(), engine.clone());

        let (_, resource_id) = endpoint
            .handle_offer("v=0", None)
            .await
            .expect("offer should succeed");

        endpoint.delete_resource(&resource_id).await;
        assert_eq!(endpoint.session_count(), 0);
        assert_eq!(engine.last_peer().close_count.load(Ordering::SeqCst), 1);

        // Second delete finds nothing and must not close again.
        endpoint.delete_resource(&resource_id).await;
        assert_eq!(engine.last_peer().close_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_delete_unknown_resource_is_noop() {
        let engine = FakeEngine::new(false);
        let endpoint = WhipEndpoint::new(test_manager(), engine);
        endpoint.delete_resource("no-such-resource").await;
        assert_eq!(endpoint.session_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_negotiation_leaves_no_session() {
        let engine = FakeEngine::new(true);
        let endpoint = WhipEndpoint::new(test_manager(), engine.clone());

        let err = endpoint
            .handle_offer("v=0", None)
            .await
            .expect_err("negotiation must fail");
        assert!(matches!(err, Error::Negotiation(_)));
        assert_eq!(endpoint.session_count(), 0);
        assert_eq!(engine.last_peer().close_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_terminal_state_triggers_teardown() {
        let engine = FakeEngine::new(false);
        let endpoint = WhipEndpoint::new(test_manager(), engine.clone());

        let (_, resource_id) = endpoint
            .handle_offer("v=0", None)
            .await
            .expect("offer should succeed");

        engine
            .inject(PeerEvent::StateChanged(ConnectionState::Failed))
            .await;

        // Teardown runs on the supervisor task.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(endpoint.session_count(), 0);
        assert_eq!(engine.last_peer().close_count.load(Ordering::SeqCst), 1);

        // The resource id is now invalid; deleting it again stays safe.
        endpoint.delete_resource(&resource_id).await;
        assert_eq!(engine.last_peer().close_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_video_track_reaches_stream_manager() {
        let engine = FakeEngine::new(false);
        let manager = test_manager();
        let endpoint = WhipEndpoint::new(Arc::clone(&manager), engine.clone());

        endpoint
            .handle_offer("v=0", None)
            .await
            .expect("offer should succeed");

        engine
            .inject(PeerEvent::TrackReceived(Arc::new(FakeLiveTrack {
                kind: TrackKind::Video,
                read_called: Arc::new(AtomicBool::new(false)),
            })))
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let status = manager.current_status().await.expect("status");
        assert_eq!(status.stream_type, StreamType::Whip);
        assert!(status.is_playing);
    }

    #[tokio::test]
    async fn test_non_video_track_is_sunk() {
        let engine = FakeEngine::new(false);
        let manager = test_manager();
        let endpoint = WhipEndpoint::new(Arc::clone(&manager), engine.clone());

        endpoint
            .handle_offer("v=0", None)
            .await
            .expect("offer should succeed");

        let read_called = Arc::new(AtomicBool::new(false));
        engine
            .inject(PeerEvent::TrackReceived(Arc::new(FakeLiveTrack {
                kind: TrackKind::Audio,
                read_called: Arc::clone(&read_called),
            })))
            .await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        // The audio track was drained, not attached.
        assert!(read_called.load(Ordering::SeqCst));
        let status = manager.current_status().await.expect("status");
        assert_eq!(status.stream_type, StreamType::Idle);
    }

    #[tokio::test]
    async fn test_shutdown_closes_every_session() {
        let engine = FakeEngine::new(false);
        let endpoint = WhipEndpoint::new(test_manager(), engine.clone());

        endpoint.handle_offer("v=0 a", None).await.expect("offer");
        endpoint.handle_offer("v=0 b", None).await.expect("offer");
        assert_eq!(endpoint.session_count(), 2);

        endpoint.shutdown().await;
        assert_eq!(endpoint.session_count(), 0);
        let peers = engine.peers.lock().clone();
        for peer in peers {
            assert_eq!(peer.close_count.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_independent_sessions_coexist() {
        let engine = FakeEngine::new(false);
        let endpoint = WhipEndpoint::new(test_manager(), engine.clone());

        let (_, first) = endpoint.handle_offer("v=0 a", None).await.expect("offer");
        let (_, second) = endpoint.handle_offer("v=0 b", None).await.expect("offer");
        assert_ne!(first, second);
        assert_eq!(endpoint.session_count(), 2);

        endpoint.delete_resource(&first).await;
        assert_eq!(endpoint.session_count(), 1);
    }
}
