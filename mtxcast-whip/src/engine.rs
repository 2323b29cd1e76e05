//! WebRTC engine abstraction
//!
//! The ingestion endpoint drives peer sessions only through the
//! [`WebRtcEngine`] and [`PeerSession`] traits; [`RtcEngine`] is the
//! production implementation over the `webrtc` crate. Tests substitute a
//! fake engine that injects events directly.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_remote::TrackRemote;
use webrtc::util::marshal::MarshalSize;

use mtxcast_core::transport::{LiveTrack, RtpCodecParams, TrackKind};
use mtxcast_core::{Error, Result};

/// Capacity of the per-session event channel. State changes and track
/// arrivals are rare; a small buffer is plenty.
const PEER_EVENT_CHANNEL_CAPACITY: usize = 16;

/// Connection state of a peer session, engine-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// States that end the session and trigger teardown.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed | Self::Closed)
    }
}

impl From<RTCPeerConnectionState> for ConnectionState {
    fn from(state: RTCPeerConnectionState) -> Self {
        match state {
            RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => Self::New,
            RTCPeerConnectionState::Connecting => Self::Connecting,
            RTCPeerConnectionState::Connected => Self::Connected,
            RTCPeerConnectionState::Disconnected => Self::Disconnected,
            RTCPeerConnectionState::Failed => Self::Failed,
            RTCPeerConnectionState::Closed => Self::Closed,
        }
    }
}

/// Events a peer session emits after creation.
pub enum PeerEvent {
    StateChanged(ConnectionState),
    TrackReceived(Arc<dyn LiveTrack>),
}

/// One negotiated (or negotiating) peer connection.
#[async_trait]
pub trait PeerSession: Send + Sync {
    /// Apply the remote offer and return the local answer with ICE
    /// candidates gathered.
    async fn negotiate(&self, offer_sdp: &str) -> Result<String>;

    /// Close the underlying connection. Must be safe to call once per
    /// session; the endpoint guarantees it is not called twice.
    async fn close(&self) -> Result<()>;
}

/// Factory for peer sessions.
#[async_trait]
pub trait WebRtcEngine: Send + Sync {
    async fn create_peer(&self) -> Result<(Arc<dyn PeerSession>, mpsc::Receiver<PeerEvent>)>;
}

/// Engine configuration.
#[derive(Debug, Clone, Default)]
pub struct RtcEngineConfig {
    /// Skip DTLS certificate fingerprint verification. Some WHIP clients
    /// (certain OBS builds) present certificates with a non-standard
    /// version that fails strict validation; this flag accepts them. A
    /// deliberate, documented compatibility relaxation.
    pub tolerate_nonstandard_certs: bool,
}

/// Production engine over the `webrtc` crate.
pub struct RtcEngine {
    config: RtcEngineConfig,
}

impl RtcEngine {
    #[must_use]
    pub fn new(config: RtcEngineConfig) -> Self {
        if config.tolerate_nonstandard_certs {
            warn!("DTLS certificate fingerprint verification disabled for WHIP compatibility");
        }
        Self { config }
    }
}

#[async_trait]
impl WebRtcEngine for RtcEngine {
    async fn create_peer(&self) -> Result<(Arc<dyn PeerSession>, mpsc::Receiver<PeerEvent>)> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::Negotiation(format!("codec registration: {e}")))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| Error::Negotiation(format!("interceptor registration: {e}")))?;

        let mut setting_engine = SettingEngine::default();
        if self.config.tolerate_nonstandard_certs {
            setting_engine.disable_certificate_fingerprint_verification(true);
        }

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .with_setting_engine(setting_engine)
            .build();

        let pc = Arc::new(
            api.new_peer_connection(RTCConfiguration::default())
                .await
                .map_err(|e| Error::Negotiation(format!("peer creation: {e}")))?,
        );

        let (event_tx, event_rx) = mpsc::channel(PEER_EVENT_CHANNEL_CAPACITY);

        let state_tx = event_tx.clone();
        pc.on_peer_connection_state_change(Box::new(move |state| {
            let tx = state_tx.clone();
            Box::pin(async move {
                // A full channel or gone receiver means the session is
                // already being torn down.
                let _ = tx.send(PeerEvent::StateChanged(state.into())).await;
            })
        }));

        let track_tx = event_tx;
        pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let tx = track_tx.clone();
            Box::pin(async move {
                debug!(
                    kind = %track.kind(),
                    codec = %track.codec().capability.mime_type,
                    "Inbound track received"
                );
                let live: Arc<dyn LiveTrack> = Arc::new(RemoteLiveTrack::new(track));
                let _ = tx.send(PeerEvent::TrackReceived(live)).await;
            })
        }));

        Ok((Arc::new(RtcPeerSession { pc }), event_rx))
    }
}

struct RtcPeerSession {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl PeerSession for RtcPeerSession {
    async fn negotiate(&self, offer_sdp: &str) -> Result<String> {
        let offer = RTCSessionDescription::offer(offer_sdp.to_string())
            .map_err(|e| Error::Negotiation(format!("invalid offer: {e}")))?;
        self.pc
            .set_remote_description(offer)
            .await
            .map_err(|e| Error::Negotiation(format!("set remote description: {e}")))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::Negotiation(format!("create answer: {e}")))?;

        // WHIP carries no trickle channel in this deployment, so wait for
        // gathering and return a complete answer.
        let mut gather_complete = self.pc.gathering_complete_promise().await;
        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| Error::Negotiation(format!("set local description: {e}")))?;
        let _ = gather_complete.recv().await;

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| Error::Negotiation("no local description after answer".to_string()))?;
        Ok(local.sdp)
    }

    async fn close(&self) -> Result<()> {
        self.pc
            .close()
            .await
            .map_err(|e| Error::Internal(format!("peer close: {e}")))
    }
}

/// Adapter exposing a remote `webrtc` track through the core's
/// [`LiveTrack`] contract.
pub struct RemoteLiveTrack {
    track: Arc<TrackRemote>,
}

impl RemoteLiveTrack {
    #[must_use]
    pub fn new(track: Arc<TrackRemote>) -> Self {
        Self { track }
    }
}

#[async_trait]
impl LiveTrack for RemoteLiveTrack {
    fn kind(&self) -> TrackKind {
        match self.track.kind() {
            RTPCodecType::Audio => TrackKind::Audio,
            _ => TrackKind::Video,
        }
    }

    fn codec(&self) -> RtpCodecParams {
        let codec = self.track.codec();
        RtpCodecParams {
            mime_type: codec.capability.mime_type,
            clock_rate: codec.capability.clock_rate,
            payload_type: codec.payload_type,
        }
    }

    async fn read_rtp(&self) -> Result<Bytes> {
        let mut buf = vec![0u8; 1500]; // MTU size
        let (packet, _attributes) = self
            .track
            .read(&mut buf)
            .await
            .map_err(|e| Error::Internal(format!("track read: {e}")))?;
        let size = packet.header.marshal_size() + packet.payload.len();
        Ok(Bytes::copy_from_slice(&buf[..size]))
    }
}
