//! MTXCast WHIP ingestion
//!
//! WebRTC-HTTP Ingestion Protocol session management: offer/answer
//! negotiation over the `webrtc` crate, connection supervision, and
//! guaranteed teardown. The HTTP framing (POST/DELETE, headers) lives in
//! the API crate; this crate owns the session lifecycle.

pub mod endpoint;
pub mod engine;

pub use endpoint::WhipEndpoint;
pub use engine::{ConnectionState, PeerEvent, PeerSession, RtcEngine, RtcEngineConfig, WebRtcEngine};
