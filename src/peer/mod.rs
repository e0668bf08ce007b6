//! Peer connections to remote counterparts

pub mod session;
pub mod transport;
pub mod rtc;

pub use self::session::{PeerSessionManager, SessionSummary, SessionUpdate};
pub use self::transport::{
    ConnectionState, PeerConnection, PeerEvent, PeerEventKind, PeerEventSender, PeerTransport,
    SignalingState,
};
pub use self::rtc::WebRtcTransport;
