//! Peer transport seam
//!
//! The session manager drives negotiation through these traits only; the
//! media engine behind them reports candidates, remote tracks and state
//! changes as [`PeerEvent`]s on the owner's channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use crate::audio::stream::AudioTrack;
use crate::error::SessionError;
use crate::protocol::{IceCandidate, PeerId, SessionDescription};

/// Connectivity of one peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::New => "new",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Offer/answer progress of one peer connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingState {
    #[default]
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

/// Something the media engine observed
#[derive(Debug, Clone)]
pub enum PeerEventKind {
    /// Locally gathered candidate to forward to the counterpart
    LocalCandidate(IceCandidate),
    /// Audio arriving from the counterpart
    RemoteTrack(AudioTrack),
    StateChanged(ConnectionState),
}

#[derive(Debug, Clone)]
pub struct PeerEvent {
    pub peer: PeerId,
    /// Identifies the connection instance, so events from a replaced
    /// connection can be told apart
    pub session: u64,
    pub kind: PeerEventKind,
}

/// Event channel handle given to one connection
#[derive(Debug, Clone)]
pub struct PeerEventSender {
    peer: PeerId,
    session: u64,
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerEventSender {
    pub fn new(peer: PeerId, session: u64, tx: mpsc::UnboundedSender<PeerEvent>) -> Self {
        Self { peer, session, tx }
    }

    pub fn peer(&self) -> &PeerId {
        &self.peer
    }

    pub fn emit(&self, kind: PeerEventKind) {
        let event = PeerEvent {
            peer: self.peer.clone(),
            session: self.session,
            kind,
        };
        if self.tx.send(event).is_err() {
            tracing::debug!("Peer event for {} dropped, owner gone", self.peer);
        }
    }
}

/// Factory for peer connections
#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_connection(
        &self,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerConnection>, SessionError>;
}

/// One negotiated audio connection
#[async_trait]
pub trait PeerConnection: Send + Sync {
    async fn add_track(&self, track: &AudioTrack) -> Result<(), SessionError>;

    async fn create_offer(&self) -> Result<SessionDescription, SessionError>;

    async fn create_answer(&self) -> Result<SessionDescription, SessionError>;

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), SessionError>;

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), SessionError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError>;

    fn signaling_state(&self) -> SignalingState;

    fn connection_state(&self) -> ConnectionState;

    /// Release the connection. Closing twice is harmless.
    async fn close(&self) -> Result<(), SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_match_browser_strings() {
        assert_eq!(
            serde_json::to_string(&SignalingState::HaveRemoteOffer).unwrap(),
            "\"have-remote-offer\""
        );
        assert_eq!(ConnectionState::Failed.to_string(), "failed");
    }

    #[tokio::test]
    async fn sender_tags_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = PeerEventSender::new(PeerId::new("p1"), 7, tx);
        sender.emit(PeerEventKind::StateChanged(ConnectionState::Connected));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.peer, PeerId::new("p1"));
        assert_eq!(event.session, 7);
        assert!(matches!(
            event.kind,
            PeerEventKind::StateChanged(ConnectionState::Connected)
        ));
    }
}
