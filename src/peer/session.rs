//! Peer session manager
//!
//! Owns one peer connection per counterpart and runs the offer/answer and
//! candidate exchange over the signaling relay. In the studio role it also
//! turns arriving remote tracks into mixer sources.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::audio::stream::{AudioTrack, MediaStream};
use crate::config::{CandidatePolicy, SignalingConfig};
use crate::error::SessionError;
use crate::mixer::{AudioSourceId, MixerStore};
use crate::peer::transport::{
    ConnectionState, PeerConnection, PeerEvent, PeerEventKind, PeerEventSender, PeerTransport,
    SignalingState,
};
use crate::protocol::{IceCandidate, PeerId, RelayMessage, Role, SdpType, SessionDescription, SignalPayload};
use crate::routing::RoutingSink;
use crate::signaling::SignalingRelay;

struct PeerSession {
    id: u64,
    connection: Box<dyn PeerConnection>,
    state: ConnectionState,
    local_track: Option<AudioTrack>,
    remote_track: Option<AudioTrack>,
    has_remote_description: bool,
    /// Candidates held until the remote description is applied
    queued_candidates: Vec<IceCandidate>,
}

/// Read-only view of one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub peer_id: PeerId,
    pub state: ConnectionState,
    pub signaling_state: SignalingState,
    pub has_local_track: bool,
    pub has_remote_track: bool,
}

/// What a peer event changed, for the owning actor
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// A remote track now feeds `source`; `created` if its strip is new
    SourceAttached { source: AudioSourceId, created: bool },
    StateChanged { peer: PeerId, state: ConnectionState },
}

pub struct PeerSessionManager {
    role: Role,
    transport: Arc<dyn PeerTransport>,
    relay: Arc<dyn SignalingRelay>,
    store: MixerStore,
    sink: Arc<dyn RoutingSink>,
    events: mpsc::UnboundedSender<PeerEvent>,
    sessions: HashMap<PeerId, PeerSession>,
    next_session: u64,
    policy: CandidatePolicy,
    max_pending: usize,
    /// Candidates that arrived before any session for their sender
    early_candidates: HashMap<PeerId, Vec<IceCandidate>>,
}

impl PeerSessionManager {
    pub fn new(
        role: Role,
        transport: Arc<dyn PeerTransport>,
        relay: Arc<dyn SignalingRelay>,
        store: MixerStore,
        sink: Arc<dyn RoutingSink>,
        events: mpsc::UnboundedSender<PeerEvent>,
        settings: &SignalingConfig,
    ) -> Self {
        Self {
            role,
            transport,
            relay,
            store,
            sink,
            events,
            sessions: HashMap::new(),
            next_session: 0,
            policy: settings.candidate_policy,
            max_pending: settings.max_pending_candidates,
            early_candidates: HashMap::new(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn has_session(&self, peer: &PeerId) -> bool {
        self.sessions.contains_key(peer)
    }

    pub fn session_state(&self, peer: &PeerId) -> Option<ConnectionState> {
        self.sessions.get(peer).map(|session| session.state)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Summaries of every active session, ordered by peer
    pub fn sessions(&self) -> Vec<SessionSummary> {
        let mut summaries: Vec<_> = self
            .sessions
            .iter()
            .map(|(peer, session)| SessionSummary {
                peer_id: peer.clone(),
                state: session.state,
                signaling_state: session.connection.signaling_state(),
                has_local_track: session.local_track.is_some(),
                has_remote_track: session.remote_track.is_some(),
            })
            .collect();
        summaries.sort_by(|a, b| a.peer_id.cmp(&b.peer_id));
        summaries
    }

    /// Open a connection to `peer` unless one exists
    pub async fn create_session(&mut self, peer: &PeerId) -> Result<(), SessionError> {
        if self.sessions.contains_key(peer) {
            return Ok(());
        }

        self.next_session += 1;
        let id = self.next_session;
        let events = PeerEventSender::new(peer.clone(), id, self.events.clone());
        let connection = self.transport.create_connection(events).await?;

        self.sessions.insert(
            peer.clone(),
            PeerSession {
                id,
                connection,
                state: ConnectionState::New,
                local_track: None,
                remote_track: None,
                has_remote_description: false,
                queued_candidates: Vec::new(),
            },
        );
        tracing::info!("Created peer session {} for {}", id, peer);
        Ok(())
    }

    /// Attach `stream` to the session for `peer` and send an offer
    pub async fn initiate_offer(&mut self, peer: &PeerId, stream: &MediaStream) -> Result<(), SessionError> {
        self.create_session(peer).await?;
        match self.build_offer(peer, stream).await {
            Ok(offer) => {
                self.send_signal(peer, SignalPayload::Sdp(offer));
                Ok(())
            }
            Err(e) => {
                self.mark_failed(peer, &e);
                Err(e)
            }
        }
    }

    async fn build_offer(
        &mut self,
        peer: &PeerId,
        stream: &MediaStream,
    ) -> Result<SessionDescription, SessionError> {
        let session = self
            .sessions
            .get_mut(peer)
            .ok_or_else(|| SessionError::NoSession(peer.clone()))?;

        for track in stream.tracks() {
            session.connection.add_track(track).await?;
        }
        session.local_track = stream.audio_track().cloned();

        let offer = session.connection.create_offer().await?;
        session.connection.set_local_description(offer.clone()).await?;
        tracing::debug!("Offer for {} ready", peer);
        Ok(offer)
    }

    /// Dispatch one signaling payload from `sender`.
    ///
    /// Malformed payloads and orphan answers are logged and ignored. An
    /// `Err` means negotiation failed; the session stays, marked failed.
    pub async fn handle_signal(
        &mut self,
        sender: &PeerId,
        payload: &serde_json::Value,
    ) -> Result<(), SessionError> {
        let Some(parsed) = SignalPayload::parse(payload) else {
            tracing::warn!("Ignoring malformed signal from {}", sender);
            return Ok(());
        };

        match parsed {
            SignalPayload::Sdp(desc) => match desc.sdp_type {
                SdpType::Offer => self.handle_offer(sender, desc).await,
                SdpType::Answer | SdpType::Pranswer => self.handle_answer(sender, desc).await,
                SdpType::Rollback => {
                    tracing::debug!("Ignoring rollback from {}", sender);
                    Ok(())
                }
            },
            SignalPayload::Candidate(candidate) => {
                self.handle_candidate(sender, candidate).await;
                Ok(())
            }
        }
    }

    async fn handle_offer(&mut self, sender: &PeerId, offer: SessionDescription) -> Result<(), SessionError> {
        // An offer on an already negotiated session comes from a fresh
        // connection on the far side
        let renegotiated = self
            .sessions
            .get(sender)
            .map(|session| session.has_remote_description)
            .unwrap_or(false);
        if renegotiated {
            tracing::info!("New offer from {}, replacing session", sender);
            self.close_session(sender).await;
        }

        self.create_session(sender).await?;
        match self.apply_remote(sender, offer).await {
            Ok(Some(answer)) => {
                self.send_signal(sender, SignalPayload::Sdp(answer));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.mark_failed(sender, &e);
                Err(e)
            }
        }
    }

    async fn handle_answer(&mut self, sender: &PeerId, answer: SessionDescription) -> Result<(), SessionError> {
        if !self.sessions.contains_key(sender) {
            tracing::warn!("Ignoring answer from {}: no session", sender);
            return Ok(());
        }
        match self.apply_remote(sender, answer).await {
            Ok(_) => Ok(()),
            Err(e) => {
                self.mark_failed(sender, &e);
                Err(e)
            }
        }
    }

    /// Set the remote description, replay held candidates and, if the far
    /// side offered, produce the local answer
    async fn apply_remote(
        &mut self,
        peer: &PeerId,
        desc: SessionDescription,
    ) -> Result<Option<SessionDescription>, SessionError> {
        let early = self.early_candidates.remove(peer).unwrap_or_default();
        let session = self
            .sessions
            .get_mut(peer)
            .ok_or_else(|| SessionError::NoSession(peer.clone()))?;

        session.connection.set_remote_description(desc).await?;
        session.has_remote_description = true;

        let mut replay = early;
        replay.append(&mut session.queued_candidates);
        if !replay.is_empty() {
            tracing::debug!("Replaying {} held candidates for {}", replay.len(), peer);
        }
        for candidate in replay {
            if let Err(e) = session.connection.add_ice_candidate(candidate).await {
                tracing::warn!("Held candidate from {} rejected: {}", peer, e);
            }
        }

        if session.connection.signaling_state() != SignalingState::HaveRemoteOffer {
            return Ok(None);
        }
        let answer = session.connection.create_answer().await?;
        session.connection.set_local_description(answer.clone()).await?;
        tracing::debug!("Answer for {} ready", peer);
        Ok(Some(answer))
    }

    async fn handle_candidate(&mut self, sender: &PeerId, candidate: IceCandidate) {
        let policy = self.policy;
        let max_pending = self.max_pending;

        match self.sessions.get_mut(sender) {
            Some(session) if session.has_remote_description || policy == CandidatePolicy::Drop => {
                if let Err(e) = session.connection.add_ice_candidate(candidate).await {
                    tracing::warn!("Candidate from {} rejected: {}", sender, e);
                }
            }
            Some(session) => {
                if session.queued_candidates.len() < max_pending {
                    session.queued_candidates.push(candidate);
                } else {
                    tracing::warn!("Candidate queue for {} full, dropping", sender);
                }
            }
            None if policy == CandidatePolicy::Buffer => {
                let held = self.early_candidates.entry(sender.clone()).or_default();
                if held.len() < max_pending {
                    held.push(candidate);
                    tracing::debug!("Holding early candidate from {}", sender);
                } else {
                    tracing::warn!("Early candidate buffer for {} full, dropping", sender);
                }
            }
            None => {
                tracing::warn!("Dropping candidate from {}: no session", sender);
            }
        }
    }

    /// Release the session for `peer`. Unknown peers are a no-op.
    /// Returns whether a session was closed.
    pub async fn close_session(&mut self, peer: &PeerId) -> bool {
        self.early_candidates.remove(peer);
        let Some(session) = self.sessions.remove(peer) else {
            return false;
        };

        if let Err(e) = session.connection.close().await {
            tracing::warn!("Error closing session with {}: {}", peer, e);
        }
        if let Some(track) = session.remote_track {
            track.stop();
            self.sink
                .notify_stream_available(&AudioSourceId::Remote(peer.clone()), None);
        }
        tracing::info!("Closed peer session {} with {}", session.id, peer);
        true
    }

    /// Close every session
    pub async fn close_all(&mut self) {
        let peers: Vec<PeerId> = self.sessions.keys().cloned().collect();
        for peer in peers {
            self.close_session(&peer).await;
        }
        self.early_candidates.clear();
    }

    /// Apply an event from the media engine
    pub fn handle_event(&mut self, event: PeerEvent) -> Option<SessionUpdate> {
        let current = self.sessions.get(&event.peer).map(|session| session.id);
        if current != Some(event.session) {
            tracing::debug!("Ignoring event from retired session {} of {}", event.session, event.peer);
            if let PeerEventKind::RemoteTrack(track) = event.kind {
                track.stop();
            }
            return None;
        }

        match event.kind {
            PeerEventKind::LocalCandidate(candidate) => {
                self.send_signal(&event.peer, SignalPayload::Candidate(candidate));
                None
            }
            PeerEventKind::RemoteTrack(track) => self.attach_remote_track(event.peer, track),
            PeerEventKind::StateChanged(state) => {
                let session = self.sessions.get_mut(&event.peer)?;
                if session.state == state {
                    return None;
                }
                session.state = state;
                match state {
                    ConnectionState::Failed => tracing::warn!("Session with {} failed", event.peer),
                    _ => tracing::info!("Session with {} is {}", event.peer, state),
                }
                Some(SessionUpdate::StateChanged {
                    peer: event.peer,
                    state,
                })
            }
        }
    }

    fn attach_remote_track(&mut self, peer: PeerId, track: AudioTrack) -> Option<SessionUpdate> {
        if self.role != Role::Studio {
            tracing::debug!("Ignoring remote track from {}", peer);
            return None;
        }
        let session = self.sessions.get_mut(&peer)?;
        if let Some(previous) = session.remote_track.replace(track.clone()) {
            if !previous.same_track(&track) {
                previous.stop();
            }
        }

        let source = AudioSourceId::Remote(peer);
        self.sink.notify_stream_available(&source, Some(track));
        let created = self.store.ensure_source(&source, self.store.remote_strip());
        tracing::info!("Remote audio from {} attached", source);
        Some(SessionUpdate::SourceAttached { source, created })
    }

    fn mark_failed(&mut self, peer: &PeerId, error: &SessionError) {
        tracing::warn!("Negotiation with {} failed: {}", peer, error);
        if let Some(session) = self.sessions.get_mut(peer) {
            session.state = ConnectionState::Failed;
        }
    }

    fn send_signal(&self, to: &PeerId, payload: SignalPayload) {
        if let Err(e) = self.relay.send(to, RelayMessage::signal(&payload)) {
            tracing::warn!("Signal to {} not sent: {}", to, e);
        }
    }
}
