//! In-memory stand-ins for the relay, media hardware and peer transport

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;

use remote_studio::audio::{AudioTrack, MediaProvider, MediaStream};
use remote_studio::error::{DeviceError, SessionError, SignalingError};
use remote_studio::peer::{
    ConnectionState, PeerConnection, PeerEventKind, PeerEventSender, PeerTransport, SignalingState,
};
use remote_studio::protocol::{
    AudioDeviceInfo, IceCandidate, PeerId, RelayMessage, SdpType, SessionDescription, SignalPayload,
};
use remote_studio::signaling::SignalingRelay;

pub fn candidate(n: u32) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{} 1 udp 2122260223 10.0.0.{} 5000{} typ host", n, n, n),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
        username_fragment: None,
    }
}

pub fn offer_value(sdp: &str) -> serde_json::Value {
    SignalPayload::Sdp(SessionDescription::offer(sdp)).to_value()
}

pub fn answer_value(sdp: &str) -> serde_json::Value {
    SignalPayload::Sdp(SessionDescription::answer(sdp)).to_value()
}

pub fn candidate_value(n: u32) -> serde_json::Value {
    SignalPayload::Candidate(candidate(n)).to_value()
}

/// Relay that records everything sent through it
#[derive(Default)]
pub struct FakeRelay {
    sent: Mutex<Vec<(PeerId, RelayMessage)>>,
    closed: AtomicBool,
}

impl FakeRelay {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<(PeerId, RelayMessage)> {
        self.sent.lock().clone()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    pub fn messages_to(&self, peer: &str) -> Vec<RelayMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|(to, _)| to.as_str() == peer)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn signals_to(&self, peer: &str) -> Vec<SignalPayload> {
        self.messages_to(peer)
            .into_iter()
            .filter_map(|message| match message {
                RelayMessage::Signal { payload } => SignalPayload::parse(&payload),
                _ => None,
            })
            .collect()
    }

    /// The last description sent to `peer`, as a relay payload
    pub fn last_sdp_to(&self, peer: &str) -> Option<SessionDescription> {
        self.signals_to(peer).into_iter().rev().find_map(|payload| match payload {
            SignalPayload::Sdp(desc) => Some(desc),
            SignalPayload::Candidate(_) => None,
        })
    }

    pub fn on_air_requests_to(&self, peer: &str) -> Vec<bool> {
        self.messages_to(peer)
            .into_iter()
            .filter_map(|message| match message {
                RelayMessage::RequestOnAir { on_air } => Some(on_air),
                _ => None,
            })
            .collect()
    }

    pub fn on_air_statuses_to(&self, peer: &str) -> Vec<bool> {
        self.messages_to(peer)
            .into_iter()
            .filter_map(|message| match message {
                RelayMessage::OnAirStatus { on_air } => Some(on_air),
                _ => None,
            })
            .collect()
    }
}

impl SignalingRelay for FakeRelay {
    fn send(&self, to: &PeerId, message: RelayMessage) -> Result<(), SignalingError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SignalingError::RelayClosed);
        }
        self.sent.lock().push((to.clone(), message));
        Ok(())
    }
}

/// Media provider with scripted outcomes
///
/// Acquisitions wait on a gate so tests can hold them in flight.
pub struct FakeMediaProvider {
    outcomes: Mutex<VecDeque<Result<(), DeviceError>>>,
    requests: Mutex<Vec<Option<String>>>,
    streams: Mutex<Vec<MediaStream>>,
    inputs: Mutex<Vec<AudioDeviceInfo>>,
    gate: Semaphore,
}

impl FakeMediaProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::with_gate(Semaphore::MAX_PERMITS))
    }

    /// Provider whose acquisitions block until [`FakeMediaProvider::release`]
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::with_gate(0))
    }

    fn with_gate(permits: usize) -> Self {
        Self {
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            streams: Mutex::new(Vec::new()),
            inputs: Mutex::new(vec![input("input:Built-in", true), input("input:USB Mic", false)]),
            gate: Semaphore::new(permits),
        }
    }

    /// Queue the outcome of the next acquisition; unscripted ones succeed
    pub fn script(&self, outcome: Result<(), DeviceError>) {
        self.outcomes.lock().push_back(outcome);
    }

    pub fn release(&self, count: usize) {
        self.gate.add_permits(count);
    }

    pub fn set_inputs(&self, inputs: Vec<AudioDeviceInfo>) {
        *self.inputs.lock() = inputs;
    }

    /// Device ids requested so far
    pub fn requests(&self) -> Vec<Option<String>> {
        self.requests.lock().clone()
    }

    pub fn streams(&self) -> Vec<MediaStream> {
        self.streams.lock().clone()
    }
}

pub fn input(id: &str, is_default: bool) -> AudioDeviceInfo {
    AudioDeviceInfo {
        id: id.to_string(),
        name: id.trim_start_matches("input:").to_string(),
        is_default,
        sample_rates: vec![48000],
        channels: vec![1, 2],
    }
}

#[async_trait]
impl MediaProvider for FakeMediaProvider {
    async fn acquire(&self, device_id: Option<&str>) -> Result<MediaStream, DeviceError> {
        self.requests.lock().push(device_id.map(str::to_string));
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }

        let outcome = self.outcomes.lock().pop_front().unwrap_or(Ok(()));
        outcome?;
        let label = device_id.unwrap_or("default").to_string();
        let stream = MediaStream::new(vec![AudioTrack::new(label, 48000, 1)]);
        self.streams.lock().push(stream.clone());
        Ok(stream)
    }

    async fn enumerate_inputs(&self) -> Vec<AudioDeviceInfo> {
        self.inputs.lock().clone()
    }
}

/// Observable state of one fake connection
pub struct FakeConnectionState {
    pub events: PeerEventSender,
    signaling: Mutex<SignalingState>,
    connection: Mutex<ConnectionState>,
    local: Mutex<Option<SessionDescription>>,
    remote: Mutex<Option<SessionDescription>>,
    candidates: Mutex<Vec<IceCandidate>>,
    tracks: Mutex<Vec<AudioTrack>>,
    closed: AtomicBool,
    fail_remote: bool,
}

impl FakeConnectionState {
    pub fn peer(&self) -> &PeerId {
        self.events.peer()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn signaling_state(&self) -> SignalingState {
        *self.signaling.lock()
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local.lock().clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote.lock().clone()
    }

    pub fn candidates(&self) -> Vec<IceCandidate> {
        self.candidates.lock().clone()
    }

    pub fn tracks(&self) -> Vec<AudioTrack> {
        self.tracks.lock().clone()
    }

    /// Pretend remote audio arrived; returns the track delivered
    pub fn deliver_remote_track(&self) -> AudioTrack {
        let track = AudioTrack::new(format!("remote {}", self.peer()), 48000, 1);
        self.events.emit(PeerEventKind::RemoteTrack(track.clone()));
        track
    }

    pub fn gather_candidate(&self, n: u32) {
        self.events.emit(PeerEventKind::LocalCandidate(candidate(n)));
    }

    pub fn change_state(&self, state: ConnectionState) {
        *self.connection.lock() = state;
        self.events.emit(PeerEventKind::StateChanged(state));
    }
}

struct FakeConnection {
    state: Arc<FakeConnectionState>,
}

#[async_trait]
impl PeerConnection for FakeConnection {
    async fn add_track(&self, track: &AudioTrack) -> Result<(), SessionError> {
        self.state.tracks.lock().push(track.clone());
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, SessionError> {
        Ok(SessionDescription::offer(format!("offer from {}", self.state.peer())))
    }

    async fn create_answer(&self) -> Result<SessionDescription, SessionError> {
        if self.state.signaling_state() != SignalingState::HaveRemoteOffer {
            return Err(SessionError::Negotiation("no remote offer to answer".into()));
        }
        Ok(SessionDescription::answer(format!("answer to {}", self.state.peer())))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), SessionError> {
        let next = match desc.sdp_type {
            SdpType::Offer => SignalingState::HaveLocalOffer,
            _ => SignalingState::Stable,
        };
        *self.state.signaling.lock() = next;
        *self.state.local.lock() = Some(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), SessionError> {
        if self.state.fail_remote {
            return Err(SessionError::Negotiation("incompatible media".into()));
        }
        let next = match desc.sdp_type {
            SdpType::Offer => SignalingState::HaveRemoteOffer,
            _ => SignalingState::Stable,
        };
        *self.state.signaling.lock() = next;
        *self.state.remote.lock() = Some(desc);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError> {
        if self.state.remote.lock().is_none() {
            return Err(SessionError::Negotiation("no remote description".into()));
        }
        self.state.candidates.lock().push(candidate);
        Ok(())
    }

    fn signaling_state(&self) -> SignalingState {
        self.state.signaling_state()
    }

    fn connection_state(&self) -> ConnectionState {
        *self.state.connection.lock()
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.state.closed.store(true, Ordering::SeqCst);
        *self.state.signaling.lock() = SignalingState::Closed;
        *self.state.connection.lock() = ConnectionState::Closed;
        Ok(())
    }
}

/// Transport handing out [`FakeConnection`]s and keeping their state
#[derive(Default)]
pub struct FakeTransport {
    connections: Mutex<Vec<Arc<FakeConnectionState>>>,
    fail_remote: AtomicBool,
    created: AtomicUsize,
}

impl FakeTransport {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make every later connection reject remote descriptions
    pub fn fail_negotiation(&self) {
        self.fail_remote.store(true, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn connections(&self) -> Vec<Arc<FakeConnectionState>> {
        self.connections.lock().clone()
    }

    /// Most recent connection toward `peer`
    pub fn latest(&self, peer: &str) -> Option<Arc<FakeConnectionState>> {
        self.connections
            .lock()
            .iter()
            .rev()
            .find(|state| state.peer().as_str() == peer)
            .cloned()
    }
}

#[async_trait]
impl PeerTransport for FakeTransport {
    async fn create_connection(
        &self,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerConnection>, SessionError> {
        let state = Arc::new(FakeConnectionState {
            events,
            signaling: Mutex::new(SignalingState::Stable),
            connection: Mutex::new(ConnectionState::New),
            local: Mutex::new(None),
            remote: Mutex::new(None),
            candidates: Mutex::new(Vec::new()),
            tracks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            fail_remote: self.fail_remote.load(Ordering::SeqCst),
        });
        self.connections.lock().push(state.clone());
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection { state }))
    }
}
