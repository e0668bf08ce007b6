//! WebRTC peer transport
//!
//! Local audio is Opus-encoded on a dedicated thread and written to a
//! `TrackLocalStaticSample`; remote RTP is decoded on another thread and
//! pushed into a fresh [`AudioTrack`] reported as a remote-track event.

use async_trait::async_trait;
use bytes::Bytes;
use crossbeam_channel::{bounded, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::audio::buffer::AudioFrame;
use crate::audio::stream::AudioTrack;
use crate::codec::{OpusDecoder, OpusEncoder};
use crate::config::{AudioSettings, IceConfig};
use crate::error::SessionError;
use crate::peer::transport::{
    ConnectionState, PeerConnection, PeerEventKind, PeerEventSender, PeerTransport, SignalingState,
};
use crate::protocol::{IceCandidate, SdpType, SessionDescription};

/// Packets in flight between the RTP reader and the decoder thread
const DECODE_QUEUE: usize = 64;

fn transport_err(e: impl std::fmt::Display) -> SessionError {
    SessionError::Transport(e.to_string())
}

fn negotiation_err(e: impl std::fmt::Display) -> SessionError {
    SessionError::Negotiation(e.to_string())
}

/// Peer transport backed by the `webrtc` crate
pub struct WebRtcTransport {
    api: API,
    ice_servers: Vec<RTCIceServer>,
    audio: AudioSettings,
}

impl WebRtcTransport {
    pub fn new(ice: &IceConfig, audio: AudioSettings) -> Result<Self, SessionError> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(transport_err)?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine).map_err(transport_err)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if ice.stun_urls.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer {
                urls: ice.stun_urls.clone(),
                ..Default::default()
            }]
        };

        Ok(Self {
            api,
            ice_servers,
            audio,
        })
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_connection(
        &self,
        events: PeerEventSender,
    ) -> Result<Box<dyn PeerConnection>, SessionError> {
        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };
        let pc = Arc::new(self.api.new_peer_connection(config).await.map_err(transport_err)?);
        let remote_tracks: Arc<Mutex<Vec<AudioTrack>>> = Arc::new(Mutex::new(Vec::new()));

        let candidate_events = events.clone();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => events.emit(PeerEventKind::LocalCandidate(from_init(init))),
                    Err(e) => tracing::warn!("Unserializable local candidate: {}", e),
                }
            })
        }));

        let state_events = events.clone();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            state_events.emit(PeerEventKind::StateChanged(map_connection_state(state)));
            Box::pin(async {})
        }));

        let track_events = events.clone();
        let audio = self.audio.clone();
        let tracked = remote_tracks.clone();
        pc.on_track(Box::new(move |remote, _receiver, _transceiver| {
            let track = spawn_remote_decoder(remote, &audio, track_events.peer().to_string());
            if let Some(track) = track {
                tracked.lock().push(track.clone());
                track_events.emit(PeerEventKind::RemoteTrack(track));
            }
            Box::pin(async {})
        }));

        Ok(Box::new(WebRtcConnection {
            pc,
            audio: self.audio.clone(),
            local_pumps: Mutex::new(Vec::new()),
            remote_tracks,
            closed: AtomicBool::new(false),
        }))
    }
}

struct WebRtcConnection {
    pc: Arc<RTCPeerConnection>,
    audio: AudioSettings,
    local_pumps: Mutex<Vec<Arc<AtomicBool>>>,
    remote_tracks: Arc<Mutex<Vec<AudioTrack>>>,
    closed: AtomicBool,
}

impl WebRtcConnection {
    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed.load(Ordering::Acquire) {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PeerConnection for WebRtcConnection {
    async fn add_track(&self, track: &AudioTrack) -> Result<(), SessionError> {
        self.ensure_open()?;
        let local = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                clock_rate: track.sample_rate(),
                channels: track.channels(),
                sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                rtcp_feedback: vec![],
            },
            format!("audio-{}", track.id()),
            format!("contribution-{}", track.id()),
        ));

        let rtp_sender = self
            .pc
            .add_track(local.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(transport_err)?;

        // RTCP has to be drained for the interceptors to run
        tokio::spawn(async move {
            let mut rtcp_buf = vec![0u8; 1500];
            while let Ok((_, _)) = rtp_sender.read(&mut rtcp_buf).await {}
        });

        let stop = spawn_local_encoder(track, local, &self.audio)?;
        self.local_pumps.lock().push(stop);
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, SessionError> {
        self.ensure_open()?;
        let offer = self.pc.create_offer(None).await.map_err(negotiation_err)?;
        Ok(from_rtc(&offer))
    }

    async fn create_answer(&self) -> Result<SessionDescription, SessionError> {
        self.ensure_open()?;
        let answer = self.pc.create_answer(None).await.map_err(negotiation_err)?;
        Ok(from_rtc(&answer))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<(), SessionError> {
        self.ensure_open()?;
        let desc = to_rtc(desc)?;
        self.pc.set_local_description(desc).await.map_err(negotiation_err)
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<(), SessionError> {
        self.ensure_open()?;
        let desc = to_rtc(desc)?;
        self.pc.set_remote_description(desc).await.map_err(negotiation_err)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.pc
            .add_ice_candidate(to_init(candidate))
            .await
            .map_err(negotiation_err)
    }

    fn signaling_state(&self) -> SignalingState {
        match self.pc.signaling_state() {
            RTCSignalingState::HaveLocalOffer | RTCSignalingState::HaveLocalPranswer => {
                SignalingState::HaveLocalOffer
            }
            RTCSignalingState::HaveRemoteOffer | RTCSignalingState::HaveRemotePranswer => {
                SignalingState::HaveRemoteOffer
            }
            RTCSignalingState::Closed => SignalingState::Closed,
            _ => SignalingState::Stable,
        }
    }

    fn connection_state(&self) -> ConnectionState {
        map_connection_state(self.pc.connection_state())
    }

    async fn close(&self) -> Result<(), SessionError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        for stop in self.local_pumps.lock().drain(..) {
            stop.store(true, Ordering::SeqCst);
        }
        for track in self.remote_tracks.lock().drain(..) {
            track.stop();
        }
        self.pc.close().await.map_err(transport_err)
    }
}

/// Encode `track` into `local` until stopped. Returns the stop flag.
fn spawn_local_encoder(
    track: &AudioTrack,
    local: Arc<TrackLocalStaticSample>,
    audio: &AudioSettings,
) -> Result<Arc<AtomicBool>, SessionError> {
    let stop = Arc::new(AtomicBool::new(false));
    let buffer = track.subscribe(audio.tap_capacity);
    let (packet_tx, mut packet_rx) = mpsc::channel::<Bytes>(64);
    let frame_duration = Duration::from_secs_f32(audio.frame_size_ms / 1000.0);

    let source = track.clone();
    let sample_rate = track.sample_rate();
    let channels = track.channels();
    let bitrate = audio.bitrate;
    let frame_ms = audio.frame_size_ms;
    let stop_flag = stop.clone();

    thread::Builder::new()
        .name(format!("opus-enc-{}", track.id()))
        .spawn(move || {
            let mut encoder = match OpusEncoder::new(sample_rate, channels, bitrate, frame_ms) {
                Ok(encoder) => encoder,
                Err(e) => {
                    tracing::error!("Cannot start encoder: {}", e);
                    return;
                }
            };
            let mut pending = Vec::new();
            while !stop_flag.load(Ordering::Relaxed) && source.is_live() {
                pending.clear();
                if buffer.drain_into(&mut pending) == 0 {
                    thread::sleep(Duration::from_millis(5));
                    continue;
                }
                match encoder.push_samples(&pending) {
                    Ok(packets) => {
                        for packet in packets {
                            if packet_tx.blocking_send(packet).is_err() {
                                return;
                            }
                        }
                    }
                    Err(e) => tracing::warn!("Encode failed: {}", e),
                }
            }
            source.unsubscribe(&buffer);
        })
        .map_err(transport_err)?;

    tokio::spawn(async move {
        while let Some(data) = packet_rx.recv().await {
            let sample = Sample {
                data,
                duration: frame_duration,
                ..Default::default()
            };
            if let Err(e) = local.write_sample(&sample).await {
                tracing::debug!("Dropping outbound sample: {}", e);
            }
        }
    });

    Ok(stop)
}

/// Decode `remote` into a new audio track
fn spawn_remote_decoder(remote: Arc<TrackRemote>, audio: &AudioSettings, peer: String) -> Option<AudioTrack> {
    let sample_rate = audio.sample_rate;
    let channels = audio.channels;
    let track = AudioTrack::new(format!("remote {}", peer), sample_rate, channels);
    let (packet_tx, packet_rx) = bounded::<(u16, Bytes)>(DECODE_QUEUE);

    let producer = track.clone();
    let spawned = thread::Builder::new()
        .name(format!("opus-dec-{}", peer))
        .spawn(move || {
            let mut decoder = match OpusDecoder::new(sample_rate, channels) {
                Ok(decoder) => decoder,
                Err(e) => {
                    tracing::error!("Cannot start decoder: {}", e);
                    return;
                }
            };
            let mut sequence = 0u32;
            while let Ok((seq, payload)) = packet_rx.recv() {
                match decoder.decode_sequenced(seq, &payload) {
                    Ok(samples) => {
                        producer.push_frame(AudioFrame::new(samples, channels, 0, sequence));
                        sequence = sequence.wrapping_add(1);
                    }
                    Err(e) => tracing::debug!("Decode failed: {}", e),
                }
                if !producer.is_live() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        tracing::error!("Cannot spawn decoder thread: {}", e);
        return None;
    }

    let reader = tokio::spawn(async move {
        while let Ok((packet, _)) = remote.read_rtp().await {
            match packet_tx.try_send((packet.header.sequence_number, packet.payload)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => tracing::debug!("Decoder behind, dropping packet"),
                Err(TrySendError::Disconnected(_)) => break,
            }
        }
    });
    track.set_stop_handler(move || reader.abort());

    Some(track)
}

fn map_connection_state(state: RTCPeerConnectionState) -> ConnectionState {
    match state {
        RTCPeerConnectionState::Connecting => ConnectionState::Connecting,
        RTCPeerConnectionState::Connected => ConnectionState::Connected,
        RTCPeerConnectionState::Disconnected => ConnectionState::Disconnected,
        RTCPeerConnectionState::Failed => ConnectionState::Failed,
        RTCPeerConnectionState::Closed => ConnectionState::Closed,
        _ => ConnectionState::New,
    }
}

fn from_rtc(desc: &RTCSessionDescription) -> SessionDescription {
    let sdp_type = match desc.sdp_type {
        RTCSdpType::Answer => SdpType::Answer,
        RTCSdpType::Pranswer => SdpType::Pranswer,
        RTCSdpType::Rollback => SdpType::Rollback,
        _ => SdpType::Offer,
    };
    SessionDescription {
        sdp_type,
        sdp: desc.sdp.clone(),
    }
}

fn to_rtc(desc: SessionDescription) -> Result<RTCSessionDescription, SessionError> {
    let converted = match desc.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(desc.sdp),
        SdpType::Answer => RTCSessionDescription::answer(desc.sdp),
        SdpType::Pranswer => RTCSessionDescription::pranswer(desc.sdp),
        SdpType::Rollback => {
            return Err(SessionError::Negotiation("rollback is not supported".into()))
        }
    };
    converted.map_err(negotiation_err)
}

fn from_init(init: RTCIceCandidateInit) -> IceCandidate {
    IceCandidate {
        candidate: init.candidate,
        sdp_mid: init.sdp_mid,
        sdp_mline_index: init.sdp_mline_index,
        username_fragment: init.username_fragment,
    }
}

fn to_init(candidate: IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate,
        sdp_mid: candidate.sdp_mid,
        sdp_mline_index: candidate.sdp_mline_index,
        username_fragment: candidate.username_fragment,
    }
}
