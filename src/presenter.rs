//! Presenter role actor
//!
//! Owns the local microphone and the single peer session toward the studio.
//! Device acquisition runs on spawned tasks whose results come back tagged
//! with the generation that requested them; [`MicController`] decides
//! whether a result is still wanted.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

use crate::audio::provider::{DeviceEvent, MediaProvider};
use crate::audio::stream::MediaStream;
use crate::config::AppConfig;
use crate::error::{DeviceError, Error, MixerError, Result, SignalingError};
use crate::mic::{AcquireRequest, ConnectOutcome, MicController, MicState};
use crate::mixer::{AudioSourceId, BusName, MixerStore, SendUpdate, SourceTarget};
use crate::peer::{ConnectionState, PeerEvent, PeerSessionManager, PeerTransport, SessionUpdate};
use crate::protocol::{AudioDeviceInfo, PeerId, RelayMessage, Role};
use crate::routing::RoutingSink;
use crate::signaling::{RelayEvent, SignalingRelay};

const COMMAND_QUEUE: usize = 64;
const METER_INTERVAL: Duration = Duration::from_millis(50);

/// Operator intents from the presenter console
#[derive(Debug, Clone)]
pub enum PresenterCommand {
    /// Acquire the selected input without going on air
    Connect,
    SelectDevice(Option<String>),
    ToggleOnAir,
    GoOnAir,
    GoOffAir,
    SetChannelGain(f32),
    ToggleMute,
    TogglePfl,
    SetSend { bus: BusName, update: SendUpdate },
    Shutdown,
}

/// Console view of the presenter
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PresenterStatus {
    pub peer_id: PeerId,
    pub mic_state: MicState,
    pub selected_device: Option<String>,
    pub error: Option<String>,
    pub requested_on_air: bool,
    pub confirmed_on_air: bool,
    pub session: Option<ConnectionState>,
    pub peak_db: f32,
    pub rms_db: f32,
    pub devices: Vec<AudioDeviceInfo>,
}

/// Completed device acquisition
struct Acquired {
    request: AcquireRequest,
    result: std::result::Result<MediaStream, DeviceError>,
}

type Request = (PresenterCommand, oneshot::Sender<Result<()>>);

/// Cloneable handle for driving a running [`Presenter`]
#[derive(Clone)]
pub struct PresenterHandle {
    commands: mpsc::Sender<Request>,
    status: watch::Receiver<PresenterStatus>,
}

impl PresenterHandle {
    /// Submit `command` and wait for the presenter to apply it
    pub async fn send(&self, command: PresenterCommand) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send((command, reply_tx))
            .await
            .map_err(|_| Error::Signaling(SignalingError::NotConnected))?;
        reply_rx
            .await
            .map_err(|_| Error::Signaling(SignalingError::NotConnected))?
    }

    pub fn status(&self) -> PresenterStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PresenterStatus> {
        self.status.clone()
    }
}

pub struct Presenter {
    id: PeerId,
    studio: PeerId,
    mic: MicController,
    sessions: PeerSessionManager,
    store: MixerStore,
    relay: Arc<dyn SignalingRelay>,
    provider: Arc<dyn MediaProvider>,
    devices: Vec<AudioDeviceInfo>,
    acquired_tx: mpsc::UnboundedSender<Acquired>,
    acquired: mpsc::UnboundedReceiver<Acquired>,
    peer_events: mpsc::UnboundedReceiver<PeerEvent>,
    commands: mpsc::Receiver<Request>,
    command_tx: mpsc::Sender<Request>,
    status: watch::Sender<PresenterStatus>,
}

impl Presenter {
    pub fn new(
        config: &AppConfig,
        provider: Arc<dyn MediaProvider>,
        transport: Arc<dyn PeerTransport>,
        relay: Arc<dyn SignalingRelay>,
        store: MixerStore,
        sink: Arc<dyn RoutingSink>,
    ) -> Self {
        let id = PeerId::new(config.identity.peer_id.as_str());
        let (event_tx, peer_events) = mpsc::unbounded_channel();
        let (acquired_tx, acquired) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let (status, _) = watch::channel(PresenterStatus {
            peer_id: id.clone(),
            ..Default::default()
        });

        let mic = MicController::new(store.clone(), sink.clone(), &config.audio);
        let sessions = PeerSessionManager::new(
            Role::Presenter,
            transport,
            relay.clone(),
            store.clone(),
            sink,
            event_tx,
            &config.signaling,
        );

        Self {
            id,
            studio: PeerId::new(config.signaling.studio_id.as_str()),
            mic,
            sessions,
            store,
            relay,
            provider,
            devices: Vec::new(),
            acquired_tx,
            acquired,
            peer_events,
            commands,
            command_tx,
            status,
        }
    }

    pub fn handle(&self) -> PresenterHandle {
        PresenterHandle {
            commands: self.command_tx.clone(),
            status: self.status.subscribe(),
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn mic(&self) -> &MicController {
        &self.mic
    }

    pub fn sessions(&self) -> &PeerSessionManager {
        &self.sessions
    }

    pub fn store(&self) -> &MixerStore {
        &self.store
    }

    pub fn devices(&self) -> &[AudioDeviceInfo] {
        &self.devices
    }

    /// Run until shutdown or until the relay closes
    pub async fn run(
        mut self,
        mut relay_events: mpsc::Receiver<RelayEvent>,
        mut device_events: mpsc::Receiver<DeviceEvent>,
    ) {
        tracing::info!("Presenter {} running, studio is {}", self.id, self.studio);
        self.devices = self.provider.enumerate_inputs().await;
        self.publish_status();

        let mut meter_tick = tokio::time::interval(METER_INTERVAL);
        meter_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = relay_events.recv() => {
                    let Some(event) = event else { break };
                    if !self.handle_relay_event(event).await {
                        break;
                    }
                }

                Some(acquired) = self.acquired.recv() => {
                    self.apply_acquisition(acquired).await;
                }

                Some(event) = self.peer_events.recv() => {
                    self.handle_peer_event(event);
                }

                Some(event) = device_events.recv() => {
                    self.handle_device_event(event);
                }

                request = self.commands.recv() => {
                    let Some((command, reply)) = request else { break };
                    if matches!(command, PresenterCommand::Shutdown) {
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    let result = self.handle_command(command).await;
                    if let Err(e) = &result {
                        tracing::warn!("Presenter command failed: {}", e);
                    }
                    let _ = reply.send(result);
                }

                _ = meter_tick.tick() => {
                    self.mic.refresh_meter();
                    self.publish_status();
                }
            }
        }

        self.shutdown().await;
    }

    /// Apply one operator command
    pub async fn handle_command(&mut self, command: PresenterCommand) -> Result<()> {
        let result = match command {
            PresenterCommand::Connect => {
                if let Some(request) = self.mic.connect() {
                    self.spawn_acquire(request);
                }
                Ok(())
            }
            PresenterCommand::SelectDevice(device_id) => {
                self.select_device(device_id).await;
                Ok(())
            }
            PresenterCommand::ToggleOnAir => {
                if self.mic.on_air().requested_on_air {
                    self.go_off_air().await;
                } else {
                    self.go_on_air().await;
                }
                Ok(())
            }
            PresenterCommand::GoOnAir => {
                self.go_on_air().await;
                Ok(())
            }
            PresenterCommand::GoOffAir => {
                self.go_off_air().await;
                Ok(())
            }
            PresenterCommand::SetChannelGain(gain) => self
                .store
                .set_channel_gain(&mic_target(), gain)
                .map_err(Error::from),
            PresenterCommand::ToggleMute => self.store.toggle_mute(&mic_target()).map_err(Error::from),
            PresenterCommand::TogglePfl => self.store.toggle_pfl(&mic_target()).map_err(Error::from),
            PresenterCommand::SetSend { bus, update } => {
                if bus == BusName::Main && update.enabled.is_some() {
                    Err(MixerError::AdmissionControlled(mic_target()).into())
                } else {
                    self.store.set_send(&mic_target(), bus, update).map_err(Error::from)
                }
            }
            PresenterCommand::Shutdown => Ok(()),
        };
        self.publish_status();
        result
    }

    async fn select_device(&mut self, device_id: Option<String>) {
        let Some(request) = self.mic.select_device(device_id) else {
            return;
        };
        // The old stream is gone, so is whatever the studio was receiving
        if self.sessions.close_session(&self.studio).await {
            tracing::info!("Input changed, session with {} closed", self.studio);
        }
        self.spawn_acquire(request);
    }

    async fn go_on_air(&mut self) {
        let transition = self.mic.go_on_air();
        self.request_on_air(true);

        if let Some(request) = transition.acquire {
            self.spawn_acquire(request);
        }
        if let Some(stream) = transition.stream {
            self.offer(&stream).await;
        }
    }

    /// Stop contributing immediately; the studio's bus state follows later
    async fn go_off_air(&mut self) {
        let was_requested = self.mic.go_off_air();
        if self.sessions.close_session(&self.studio).await {
            tracing::info!("Off air, session with {} closed", self.studio);
        }
        if was_requested {
            self.request_on_air(false);
        }
    }

    fn request_on_air(&self, on_air: bool) {
        if let Err(e) = self.relay.send(&self.studio, RelayMessage::RequestOnAir { on_air }) {
            tracing::warn!("On-air request to {} not sent: {}", self.studio, e);
        }
    }

    async fn offer(&mut self, stream: &MediaStream) {
        if self.sessions.has_session(&self.studio) {
            return;
        }
        if let Err(e) = self.sessions.initiate_offer(&self.studio, stream).await {
            tracing::warn!("Offer to {} failed: {}", self.studio, e);
        }
    }

    fn spawn_acquire(&self, request: AcquireRequest) {
        let provider = self.provider.clone();
        let tx = self.acquired_tx.clone();
        tokio::spawn(async move {
            let result = provider.acquire(request.device_id.as_deref()).await;
            if let Err(mpsc::error::SendError(unwanted)) = tx.send(Acquired { request, result }) {
                if let Ok(stream) = unwanted.result {
                    stream.stop();
                }
            }
        });
    }

    /// Wait for the next in-flight acquisition and apply it. Returns false
    /// if no acquisition can arrive.
    pub async fn next_acquisition(&mut self) -> bool {
        match self.acquired.recv().await {
            Some(acquired) => {
                self.apply_acquisition(acquired).await;
                true
            }
            None => false,
        }
    }

    async fn apply_acquisition(&mut self, acquired: Acquired) {
        match self.mic.complete_connect(&acquired.request, acquired.result) {
            ConnectOutcome::Ready(stream) => {
                // Resume the offer only if on-air is still wanted
                if self.mic.on_air().requested_on_air {
                    self.offer(&stream).await;
                }
            }
            ConnectOutcome::Failed(e) => {
                tracing::warn!("Microphone unavailable: {}", e.operator_message());
            }
            ConnectOutcome::Retry(request) => self.spawn_acquire(request),
            ConnectOutcome::Stale => {}
        }
        self.publish_status();
    }

    /// Apply one relay event. Returns false once the relay is gone.
    pub async fn handle_relay_event(&mut self, event: RelayEvent) -> bool {
        match event {
            RelayEvent::Received { sender, message } if sender == self.studio => match message {
                RelayMessage::Signal { payload } => {
                    if let Err(e) = self.sessions.handle_signal(&sender, &payload).await {
                        tracing::warn!("Signal from {} left the session stalled: {}", sender, e);
                    }
                    self.pump_peer_events();
                }
                RelayMessage::OnAirStatus { on_air } => self.mic.apply_confirmation(on_air),
                RelayMessage::RequestOnAir { .. } => {
                    tracing::debug!("Ignoring on-air request from {}", sender);
                }
            },
            RelayEvent::Received { sender, .. } => {
                tracing::warn!("Ignoring message from {}: not the studio", sender);
            }
            RelayEvent::Roster(_) => {}
            RelayEvent::Closed => {
                tracing::error!("Signaling relay connection lost");
                return false;
            }
        }
        self.publish_status();
        true
    }

    /// Apply one event from the media engine
    pub fn handle_peer_event(&mut self, event: PeerEvent) {
        if let Some(SessionUpdate::StateChanged { .. }) = self.sessions.handle_event(event) {
            self.publish_status();
        }
    }

    /// Apply every peer event queued so far. Returns how many were handled.
    pub fn pump_peer_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.peer_events.try_recv() {
            self.handle_peer_event(event);
            handled += 1;
        }
        handled
    }

    pub fn handle_device_event(&mut self, event: DeviceEvent) {
        let DeviceEvent::InputsChanged(devices) = event;
        if let Some(selected) = self.mic.selected_device() {
            if !devices.iter().any(|device| device.id == selected) {
                tracing::warn!("Selected input {} is no longer listed", selected);
            }
        }
        self.devices = devices;
        self.publish_status();
    }

    /// Leave the air, close the session and release the microphone
    pub async fn shutdown(&mut self) {
        self.go_off_air().await;
        self.sessions.close_all().await;
        self.mic.teardown();
        self.publish_status();
        tracing::info!("Presenter {} stopped", self.id);
    }

    fn publish_status(&self) {
        let on_air = self.mic.on_air();
        let status = PresenterStatus {
            peer_id: self.id.clone(),
            mic_state: self.mic.state(),
            selected_device: self.mic.selected_device().map(str::to_string),
            error: self.mic.error_message().map(str::to_string),
            requested_on_air: on_air.requested_on_air,
            confirmed_on_air: on_air.confirmed_on_air,
            session: self.sessions.session_state(&self.studio),
            peak_db: self.mic.meter().peak_db(),
            rms_db: self.mic.meter().rms_db(),
            devices: self.devices.clone(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}

fn mic_target() -> SourceTarget {
    SourceTarget::Source(AudioSourceId::Mic)
}
