//! Studio role actor
//!
//! Aggregates remote presenters: answers their offers, turns arriving audio
//! into channel strips, tracks on-air requests and owns the authoritative
//! `main` send of every remote source.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

use crate::binder::PresenceBinder;
use crate::config::AppConfig;
use crate::error::{Error, MixerError, Result, SignalingError};
use crate::mixer::{AudioSourceId, BusName, MixerStore, SendUpdate, SourceTarget};
use crate::peer::{PeerEvent, PeerSessionManager, PeerTransport, SessionSummary, SessionUpdate};
use crate::protocol::{PeerId, RelayMessage, Role};
use crate::routing::RoutingSink;
use crate::signaling::{RelayEvent, SignalingRelay};

const COMMAND_QUEUE: usize = 64;

/// Operator intents from the studio console
#[derive(Debug, Clone)]
pub enum StudioCommand {
    SetPresenterOnAir { peer: PeerId, on_air: bool },
    SetChannelGain { target: SourceTarget, gain: f32 },
    ToggleMute { target: SourceTarget },
    TogglePfl { target: SourceTarget },
    SetSend { target: SourceTarget, bus: BusName, update: SendUpdate },
    RemoveSource { peer: PeerId },
    CloseSession { peer: PeerId },
    Shutdown,
}

/// Console view of the studio
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StudioStatus {
    pub peer_id: PeerId,
    /// Presenters connected to the relay
    pub roster: Vec<PeerId>,
    /// Presenters waiting to be put on air, oldest first
    pub requests: Vec<PendingRequest>,
    pub admitted: Vec<PeerId>,
    pub sessions: Vec<SessionSummary>,
}

/// An on-air request the operator has not answered yet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRequest {
    pub peer_id: PeerId,
    pub requested_at: DateTime<Utc>,
}

type Request = (StudioCommand, oneshot::Sender<Result<()>>);

/// Cloneable handle for driving a running [`Studio`]
#[derive(Clone)]
pub struct StudioHandle {
    commands: mpsc::Sender<Request>,
    status: watch::Receiver<StudioStatus>,
    store: MixerStore,
}

impl StudioHandle {
    /// Submit `command` and wait for the studio to apply it
    pub async fn send(&self, command: StudioCommand) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send((command, reply_tx))
            .await
            .map_err(|_| Error::Signaling(SignalingError::NotConnected))?;
        reply_rx
            .await
            .map_err(|_| Error::Signaling(SignalingError::NotConnected))?
    }

    pub fn status(&self) -> StudioStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<StudioStatus> {
        self.status.clone()
    }

    pub fn store(&self) -> &MixerStore {
        &self.store
    }
}

pub struct Studio {
    id: PeerId,
    sessions: PeerSessionManager,
    binder: PresenceBinder,
    store: MixerStore,
    relay: Arc<dyn SignalingRelay>,
    auto_admit: bool,
    requests: BTreeMap<PeerId, DateTime<Utc>>,
    peer_events: mpsc::UnboundedReceiver<PeerEvent>,
    commands: mpsc::Receiver<Request>,
    command_tx: mpsc::Sender<Request>,
    status: watch::Sender<StudioStatus>,
}

impl Studio {
    pub fn new(
        config: &AppConfig,
        transport: Arc<dyn PeerTransport>,
        relay: Arc<dyn SignalingRelay>,
        store: MixerStore,
        sink: Arc<dyn RoutingSink>,
    ) -> Self {
        let id = PeerId::new(config.signaling.studio_id.as_str());
        let (event_tx, peer_events) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::channel(COMMAND_QUEUE);
        let (status, _) = watch::channel(StudioStatus {
            peer_id: id.clone(),
            ..Default::default()
        });

        let sessions = PeerSessionManager::new(
            Role::Studio,
            transport,
            relay.clone(),
            store.clone(),
            sink,
            event_tx,
            &config.signaling,
        );

        Self {
            id,
            sessions,
            binder: PresenceBinder::new(store.clone()),
            store,
            relay,
            auto_admit: config.studio.auto_admit,
            requests: BTreeMap::new(),
            peer_events,
            commands,
            command_tx,
            status,
        }
    }

    pub fn handle(&self) -> StudioHandle {
        StudioHandle {
            commands: self.command_tx.clone(),
            status: self.status.subscribe(),
            store: self.store.clone(),
        }
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn store(&self) -> &MixerStore {
        &self.store
    }

    pub fn binder(&self) -> &PresenceBinder {
        &self.binder
    }

    pub fn sessions(&self) -> &PeerSessionManager {
        &self.sessions
    }

    pub fn pending_requests(&self) -> impl Iterator<Item = &PeerId> {
        self.requests.keys()
    }

    /// Run until shutdown or until the relay closes
    pub async fn run(mut self, mut relay_events: mpsc::Receiver<RelayEvent>) {
        tracing::info!("Studio {} running", self.id);
        self.publish_status();

        loop {
            tokio::select! {
                event = relay_events.recv() => {
                    let Some(event) = event else { break };
                    if !self.handle_relay_event(event).await {
                        break;
                    }
                }

                Some(event) = self.peer_events.recv() => {
                    self.handle_peer_event(event);
                }

                request = self.commands.recv() => {
                    let Some((command, reply)) = request else { break };
                    if matches!(command, StudioCommand::Shutdown) {
                        let _ = reply.send(Ok(()));
                        break;
                    }
                    let result = self.handle_command(command).await;
                    if let Err(e) = &result {
                        tracing::warn!("Studio command failed: {}", e);
                    }
                    let _ = reply.send(result);
                }
            }
        }

        self.shutdown().await;
    }

    /// Apply one relay event. Returns false once the relay is gone.
    pub async fn handle_relay_event(&mut self, event: RelayEvent) -> bool {
        match event {
            RelayEvent::Roster(presenters) => {
                let diff = self.binder.apply_roster(presenters);
                for peer in &diff.left {
                    self.requests.remove(peer);
                    self.sessions.close_session(peer).await;
                }
            }
            RelayEvent::Received { sender, message } => match message {
                RelayMessage::Signal { payload } => {
                    if let Err(e) = self.sessions.handle_signal(&sender, &payload).await {
                        tracing::warn!("Signal from {} left the session stalled: {}", sender, e);
                    }
                    self.pump_peer_events();
                }
                RelayMessage::RequestOnAir { on_air } => self.handle_on_air_request(sender, on_air).await,
                RelayMessage::OnAirStatus { .. } => {
                    tracing::debug!("Ignoring on-air status from {}", sender);
                }
            },
            RelayEvent::Closed => {
                tracing::error!("Signaling relay connection lost");
                return false;
            }
        }
        self.publish_status();
        true
    }

    async fn handle_on_air_request(&mut self, sender: PeerId, on_air: bool) {
        if !on_air {
            // Off-air is honored without operator involvement
            self.requests.remove(&sender);
            self.put_on_air(&sender, false);
            self.sessions.close_session(&sender).await;
            return;
        }

        if self.auto_admit {
            tracing::info!("Admitting {} automatically", sender);
            self.put_on_air(&sender, true);
        } else if self.binder.is_admitted(&sender) {
            self.notify_on_air(&sender, true);
        } else {
            tracing::info!("{} requests to go on air", sender);
            self.requests.entry(sender).or_insert_with(Utc::now);
        }
    }

    /// Apply one operator command
    pub async fn handle_command(&mut self, command: StudioCommand) -> Result<()> {
        let result = match command {
            StudioCommand::SetPresenterOnAir { peer, on_air } => {
                self.put_on_air(&peer, on_air);
                Ok(())
            }
            StudioCommand::SetChannelGain { target, gain } => {
                self.store.set_channel_gain(&target, gain).map_err(Error::from)
            }
            StudioCommand::ToggleMute { target } => self.store.toggle_mute(&target).map_err(Error::from),
            StudioCommand::TogglePfl { target } => self.store.toggle_pfl(&target).map_err(Error::from),
            StudioCommand::SetSend { target, bus, update } => self.set_send(target, bus, update),
            StudioCommand::RemoveSource { peer } => {
                if self.binder.remove_source(&peer) {
                    Ok(())
                } else {
                    Err(MixerError::UnknownSource(AudioSourceId::Remote(peer)).into())
                }
            }
            StudioCommand::CloseSession { peer } => {
                self.requests.remove(&peer);
                self.put_on_air(&peer, false);
                if !self.sessions.close_session(&peer).await {
                    tracing::debug!("No session with {} to close", peer);
                }
                Ok(())
            }
            StudioCommand::Shutdown => Ok(()),
        };
        self.publish_status();
        result
    }

    fn set_send(&mut self, target: SourceTarget, bus: BusName, update: SendUpdate) -> Result<()> {
        let remote_target = match &target {
            SourceTarget::Remotes => true,
            SourceTarget::Source(source) => source.is_remote(),
        };
        if bus == BusName::Main && remote_target && update.enabled.is_some() {
            return Err(MixerError::AdmissionControlled(target).into());
        }
        self.store.set_send(&target, bus, update)?;
        Ok(())
    }

    /// Record the on-air decision for `peer` and tell them about it
    fn put_on_air(&mut self, peer: &PeerId, on_air: bool) {
        self.requests.remove(peer);
        self.binder.set_presenter_on_air(peer, on_air);
        tracing::info!("{} is {}", peer, if on_air { "on air" } else { "off air" });
        self.notify_on_air(peer, on_air);
    }

    fn notify_on_air(&self, peer: &PeerId, on_air: bool) {
        if let Err(e) = self.relay.send(peer, RelayMessage::OnAirStatus { on_air }) {
            tracing::warn!("On-air status for {} not sent: {}", peer, e);
        }
    }

    /// Apply one event from the media engine
    pub fn handle_peer_event(&mut self, event: PeerEvent) {
        match self.sessions.handle_event(event) {
            Some(SessionUpdate::SourceAttached { source, created }) => {
                if created {
                    tracing::info!("New channel strip for {}", source);
                }
                self.binder.on_source_attached(&source);
                self.publish_status();
            }
            Some(SessionUpdate::StateChanged { .. }) => self.publish_status(),
            None => {}
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

    /// Close every session. Channel strips stay.
    pub async fn shutdown(&mut self) {
        self.sessions.close_all().await;
        self.publish_status();
        tracing::info!("Studio {} stopped", self.id);
    }

    fn pending_list(&self) -> Vec<PendingRequest> {
        let mut pending: Vec<PendingRequest> = self
            .requests
            .iter()
            .map(|(peer, at)| PendingRequest {
                peer_id: peer.clone(),
                requested_at: *at,
            })
            .collect();
        pending.sort_by_key(|request| request.requested_at);
        pending
    }

    fn publish_status(&self) {
        let status = StudioStatus {
            peer_id: self.id.clone(),
            roster: self.binder.roster().cloned().collect(),
            requests: self.pending_list(),
            admitted: self.binder.admitted().cloned().collect(),
            sessions: self.sessions.sessions(),
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
