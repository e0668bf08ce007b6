mod common;

use std::sync::Arc;

use common::{answer_value, input, FakeMediaProvider, FakeRelay, FakeTransport};
use remote_studio::audio::DeviceEvent;
use remote_studio::config::AppConfig;
use remote_studio::error::DeviceError;
use remote_studio::mic::MicState;
use remote_studio::mixer::{AudioSourceId, BusName, MixerStore, SendUpdate};
use remote_studio::presenter::{Presenter, PresenterCommand};
use remote_studio::protocol::{PeerId, RelayMessage, SdpType};
use remote_studio::routing::StreamRegistry;
use remote_studio::signaling::RelayEvent;

struct Harness {
    presenter: Presenter,
    provider: Arc<FakeMediaProvider>,
    transport: Arc<FakeTransport>,
    relay: Arc<FakeRelay>,
    store: MixerStore,
    registry: Arc<StreamRegistry>,
}

impl Harness {
    fn new(provider: Arc<FakeMediaProvider>) -> Self {
        let mut config = AppConfig::default();
        config.identity.peer_id = "p1".to_string();

        let transport = FakeTransport::shared();
        let relay = FakeRelay::shared();
        let store = MixerStore::default();
        let registry = StreamRegistry::shared();
        let presenter = Presenter::new(
            &config,
            provider.clone(),
            transport.clone(),
            relay.clone(),
            store.clone(),
            registry.clone(),
        );
        Self {
            presenter,
            provider,
            transport,
            relay,
            store,
            registry,
        }
    }

    async fn command(&mut self, command: PresenterCommand) {
        self.presenter.handle_command(command).await.unwrap();
    }

    async fn from_studio(&mut self, message: RelayMessage) {
        let event = RelayEvent::Received {
            sender: PeerId::new("studio"),
            message,
        };
        assert!(self.presenter.handle_relay_event(event).await);
    }

    async fn ready_mic(&mut self) {
        self.command(PresenterCommand::Connect).await;
        assert!(self.presenter.next_acquisition().await);
        assert_eq!(self.presenter.mic().state(), MicState::Ready);
    }

    fn main(&self) -> bool {
        self.store.send_enabled(&AudioSourceId::Mic, BusName::Main)
    }

    fn monitor(&self) -> bool {
        self.store.send_enabled(&AudioSourceId::Mic, BusName::Monitor)
    }
}

#[tokio::test]
async fn on_air_round_trip() {
    let mut h = Harness::new(FakeMediaProvider::new());

    h.command(PresenterCommand::SelectDevice(None)).await;
    h.ready_mic().await;
    assert!(h.registry.has_stream(&AudioSourceId::Mic));
    assert!(!h.main());

    h.command(PresenterCommand::GoOnAir).await;
    assert!(h.monitor());
    assert!(!h.main());
    assert_eq!(h.relay.on_air_requests_to("studio"), vec![true]);
    let offer = h.relay.last_sdp_to("studio").unwrap();
    assert_eq!(offer.sdp_type, SdpType::Offer);
    let conn = h.transport.latest("studio").unwrap();
    assert_eq!(conn.tracks().len(), 1);

    h.from_studio(RelayMessage::Signal { payload: answer_value("a1") }).await;
    assert!(conn.remote_description().is_some());

    h.from_studio(RelayMessage::OnAirStatus { on_air: true }).await;
    assert!(h.main());
    assert!(h.presenter.handle().status().confirmed_on_air);

    h.command(PresenterCommand::GoOffAir).await;
    assert!(conn.is_closed());
    assert!(!h.presenter.sessions().has_session(&PeerId::new("studio")));
    assert!(!h.monitor());
    assert_eq!(h.relay.on_air_requests_to("studio"), vec![true, false]);

    h.from_studio(RelayMessage::OnAirStatus { on_air: false }).await;
    assert!(!h.main());
}

#[tokio::test]
async fn going_on_air_acquires_first_then_offers() {
    let mut h = Harness::new(FakeMediaProvider::new());

    h.command(PresenterCommand::GoOnAir).await;
    assert_eq!(h.presenter.mic().state(), MicState::Connecting);
    assert!(h.monitor());
    assert_eq!(h.transport.created(), 0);

    assert!(h.presenter.next_acquisition().await);
    assert_eq!(h.presenter.mic().state(), MicState::Ready);
    assert_eq!(h.transport.created(), 1);
    assert!(h.relay.last_sdp_to("studio").is_some());
}

#[tokio::test]
async fn repeated_requests_never_enable_main() {
    let mut h = Harness::new(FakeMediaProvider::new());
    h.ready_mic().await;

    for _ in 0..3 {
        h.command(PresenterCommand::GoOnAir).await;
        assert!(!h.main());
    }
    h.command(PresenterCommand::ToggleOnAir).await;
    h.command(PresenterCommand::ToggleOnAir).await;
    assert!(!h.main());

    // Only one connection toward the studio
    assert_eq!(h.transport.connections().iter().filter(|c| !c.is_closed()).count(), 1);

    let err = h
        .presenter
        .handle_command(PresenterCommand::SetSend {
            bus: BusName::Main,
            update: SendUpdate::enable(true),
        })
        .await;
    assert!(err.is_err());
    assert!(!h.main());
}

#[tokio::test]
async fn confirmation_from_anyone_else_is_ignored() {
    let mut h = Harness::new(FakeMediaProvider::new());
    h.ready_mic().await;
    h.command(PresenterCommand::GoOnAir).await;

    let event = RelayEvent::Received {
        sender: PeerId::new("p2"),
        message: RelayMessage::OnAirStatus { on_air: true },
    };
    assert!(h.presenter.handle_relay_event(event).await);
    assert!(!h.main());
}

#[tokio::test]
async fn device_failure_forces_main_off() {
    let mut h = Harness::new(FakeMediaProvider::new());
    h.ready_mic().await;
    h.command(PresenterCommand::GoOnAir).await;
    h.from_studio(RelayMessage::OnAirStatus { on_air: true }).await;
    assert!(h.main());

    h.provider
        .script(Err(DeviceError::PermissionDenied("blocked by system policy".into())));
    h.command(PresenterCommand::SelectDevice(Some("input:USB Mic".into()))).await;
    assert!(h.transport.latest("studio").unwrap().is_closed());
    assert!(h.presenter.next_acquisition().await);

    assert_eq!(h.presenter.mic().state(), MicState::Error);
    assert!(!h.main());
    let status = h.presenter.handle().status();
    assert_eq!(status.mic_state, MicState::Error);
    assert!(status.error.unwrap().contains("denied"));

    // A late confirmation cannot light main without an audio path
    h.from_studio(RelayMessage::OnAirStatus { on_air: true }).await;
    assert!(!h.main());
}

#[tokio::test]
async fn off_air_before_acquisition_completes_sends_nothing() {
    let mut h = Harness::new(FakeMediaProvider::gated());

    h.command(PresenterCommand::GoOnAir).await;
    h.command(PresenterCommand::GoOffAir).await;
    assert!(!h.monitor());

    h.provider.release(1);
    assert!(h.presenter.next_acquisition().await);
    assert_eq!(h.presenter.mic().state(), MicState::Ready);
    assert_eq!(h.transport.created(), 0);
    assert!(!h.main());
}

#[tokio::test]
async fn reselecting_while_connecting_acquires_the_new_device() {
    let mut h = Harness::new(FakeMediaProvider::gated());

    h.command(PresenterCommand::Connect).await;
    h.command(PresenterCommand::SelectDevice(Some("input:USB Mic".into()))).await;
    h.provider.release(2);

    assert!(h.presenter.next_acquisition().await);
    assert_eq!(h.presenter.mic().state(), MicState::Connecting);
    assert!(h.presenter.next_acquisition().await);
    assert_eq!(h.presenter.mic().state(), MicState::Ready);

    assert_eq!(
        h.provider.requests(),
        vec![None, Some("input:USB Mic".to_string())]
    );
    let streams = h.provider.streams();
    assert!(!streams[0].is_live());
    assert!(streams[1].is_live());
}

#[tokio::test]
async fn shutdown_releases_everything() {
    let mut h = Harness::new(FakeMediaProvider::new());
    h.ready_mic().await;
    h.command(PresenterCommand::GoOnAir).await;

    h.presenter.shutdown().await;
    assert_eq!(h.presenter.mic().state(), MicState::Disconnected);
    assert!(!h.provider.streams()[0].is_live());
    assert!(h.transport.latest("studio").unwrap().is_closed());
    assert!(!h.registry.has_stream(&AudioSourceId::Mic));
    assert_eq!(h.relay.on_air_requests_to("studio"), vec![true, false]);

    // Already down
    h.presenter.shutdown().await;
    assert_eq!(h.relay.on_air_requests_to("studio"), vec![true, false]);
}

#[tokio::test]
async fn device_list_changes_are_tracked() {
    let mut h = Harness::new(FakeMediaProvider::new());
    h.presenter
        .handle_device_event(DeviceEvent::InputsChanged(vec![input("input:Headset", true)]));
    assert_eq!(h.presenter.devices().len(), 1);
    assert_eq!(h.presenter.handle().status().devices[0].name, "Headset");
}

#[tokio::test]
async fn channel_controls_apply_to_the_mic_strip() {
    let mut h = Harness::new(FakeMediaProvider::new());
    h.command(PresenterCommand::SetChannelGain(9.0)).await;
    h.command(PresenterCommand::ToggleMute).await;

    let snapshot = h.store.snapshot();
    let strip = snapshot.get(&AudioSourceId::Mic).unwrap();
    assert_eq!(strip.gain, h.store.range().max);
    assert!(strip.muted);
    assert_eq!(h.store.effective_gain(&AudioSourceId::Mic, BusName::Monitor), 0.0);
}
