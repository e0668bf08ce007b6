//! Presenter Client
//!
//! Contributes the local microphone to the studio. Commands are read from
//! stdin: `on`, `off`, `mute`, `pfl`, `gain <x>`, `device <id>|default`,
//! `status`, `quit`.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use remote_studio::{
    audio::{CpalMediaProvider, DeviceWatcher, MediaProvider},
    config::AppConfig,
    mixer::{format_db, AudioSourceId, MixerStore},
    peer::WebRtcTransport,
    presenter::{Presenter, PresenterCommand},
    protocol::{PeerId, Role},
    routing::StreamRegistry,
    signaling::WsRelayClient,
};

fn parse_command(line: &str) -> Option<PresenterCommand> {
    let mut words = line.split_whitespace();
    let command = match words.next()? {
        "on" => PresenterCommand::GoOnAir,
        "off" => PresenterCommand::GoOffAir,
        "toggle" => PresenterCommand::ToggleOnAir,
        "mute" => PresenterCommand::ToggleMute,
        "pfl" => PresenterCommand::TogglePfl,
        "connect" => PresenterCommand::Connect,
        "gain" => PresenterCommand::SetChannelGain(words.next()?.parse().ok()?),
        "device" => match words.next()? {
            "default" => PresenterCommand::SelectDevice(None),
            id => PresenterCommand::SelectDevice(Some(id.to_string())),
        },
        "quit" | "exit" => PresenterCommand::Shutdown,
        _ => return None,
    };
    Some(command)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting presenter");

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => AppConfig::load(&path)?,
        None => AppConfig::load_or_default(),
    };

    let provider: Arc<dyn MediaProvider> = Arc::new(CpalMediaProvider::new(config.audio.clone()));

    println!("\n=== Available Input Devices ===");
    for device in provider.enumerate_inputs().await {
        let default_marker = if device.is_default { " [DEFAULT]" } else { "" };
        println!("  {}{}:", device.name, default_marker);
        println!("    ID: {}", device.id);
        println!("    Sample rates: {:?}", device.sample_rates);
        println!("    Channels: {:?}", device.channels);
    }
    println!();

    let store = MixerStore::from_settings(&config.mixer);
    let transport = Arc::new(WebRtcTransport::new(&config.ice, config.audio.clone())?);

    let id = PeerId::new(config.identity.peer_id.as_str());
    let (relay, relay_events) = WsRelayClient::connect(
        &config.signaling.relay_url,
        &id,
        Role::Presenter,
        &config.identity.display_name,
    )
    .await?;

    let presenter = Presenter::new(
        &config,
        provider.clone(),
        transport,
        Arc::new(relay),
        store.clone(),
        StreamRegistry::shared(),
    );
    let handle = presenter.handle();

    let (device_tx, device_rx) = mpsc::channel(8);
    let _watcher = DeviceWatcher::spawn(
        provider,
        Duration::from_millis(config.audio.device_poll_ms),
        device_tx,
    );

    let mut presenter_task = tokio::spawn(presenter.run(relay_events, device_rx));
    handle.send(PresenterCommand::Connect).await?;

    println!("Commands: on, off, mute, pfl, gain <x>, device <id>|default, status, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "status" {
                    let status = handle.status();
                    let strip = store.snapshot();
                    println!(
                        "mic {} | on air requested={} confirmed={} | peak {:.1} dBFS | session {:?}",
                        status.mic_state,
                        status.requested_on_air,
                        status.confirmed_on_air,
                        status.peak_db,
                        status.session,
                    );
                    if let Some(mic) = strip.get(&AudioSourceId::Mic) {
                        println!("gain {} | muted {}", format_db(mic.gain), mic.muted);
                    }
                    if let Some(error) = status.error {
                        println!("error: {}", error);
                    }
                    continue;
                }
                let Some(command) = parse_command(line) else {
                    println!("Unknown command: {}", line);
                    continue;
                };
                let quit = matches!(command, PresenterCommand::Shutdown);
                if let Err(e) = handle.send(command).await {
                    println!("{}", e);
                }
                if quit {
                    break;
                }
            }
            _ = &mut presenter_task => {
                tracing::warn!("Presenter stopped");
                return Ok(());
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = handle.send(PresenterCommand::Shutdown).await;
                break;
            }
        }
    }

    let _ = presenter_task.await;
    Ok(())
}
