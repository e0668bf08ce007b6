//! Studio Console
//!
//! Receives remote presenters, keeps their channel strips and serves the
//! console API.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use remote_studio::{
    audio::CpalMediaProvider,
    config::AppConfig,
    mixer::MixerStore,
    peer::WebRtcTransport,
    protocol::{PeerId, Role},
    routing::StreamRegistry,
    signaling::WsRelayClient,
    studio::{Studio, StudioCommand},
    ui::WebServer,
};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting studio");

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => AppConfig::load(&path)?,
        None => AppConfig::load_or_default(),
    };

    let store = MixerStore::from_settings(&config.mixer);
    let registry = StreamRegistry::shared();
    let transport = Arc::new(WebRtcTransport::new(&config.ice, config.audio.clone())?);

    let studio_id = PeerId::new(config.signaling.studio_id.as_str());
    let (relay, relay_events) =
        WsRelayClient::connect(&config.signaling.relay_url, &studio_id, Role::Studio, "Studio").await?;

    let studio = Studio::new(&config, transport, Arc::new(relay), store.clone(), registry.clone());
    let handle = studio.handle();

    let provider = Arc::new(CpalMediaProvider::new(config.audio.clone()));
    let _web_handle = WebServer::new(config.studio.clone(), handle.clone(), provider).start_background();

    // Log strip changes as they are published
    let mut mixer_changes = store.subscribe();
    tokio::spawn(async move {
        while mixer_changes.changed().await.is_ok() {
            let snapshot = mixer_changes.borrow_and_update().clone();
            tracing::debug!("Mixer now has {} strips ({} live streams)", snapshot.len(), registry.len());
        }
    });

    let mut studio_task = tokio::spawn(studio.run(relay_events));

    tokio::select! {
        _ = &mut studio_task => tracing::warn!("Studio stopped"),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down studio");
            if let Err(e) = handle.send(StudioCommand::Shutdown).await {
                tracing::warn!("Studio did not acknowledge shutdown: {}", e);
            }
            let _ = studio_task.await;
        }
    }
    Ok(())
}
