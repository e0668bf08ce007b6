//! Signaling Relay
//!
//! Forwards negotiation and on-air messages between presenters and the studio.

use anyhow::Result;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use remote_studio::{config::AppConfig, signaling::RelayServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => AppConfig::load(&path)?,
        None => AppConfig::load_or_default(),
    };

    let addr: SocketAddr = format!("{}:{}", config.signaling.bind_address, config.signaling.port).parse()?;
    tracing::info!("Starting signaling relay");

    tokio::select! {
        result = RelayServer::new(addr).run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down relay"),
    }
    Ok(())
}
