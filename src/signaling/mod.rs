//! Signaling relay: client, server and the seam between them

pub mod client;
pub mod relay;
pub mod server;

pub use client::WsRelayClient;
pub use relay::{RelayEvent, SignalingRelay};
pub use server::{RelayServer, RelayState};
