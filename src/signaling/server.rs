//! Signaling relay server
//!
//! Forwards opaque messages between named parties over WebSocket. The
//! sender of a forwarded message is always the identity the connection
//! joined with, never a field taken from the client's frame.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use crate::error::SignalingError;
use crate::protocol::{Inbound, Outbound, PeerId, Role};

struct Party {
    role: Role,
    connection: u64,
    tx: mpsc::UnboundedSender<Inbound>,
}

/// Shared relay state
#[derive(Clone, Default)]
pub struct RelayState {
    parties: Arc<DashMap<PeerId, Party>>,
    next_connection: Arc<AtomicU64>,
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connected presenters, sorted
    pub fn presenters(&self) -> Vec<PeerId> {
        let mut presenters: Vec<PeerId> = self
            .parties
            .iter()
            .filter(|entry| entry.value().role == Role::Presenter)
            .map(|entry| entry.key().clone())
            .collect();
        presenters.sort();
        presenters
    }

    pub fn party_count(&self) -> usize {
        self.parties.len()
    }

    fn join(&self, id: PeerId, role: Role, tx: mpsc::UnboundedSender<Inbound>) -> u64 {
        let connection = self.next_connection.fetch_add(1, Ordering::Relaxed) + 1;
        if self
            .parties
            .insert(id.clone(), Party { role, connection, tx })
            .is_some()
        {
            tracing::info!("{} reconnected, replacing previous connection", id);
        }
        connection
    }

    fn leave(&self, id: &PeerId, connection: u64) {
        self.parties
            .remove_if(id, |_, party| party.connection == connection);
    }

    /// Deliver `outbound` from `from` to its target
    fn forward(&self, from: &PeerId, outbound: Outbound) -> Result<(), SignalingError> {
        let party = self
            .parties
            .get(&outbound.to)
            .ok_or_else(|| SignalingError::SendFailed(outbound.to.clone()))?;
        party
            .tx
            .send(Inbound::Message {
                from: from.clone(),
                message: outbound.message,
            })
            .map_err(|_| SignalingError::SendFailed(outbound.to.clone()))
    }

    fn broadcast_roster(&self) {
        let roster = Inbound::Roster {
            presenters: self.presenters(),
        };
        for party in self.parties.iter() {
            let _ = party.tx.send(roster.clone());
        }
    }
}

#[derive(Debug, Deserialize)]
struct JoinParams {
    id: String,
    role: Role,
    #[serde(default)]
    name: Option<String>,
}

/// Relay HTTP routes
pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Signaling relay server
pub struct RelayServer {
    addr: SocketAddr,
    state: RelayState,
}

impl RelayServer {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            state: RelayState::new(),
        }
    }

    pub fn state(&self) -> &RelayState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        tracing::info!("Signaling relay listening on ws://{}/ws", listener.local_addr()?);
        serve(listener, self.state).await
    }
}

/// Serve the relay on an already bound listener
pub async fn serve(listener: TcpListener, state: RelayState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<JoinParams>,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    let id = PeerId::new(params.id);
    let role = params.role;
    let name = params.name.unwrap_or_else(|| id.to_string());
    ws.on_upgrade(move |socket| handle_socket(socket, id, role, name, state))
}

async fn handle_socket(socket: WebSocket, id: PeerId, role: Role, name: String, state: RelayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Inbound>();

    let connection = state.join(id.clone(), role, tx);
    tracing::info!("{} \"{}\" joined as {} ({} connected)", id, name, role, state.party_count());
    state.broadcast_roster();

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => match serde_json::from_str::<Outbound>(&text) {
                        Ok(outbound) => {
                            if let Err(e) = state.forward(&id, outbound) {
                                tracing::debug!("Dropping message from {}: {}", id, e);
                            }
                        }
                        Err(e) => tracing::warn!("Malformed frame from {}: {}", id, e),
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::warn!("WebSocket error from {}: {}", id, e);
                        break;
                    }
                    _ => {}
                }
            }

            inbound = rx.recv() => {
                // Sender dropped when a newer connection took over this id
                let Some(inbound) = inbound else { break };
                let json = match serde_json::to_string(&inbound) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!("Could not encode frame for {}: {}", id, e);
                        continue;
                    }
                };
                if ws_sender.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    }

    state.leave(&id, connection);
    tracing::info!("{} left ({} connected)", id, state.party_count());
    state.broadcast_roster();
}
