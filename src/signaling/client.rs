//! WebSocket relay client

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::error::SignalingError;
use crate::protocol::{Inbound, Outbound, PeerId, RelayMessage, Role};
use crate::signaling::relay::{RelayEvent, SignalingRelay};

/// Inbound events buffered before the owner falls behind
const EVENT_QUEUE: usize = 256;

/// Connection to the signaling relay
pub struct WsRelayClient {
    id: PeerId,
    outbound: mpsc::UnboundedSender<Outbound>,
    task: JoinHandle<()>,
}

impl WsRelayClient {
    /// Join the relay at `url` as `id`, announcing `display_name`. Inbound
    /// traffic arrives on the returned receiver, ending with
    /// [`RelayEvent::Closed`].
    pub async fn connect(
        url: &str,
        id: &PeerId,
        role: Role,
        display_name: &str,
    ) -> Result<(Self, mpsc::Receiver<RelayEvent>), SignalingError> {
        let endpoint = join_url(url, id, role, display_name)?;
        let (ws_stream, _) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| SignalingError::ConnectionFailed(e.to_string()))?;
        tracing::info!("Connected to relay at {} as {} ({}, {})", url, id, display_name, role);

        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Outbound>();
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => {
                                let event = match decode_frame(&text) {
                                    Ok(event) => event,
                                    Err(e) => {
                                        tracing::warn!("Skipping relay frame: {}", e);
                                        continue;
                                    }
                                };
                                if event_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Some(Ok(Message::Ping(data))) => {
                                let _ = write.send(Message::Pong(data)).await;
                            }
                            Some(Ok(Message::Close(_))) | None => break,
                            Some(Err(e)) => {
                                tracing::error!("Relay connection error: {}", e);
                                break;
                            }
                            _ => {}
                        }
                    }

                    frame = outbound_rx.recv() => {
                        let Some(frame) = frame else {
                            let _ = write.send(Message::Close(None)).await;
                            break;
                        };
                        let json = match encode_frame(&frame) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::warn!("Dropping frame for {}: {}", frame.to, e);
                                continue;
                            }
                        };
                        if let Err(e) = write.send(Message::Text(json)).await {
                            tracing::error!("Relay write failed: {}", e);
                            break;
                        }
                    }
                }
            }
            tracing::info!("Relay connection closed");
            let _ = event_tx.send(RelayEvent::Closed).await;
        });

        Ok((
            Self {
                id: id.clone(),
                outbound: outbound_tx,
                task,
            },
            event_rx,
        ))
    }

    pub fn id(&self) -> &PeerId {
        &self.id
    }

    pub fn is_connected(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn close(&self) {
        self.task.abort();
    }
}

impl SignalingRelay for WsRelayClient {
    fn send(&self, to: &PeerId, message: RelayMessage) -> Result<(), SignalingError> {
        self.outbound
            .send(Outbound {
                to: to.clone(),
                message,
            })
            .map_err(|_| SignalingError::RelayClosed)
    }
}

impl Drop for WsRelayClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Relay endpoint with the join parameters percent-encoded
fn join_url(base: &str, id: &PeerId, role: Role, display_name: &str) -> Result<Url, SignalingError> {
    let mut url = Url::parse(base).map_err(|e| SignalingError::ConnectionFailed(format!("{}: {}", base, e)))?;
    url.query_pairs_mut()
        .append_pair("id", id.as_str())
        .append_pair("role", &role.to_string())
        .append_pair("name", display_name);
    Ok(url)
}

fn encode_frame(frame: &Outbound) -> Result<String, SignalingError> {
    serde_json::to_string(frame).map_err(|e| SignalingError::Encode(e.to_string()))
}

fn decode_frame(text: &str) -> Result<RelayEvent, SignalingError> {
    match serde_json::from_str::<Inbound>(text) {
        Ok(Inbound::Message { from, message }) => Ok(RelayEvent::Received {
            sender: from,
            message,
        }),
        Ok(Inbound::Roster { presenters }) => Ok(RelayEvent::Roster(presenters)),
        Err(e) => Err(SignalingError::Decode(e.to_string())),
    }
}
