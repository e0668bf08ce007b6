//! Signaling relay seam

use crate::error::SignalingError;
use crate::protocol::{PeerId, RelayMessage};

/// Outbound half of a relay connection
///
/// Sending only queues the message; delivery is ordered per sender but
/// otherwise best effort.
pub trait SignalingRelay: Send + Sync {
    fn send(&self, to: &PeerId, message: RelayMessage) -> Result<(), SignalingError>;
}

/// Inbound relay traffic
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Message forwarded from another party
    Received { sender: PeerId, message: RelayMessage },
    /// Presenters currently connected to the relay
    Roster(Vec<PeerId>),
    /// The relay connection ended
    Closed,
}
