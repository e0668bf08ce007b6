//! Wire protocol shared by the relay, the presenter and the studio
//!
//! Signaling payloads stay opaque JSON on the wire (`{sdp}` or `{candidate}`)
//! and are only parsed by the peer session manager, so a malformed payload
//! never prevents the surrounding relay frame from being delivered.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stable identity of a party on the signaling relay
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh random identity
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Which side of the contribution link this process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Remote presenter sending a microphone to the studio
    Presenter,
    /// Aggregation endpoint receiving presenters
    Studio,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Presenter => f.write_str("presenter"),
            Role::Studio => f.write_str("studio"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "presenter" => Ok(Role::Presenter),
            "studio" => Ok(Role::Studio),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// Session description type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
    Pranswer,
    Rollback,
}

/// Session description as exchanged by browsers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Network candidate, browser field names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex", skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

/// Parsed signaling payload
#[derive(Debug, Clone, PartialEq)]
pub enum SignalPayload {
    Sdp(SessionDescription),
    Candidate(IceCandidate),
}

impl SignalPayload {
    /// Parse an opaque payload. Unknown or malformed shapes yield `None`.
    pub fn parse(value: &serde_json::Value) -> Option<Self> {
        if let Some(sdp) = value.get("sdp") {
            return serde_json::from_value(sdp.clone()).ok().map(SignalPayload::Sdp);
        }
        if let Some(candidate) = value.get("candidate") {
            return serde_json::from_value(candidate.clone())
                .ok()
                .map(SignalPayload::Candidate);
        }
        None
    }

    /// Render back into the opaque wire shape
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            SignalPayload::Sdp(desc) => serde_json::json!({ "sdp": desc }),
            SignalPayload::Candidate(candidate) => serde_json::json!({ "candidate": candidate }),
        }
    }
}

/// Messages carried between two named parties over the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayMessage {
    /// Peer negotiation payload (`{sdp}` or `{candidate}`)
    Signal { payload: serde_json::Value },
    /// Presenter asks the studio to put it on (or take it off) air
    RequestOnAir { on_air: bool },
    /// Studio-confirmed on-air state of the receiving presenter
    OnAirStatus { on_air: bool },
}

impl RelayMessage {
    pub fn signal(payload: &SignalPayload) -> Self {
        RelayMessage::Signal {
            payload: payload.to_value(),
        }
    }
}

/// Client → relay frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outbound {
    pub to: PeerId,
    pub message: RelayMessage,
}

/// Relay → client frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Inbound {
    /// A message forwarded from another party
    Message { from: PeerId, message: RelayMessage },
    /// Snapshot of currently connected presenters
    Roster { presenters: Vec<PeerId> },
}

/// Audio input device descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
    pub sample_rates: Vec<u32>,
    pub channels: Vec<u16>,
}
