//! Microphone and on-air state

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hardware acquisition status of the local microphone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MicState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    Error,
}

impl MicState {
    /// States from which a device switch re-runs acquisition right away
    pub fn reacquires_on_select(self) -> bool {
        matches!(self, MicState::Ready | MicState::Error)
    }
}

impl fmt::Display for MicState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MicState::Disconnected => "disconnected",
            MicState::Connecting => "connecting",
            MicState::Ready => "ready",
            MicState::Error => "error",
        };
        f.write_str(name)
    }
}

/// On-air intent and the studio's verdict, tracked separately
///
/// `requested` drives the local cue send; only `confirmed` may ever
/// enable the main send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OnAirState {
    pub requested_on_air: bool,
    pub confirmed_on_air: bool,
}

impl OnAirState {
    /// Main send state implied by the two facets
    pub fn main_enabled(&self) -> bool {
        self.requested_on_air && self.confirmed_on_air
    }
}

/// One outstanding device acquisition
///
/// The generation ties a completion back to the request that started it;
/// completions from superseded requests are discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquireRequest {
    pub generation: u64,
    pub device_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_settled_states_reacquire() {
        assert!(MicState::Ready.reacquires_on_select());
        assert!(MicState::Error.reacquires_on_select());
        assert!(!MicState::Connecting.reacquires_on_select());
        assert!(!MicState::Disconnected.reacquires_on_select());
    }

    #[test]
    fn main_needs_intent_and_confirmation() {
        let mut state = OnAirState::default();
        state.confirmed_on_air = true;
        assert!(!state.main_enabled());
        state.requested_on_air = true;
        assert!(state.main_enabled());
    }

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MicState::Ready).unwrap(), "\"ready\"");
    }
}
