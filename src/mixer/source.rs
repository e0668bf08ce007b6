//! Mixable sources, buses and channel strips

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::constants::{REMOTE_SOURCE_PREFIX, UNITY_GAIN};
use crate::mixer::gain::GainRange;
use crate::protocol::PeerId;

/// A mixable input
///
/// `Mic` is fixed and known at startup; remote sources come and go with
/// presenters and are keyed by the presenter's relay identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AudioSourceId {
    Mic,
    Remote(PeerId),
}

impl AudioSourceId {
    pub fn remote(peer: impl Into<PeerId>) -> Self {
        AudioSourceId::Remote(peer.into())
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, AudioSourceId::Remote(_))
    }

    pub fn peer_id(&self) -> Option<&PeerId> {
        match self {
            AudioSourceId::Remote(peer) => Some(peer),
            AudioSourceId::Mic => None,
        }
    }
}

impl fmt::Display for AudioSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSourceId::Mic => f.write_str("mic"),
            AudioSourceId::Remote(peer) => write!(f, "{}{}", REMOTE_SOURCE_PREFIX, peer),
        }
    }
}

impl FromStr for AudioSourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "mic" {
            return Ok(AudioSourceId::Mic);
        }
        match s.strip_prefix(REMOTE_SOURCE_PREFIX) {
            Some(peer) if !peer.is_empty() => Ok(AudioSourceId::Remote(PeerId::new(peer))),
            _ => Err(format!("unknown source: {}", s)),
        }
    }
}

impl Serialize for AudioSourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for AudioSourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Downstream mix destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusName {
    /// Broadcast output
    Main,
    /// Local cue / headphone mix
    Monitor,
}

impl BusName {
    pub const ALL: [BusName; 2] = [BusName::Main, BusName::Monitor];
}

impl fmt::Display for BusName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusName::Main => f.write_str("main"),
            BusName::Monitor => f.write_str("monitor"),
        }
    }
}

impl FromStr for BusName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(BusName::Main),
            "monitor" => Ok(BusName::Monitor),
            other => Err(format!("unknown bus: {}", other)),
        }
    }
}

/// A source's contribution to one bus
///
/// `enabled = false` silences the send without touching `gain`, so the
/// fader position survives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusSend {
    pub enabled: bool,
    pub gain: f32,
}

impl BusSend {
    pub fn enabled(gain: f32) -> Self {
        Self { enabled: true, gain }
    }

    pub fn disabled(gain: f32) -> Self {
        Self {
            enabled: false,
            gain,
        }
    }

    /// Gain this send contributes
    pub fn effective(&self) -> f32 {
        if self.enabled {
            self.gain
        } else {
            0.0
        }
    }
}

impl Default for BusSend {
    fn default() -> Self {
        Self::disabled(UNITY_GAIN)
    }
}

/// Partial update of a send; `None` fields are left as they are
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendUpdate {
    pub enabled: Option<bool>,
    pub gain: Option<f32>,
}

impl SendUpdate {
    pub fn enable(enabled: bool) -> Self {
        Self {
            enabled: Some(enabled),
            gain: None,
        }
    }

    pub fn gain(gain: f32) -> Self {
        Self {
            enabled: None,
            gain: Some(gain),
        }
    }
}

/// Channel strip: trim and mute above the per-bus sends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub gain: f32,
    pub muted: bool,
    pub sends: BTreeMap<BusName, BusSend>,
}

impl SourceConfig {
    /// Strip with both sends off
    pub fn local_default() -> Self {
        Self {
            gain: UNITY_GAIN,
            muted: false,
            sends: BusName::ALL.iter().map(|bus| (*bus, BusSend::default())).collect(),
        }
    }

    /// Freshly arrived presenter: audible on the cue mix, not on air
    pub fn remote_default() -> Self {
        let mut config = Self::local_default();
        config
            .sends
            .insert(BusName::Monitor, BusSend::enabled(UNITY_GAIN));
        config
    }

    /// Same strip with channel trim `gain`
    pub fn with_gain(mut self, gain: f32) -> Self {
        self.gain = gain;
        self
    }

    /// Pull the trim and every send level into `range`
    pub fn clamped(mut self, range: GainRange) -> Self {
        self.gain = range.clamp(self.gain);
        for send in self.sends.values_mut() {
            send.gain = range.clamp(send.gain);
        }
        self
    }

    pub fn send(&self, bus: BusName) -> BusSend {
        self.sends.get(&bus).copied().unwrap_or_default()
    }

    /// `muted ? 0 : gain × (send enabled ? send gain : 0)`
    pub fn effective_gain(&self, bus: BusName) -> f32 {
        if self.muted {
            0.0
        } else {
            self.gain * self.send(bus).effective()
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::local_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_id_naming() {
        assert_eq!(AudioSourceId::Mic.to_string(), "mic");
        assert_eq!(AudioSourceId::remote("p-17").to_string(), "remote_p-17");
        assert_eq!("remote_p-17".parse::<AudioSourceId>().unwrap(), AudioSourceId::remote("p-17"));
        assert_eq!("mic".parse::<AudioSourceId>().unwrap(), AudioSourceId::Mic);
        assert!("remote_".parse::<AudioSourceId>().is_err());
        assert!("deck_a".parse::<AudioSourceId>().is_err());
    }

    #[test]
    fn source_id_serializes_as_string() {
        let json = serde_json::to_string(&AudioSourceId::remote("bob")).unwrap();
        assert_eq!(json, "\"remote_bob\"");
        let back: AudioSourceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, AudioSourceId::remote("bob"));
    }

    #[test]
    fn disabled_send_keeps_fader() {
        let send = BusSend::disabled(0.8);
        assert_eq!(send.effective(), 0.0);
        assert_eq!(send.gain, 0.8);
    }

    #[test]
    fn clamped_strip_fits_a_narrow_range() {
        let strip = SourceConfig::remote_default()
            .with_gain(1.2)
            .clamped(GainRange::new(0.0, 0.8));
        assert_eq!(strip.gain, 0.8);
        assert_eq!(strip.send(BusName::Monitor).gain, 0.8);
        assert!(strip.send(BusName::Monitor).enabled);
        assert!(!strip.send(BusName::Main).enabled);
    }

    #[test]
    fn remote_default_routing() {
        let config = SourceConfig::remote_default();
        assert!(!config.send(BusName::Main).enabled);
        assert!(config.send(BusName::Monitor).enabled);
        assert_eq!(config.effective_gain(BusName::Monitor), 1.0);
        assert_eq!(config.effective_gain(BusName::Main), 0.0);
    }

    #[test]
    fn mute_beats_sends() {
        let mut config = SourceConfig::remote_default();
        config.muted = true;
        assert_eq!(config.effective_gain(BusName::Monitor), 0.0);
    }
}
