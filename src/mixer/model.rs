//! Immutable mixer configuration
//!
//! Every operation returns a new [`MixerConfig`]; nothing here mutates in
//! place. Group writes through [`SourceTarget::Remotes`] go through
//! [`MixerConfig::apply_to_group`], which builds the whole next value before
//! it is published, so readers see every member change together.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::MixerError;
use crate::mixer::gain::GainRange;
use crate::mixer::source::{AudioSourceId, BusName, SendUpdate, SourceConfig};

/// What a mixer operation addresses
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceTarget {
    /// One stored source
    Source(AudioSourceId),
    /// Every remote source currently in the config
    Remotes,
}

impl SourceTarget {
    pub const REMOTES: &'static str = "remotes";
}

impl From<AudioSourceId> for SourceTarget {
    fn from(id: AudioSourceId) -> Self {
        SourceTarget::Source(id)
    }
}

impl fmt::Display for SourceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceTarget::Source(id) => id.fmt(f),
            SourceTarget::Remotes => f.write_str(Self::REMOTES),
        }
    }
}

impl FromStr for SourceTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == Self::REMOTES {
            Ok(SourceTarget::Remotes)
        } else {
            s.parse().map(SourceTarget::Source)
        }
    }
}

/// Mapping from source to channel strip
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MixerConfig {
    sources: BTreeMap<AudioSourceId, SourceConfig>,
}

impl MixerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Config holding only the local microphone strip
    pub fn with_mic() -> Self {
        let mut sources = BTreeMap::new();
        sources.insert(AudioSourceId::Mic, SourceConfig::local_default());
        Self { sources }
    }

    /// Every strip pulled into `range`
    pub fn clamped(&self, range: GainRange) -> MixerConfig {
        MixerConfig {
            sources: self
                .sources
                .iter()
                .map(|(id, strip)| (id.clone(), strip.clone().clamped(range)))
                .collect(),
        }
    }

    pub fn get(&self, id: &AudioSourceId) -> Option<&SourceConfig> {
        self.sources.get(id)
    }

    pub fn contains(&self, id: &AudioSourceId) -> bool {
        self.sources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AudioSourceId, &SourceConfig)> {
        self.sources.iter()
    }

    /// Remote sources in key order
    pub fn remote_sources(&self) -> Vec<(&AudioSourceId, &SourceConfig)> {
        self.sources.iter().filter(|(id, _)| id.is_remote()).collect()
    }

    /// Rewrite every source matching `predicate`
    pub fn apply_to_group<P, M>(&self, predicate: P, mutation: M) -> MixerConfig
    where
        P: Fn(&AudioSourceId) -> bool,
        M: Fn(&AudioSourceId, &SourceConfig) -> SourceConfig,
    {
        let sources = self
            .sources
            .iter()
            .map(|(id, config)| {
                let next = if predicate(id) {
                    mutation(id, config)
                } else {
                    config.clone()
                };
                (id.clone(), next)
            })
            .collect();
        MixerConfig { sources }
    }

    /// Apply `mutation` to whatever `target` addresses
    fn apply_to_target<M>(&self, target: &SourceTarget, mutation: M) -> Result<MixerConfig, MixerError>
    where
        M: Fn(&AudioSourceId, &SourceConfig) -> SourceConfig,
    {
        match target {
            SourceTarget::Remotes => Ok(self.apply_to_group(AudioSourceId::is_remote, mutation)),
            SourceTarget::Source(id) => {
                if !self.sources.contains_key(id) {
                    return Err(MixerError::UnknownSource(id.clone()));
                }
                Ok(self.apply_to_group(|candidate| candidate == id, mutation))
            }
        }
    }

    /// Set channel trim, clamped into `range`
    pub fn with_channel_gain(
        &self,
        target: &SourceTarget,
        gain: f32,
        range: GainRange,
    ) -> Result<MixerConfig, MixerError> {
        let gain = range.clamp(gain);
        self.apply_to_target(target, |_, config| SourceConfig {
            gain,
            ..config.clone()
        })
    }

    /// Flip mute
    ///
    /// For the remotes group this is a master toggle: if any member is
    /// unmuted all of them are muted, otherwise all are unmuted.
    pub fn with_mute_toggled(&self, target: &SourceTarget) -> Result<MixerConfig, MixerError> {
        match target {
            SourceTarget::Remotes => {
                let mute_all = self.remote_sources().iter().any(|(_, config)| !config.muted);
                Ok(self.apply_to_group(AudioSourceId::is_remote, |_, config| SourceConfig {
                    muted: mute_all,
                    ..config.clone()
                }))
            }
            SourceTarget::Source(_) => self.apply_to_target(target, |_, config| SourceConfig {
                muted: !config.muted,
                ..config.clone()
            }),
        }
    }

    /// Partial update of one bus send
    pub fn with_send(
        &self,
        target: &SourceTarget,
        bus: BusName,
        update: SendUpdate,
        range: GainRange,
    ) -> Result<MixerConfig, MixerError> {
        self.apply_to_target(target, |_, config| {
            let mut next = config.clone();
            let mut send = config.send(bus);
            if let Some(enabled) = update.enabled {
                send.enabled = enabled;
            }
            if let Some(gain) = update.gain {
                send.gain = range.clamp(gain);
            }
            next.sends.insert(bus, send);
            next
        })
    }

    /// Flip pre-fade listen (the monitor send)
    ///
    /// Same master semantics as mute for the remotes group: any member
    /// cued means un-cue all.
    pub fn with_pfl_toggled(&self, target: &SourceTarget) -> Result<MixerConfig, MixerError> {
        let enable = match target {
            SourceTarget::Remotes => !self
                .remote_sources()
                .iter()
                .any(|(_, config)| config.send(BusName::Monitor).enabled),
            SourceTarget::Source(id) => match self.sources.get(id) {
                Some(config) => !config.send(BusName::Monitor).enabled,
                None => return Err(MixerError::UnknownSource(id.clone())),
            },
        };
        self.apply_to_target(target, |_, config| {
            let mut next = config.clone();
            let mut send = config.send(BusName::Monitor);
            send.enabled = enable;
            next.sends.insert(BusName::Monitor, send);
            next
        })
    }

    /// Insert `default` for `id` unless it is already present
    pub fn with_source_ensured(&self, id: &AudioSourceId, default: SourceConfig) -> Option<MixerConfig> {
        if self.sources.contains_key(id) {
            return None;
        }
        let mut sources = self.sources.clone();
        sources.insert(id.clone(), default);
        Some(MixerConfig { sources })
    }

    /// Drop `id`, if present
    pub fn without_source(&self, id: &AudioSourceId) -> Option<MixerConfig> {
        if !self.sources.contains_key(id) {
            return None;
        }
        let mut sources = self.sources.clone();
        sources.remove(id);
        Some(MixerConfig { sources })
    }

    /// Audible gain of `source` on `bus`; unknown sources are silent
    pub fn effective_gain(&self, source: &AudioSourceId, bus: BusName) -> f32 {
        self.sources
            .get(source)
            .map(|config| config.effective_gain(bus))
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::source::BusSend;
    use proptest::prelude::*;

    fn studio_with(remotes: &[&str]) -> MixerConfig {
        let mut config = MixerConfig::with_mic();
        for peer in remotes {
            config = config
                .with_source_ensured(&AudioSourceId::remote(*peer), SourceConfig::remote_default())
                .unwrap();
        }
        config
    }

    fn remote(peer: &str) -> SourceTarget {
        SourceTarget::Source(AudioSourceId::remote(peer))
    }

    #[test]
    fn gain_is_clamped_not_rejected() {
        let config = studio_with(&[]);
        let mic = SourceTarget::Source(AudioSourceId::Mic);
        let loud = config.with_channel_gain(&mic, 4.0, GainRange::default()).unwrap();
        assert_eq!(loud.get(&AudioSourceId::Mic).unwrap().gain, 1.5);
        let quiet = config.with_channel_gain(&mic, -1.0, GainRange::default()).unwrap();
        assert_eq!(quiet.get(&AudioSourceId::Mic).unwrap().gain, 0.0);
    }

    #[test]
    fn previous_value_is_untouched() {
        let config = studio_with(&["a"]);
        let next = config.with_mute_toggled(&remote("a")).unwrap();
        assert!(!config.get(&AudioSourceId::remote("a")).unwrap().muted);
        assert!(next.get(&AudioSourceId::remote("a")).unwrap().muted);
    }

    #[test]
    fn unknown_source_is_an_error() {
        let config = studio_with(&[]);
        assert_eq!(
            config.with_mute_toggled(&remote("ghost")),
            Err(MixerError::UnknownSource(AudioSourceId::remote("ghost")))
        );
    }

    #[test]
    fn group_gain_fans_out_to_remotes_only() {
        let config = studio_with(&["a", "b"]);
        let next = config
            .with_channel_gain(&SourceTarget::Remotes, 0.25, GainRange::default())
            .unwrap();
        assert_eq!(next.get(&AudioSourceId::remote("a")).unwrap().gain, 0.25);
        assert_eq!(next.get(&AudioSourceId::remote("b")).unwrap().gain, 0.25);
        assert_eq!(next.get(&AudioSourceId::Mic).unwrap().gain, 1.0);
    }

    #[test]
    fn group_mute_is_master_toggle() {
        let config = studio_with(&["a", "b"]);
        // mixed: a muted, b not
        let mixed = config.with_mute_toggled(&remote("a")).unwrap();

        let once = mixed.with_mute_toggled(&SourceTarget::Remotes).unwrap();
        assert!(once.remote_sources().iter().all(|(_, c)| c.muted));

        let twice = once.with_mute_toggled(&SourceTarget::Remotes).unwrap();
        assert!(twice.remote_sources().iter().all(|(_, c)| !c.muted));
        assert!(!twice.get(&AudioSourceId::Mic).unwrap().muted);
    }

    #[test]
    fn group_ops_on_empty_group_are_noops() {
        let config = studio_with(&[]);
        assert_eq!(config.with_mute_toggled(&SourceTarget::Remotes).unwrap(), config);
        assert_eq!(config.with_pfl_toggled(&SourceTarget::Remotes).unwrap(), config);
    }

    #[test]
    fn send_update_is_partial() {
        let config = studio_with(&["a"]);
        let target = remote("a");
        let faded = config
            .with_send(&target, BusName::Monitor, SendUpdate::gain(0.4), GainRange::default())
            .unwrap();
        assert_eq!(
            faded.get(&AudioSourceId::remote("a")).unwrap().send(BusName::Monitor),
            BusSend::enabled(0.4)
        );
        let off = faded
            .with_send(&target, BusName::Monitor, SendUpdate::enable(false), GainRange::default())
            .unwrap();
        assert_eq!(
            off.get(&AudioSourceId::remote("a")).unwrap().send(BusName::Monitor),
            BusSend::disabled(0.4)
        );
    }

    #[test]
    fn pfl_toggles_monitor_send() {
        let config = studio_with(&[]);
        let mic = SourceTarget::Source(AudioSourceId::Mic);
        let cued = config.with_pfl_toggled(&mic).unwrap();
        assert!(cued.get(&AudioSourceId::Mic).unwrap().send(BusName::Monitor).enabled);
        let uncued = cued.with_pfl_toggled(&mic).unwrap();
        assert_eq!(uncued, config);
    }

    #[test]
    fn ensure_is_idempotent_and_remove_is_explicit() {
        let config = studio_with(&["a"]);
        assert!(config
            .with_source_ensured(&AudioSourceId::remote("a"), SourceConfig::local_default())
            .is_none());
        let removed = config.without_source(&AudioSourceId::remote("a")).unwrap();
        assert!(!removed.contains(&AudioSourceId::remote("a")));
        assert!(removed.without_source(&AudioSourceId::remote("a")).is_none());
    }

    #[test]
    fn target_parsing() {
        assert_eq!("remotes".parse::<SourceTarget>().unwrap(), SourceTarget::Remotes);
        assert_eq!("remote_x".parse::<SourceTarget>().unwrap(), remote("x"));
        assert!("".parse::<SourceTarget>().is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Gain(usize, f32),
        Mute(usize),
        Pfl(usize),
        Send(usize, bool, Option<bool>, Option<f32>),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..4usize, -1.0f32..3.0).prop_map(|(t, g)| Op::Gain(t, g)),
            (0..4usize).prop_map(Op::Mute),
            (0..4usize).prop_map(Op::Pfl),
            (0..4usize, any::<bool>(), any::<Option<bool>>(), proptest::option::of(-1.0f32..3.0))
                .prop_map(|(t, main, e, g)| Op::Send(t, main, e, g)),
        ]
    }

    fn target(index: usize) -> SourceTarget {
        match index {
            0 => SourceTarget::Source(AudioSourceId::Mic),
            1 => remote("a"),
            2 => remote("b"),
            _ => SourceTarget::Remotes,
        }
    }

    proptest! {
        #[test]
        fn effective_gain_formula_holds(ops in proptest::collection::vec(op(), 0..40)) {
            let range = GainRange::default();
            let mut config = studio_with(&["a", "b"]);
            for op in ops {
                config = match op {
                    Op::Gain(t, g) => config.with_channel_gain(&target(t), g, range),
                    Op::Mute(t) => config.with_mute_toggled(&target(t)),
                    Op::Pfl(t) => config.with_pfl_toggled(&target(t)),
                    Op::Send(t, main, enabled, gain) => {
                        let bus = if main { BusName::Main } else { BusName::Monitor };
                        config.with_send(&target(t), bus, SendUpdate { enabled, gain }, range)
                    }
                }
                .unwrap();
            }
            for (id, source) in config.iter() {
                prop_assert!(range.contains(source.gain));
                for bus in BusName::ALL {
                    let send = source.send(bus);
                    prop_assert!(range.contains(send.gain));
                    let expected = if source.muted {
                        0.0
                    } else {
                        source.gain * if send.enabled { send.gain } else { 0.0 }
                    };
                    prop_assert_eq!(config.effective_gain(id, bus), expected);
                }
            }
        }

        #[test]
        fn set_then_read_returns_clamped(gain in proptest::num::f32::ANY) {
            let range = GainRange::default();
            let config = studio_with(&[]);
            let next = config
                .with_channel_gain(&SourceTarget::Source(AudioSourceId::Mic), gain, range)
                .unwrap();
            prop_assert_eq!(next.get(&AudioSourceId::Mic).unwrap().gain, range.clamp(gain));
        }

        #[test]
        fn single_mute_toggle_is_involutive(index in 0..3usize) {
            let config = studio_with(&["a", "b"]);
            let twice = config
                .with_mute_toggled(&target(index))
                .and_then(|c| c.with_mute_toggled(&target(index)))
                .unwrap();
            prop_assert_eq!(twice, config);
        }
    }
}
