//! Shared mixer state
//!
//! A `watch` channel of `Arc<MixerConfig>`. Each mutation reads the value
//! current at entry, builds the next one and swaps it in a single step, so
//! readers observe either the old or the fully-updated config.

use std::sync::Arc;
use tokio::sync::watch;

use crate::config::MixerSettings;
use crate::constants::UNITY_GAIN;
use crate::error::MixerError;
use crate::mixer::gain::GainRange;
use crate::mixer::model::{MixerConfig, SourceTarget};
use crate::mixer::source::{AudioSourceId, BusName, SendUpdate, SourceConfig};

/// Cloneable handle to the authoritative mixer state
#[derive(Clone)]
pub struct MixerStore {
    tx: Arc<watch::Sender<Arc<MixerConfig>>>,
    range: GainRange,
    default_gain: f32,
}

impl MixerStore {
    /// Store over `initial`, with every strip pulled into `range`
    pub fn new(initial: MixerConfig, range: GainRange) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial.clamped(range)));
        Self {
            tx: Arc::new(tx),
            range,
            default_gain: range.clamp(UNITY_GAIN),
        }
    }

    /// Empty store using the configured range and starting trim
    pub fn from_settings(settings: &MixerSettings) -> Self {
        Self::new(MixerConfig::new(), settings.gain_range()).with_default_gain(settings.default_gain)
    }

    /// Store seeded with the local microphone strip
    pub fn with_mic(range: GainRange) -> Self {
        Self::new(MixerConfig::with_mic(), range)
    }

    /// Trim given to strips created from now on, clamped into the range
    pub fn with_default_gain(mut self, gain: f32) -> Self {
        self.default_gain = self.range.clamp(gain);
        self
    }

    pub fn range(&self) -> GainRange {
        self.range
    }

    pub fn default_gain(&self) -> f32 {
        self.default_gain
    }

    /// New local strip at the starting trim
    pub fn local_strip(&self) -> SourceConfig {
        SourceConfig::local_default()
            .with_gain(self.default_gain)
            .clamped(self.range)
    }

    /// New presenter strip at the starting trim
    pub fn remote_strip(&self) -> SourceConfig {
        SourceConfig::remote_default()
            .with_gain(self.default_gain)
            .clamped(self.range)
    }

    /// Current config
    pub fn snapshot(&self) -> Arc<MixerConfig> {
        self.tx.borrow().clone()
    }

    /// Change feed for the render path and meters
    pub fn subscribe(&self) -> watch::Receiver<Arc<MixerConfig>> {
        self.tx.subscribe()
    }

    /// Compute the next config from the current one and publish it.
    ///
    /// `Ok(None)` from `f` means "nothing to change"; readers are not woken.
    /// Returns whether a new value was published.
    pub fn update<F>(&self, f: F) -> Result<bool, MixerError>
    where
        F: FnOnce(&MixerConfig) -> Result<Option<MixerConfig>, MixerError>,
    {
        let mut outcome = Ok(false);
        self.tx.send_if_modified(|current| match f(&**current) {
            Ok(Some(next)) => {
                *current = Arc::new(next);
                outcome = Ok(true);
                true
            }
            Ok(None) => false,
            Err(e) => {
                outcome = Err(e);
                false
            }
        });
        outcome
    }

    pub fn set_channel_gain(&self, target: &SourceTarget, gain: f32) -> Result<(), MixerError> {
        let range = self.range;
        self.update(|config| config.with_channel_gain(target, gain, range).map(Some))?;
        tracing::debug!("Channel gain of {} set to {:.3}", target, range.clamp(gain));
        Ok(())
    }

    pub fn toggle_mute(&self, target: &SourceTarget) -> Result<(), MixerError> {
        self.update(|config| config.with_mute_toggled(target).map(Some))?;
        tracing::debug!("Mute toggled on {}", target);
        Ok(())
    }

    pub fn toggle_pfl(&self, target: &SourceTarget) -> Result<(), MixerError> {
        self.update(|config| config.with_pfl_toggled(target).map(Some))?;
        tracing::debug!("PFL toggled on {}", target);
        Ok(())
    }

    pub fn set_send(
        &self,
        target: &SourceTarget,
        bus: BusName,
        update: SendUpdate,
    ) -> Result<(), MixerError> {
        let range = self.range;
        self.update(|config| config.with_send(target, bus, update, range).map(Some))?;
        tracing::debug!("Send {} → {} updated: {:?}", target, bus, update);
        Ok(())
    }

    /// Insert a strip for `id` unless one exists. Returns whether it was added.
    ///
    /// `default` is pulled into the store's range first.
    pub fn ensure_source(&self, id: &AudioSourceId, default: SourceConfig) -> bool {
        let default = default.clamped(self.range);
        let added = self
            .update(|config| Ok(config.with_source_ensured(id, default)))
            .unwrap_or(false);
        if added {
            tracing::info!("Added channel strip for {}", id);
        }
        added
    }

    /// Delete the strip for `id`. Returns whether it existed.
    pub fn remove_source(&self, id: &AudioSourceId) -> bool {
        let removed = self
            .update(|config| Ok(config.without_source(id)))
            .unwrap_or(false);
        if removed {
            tracing::info!("Removed channel strip for {}", id);
        }
        removed
    }

    pub fn effective_gain(&self, source: &AudioSourceId, bus: BusName) -> f32 {
        self.tx.borrow().effective_gain(source, bus)
    }

    pub fn send_enabled(&self, source: &AudioSourceId, bus: BusName) -> bool {
        self.tx
            .borrow()
            .get(source)
            .map(|config| config.send(bus).enabled)
            .unwrap_or(false)
    }
}

impl Default for MixerStore {
    fn default() -> Self {
        Self::with_mic(GainRange::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_publish_new_snapshots() {
        let store = MixerStore::default();
        let before = store.snapshot();
        store
            .set_channel_gain(&SourceTarget::Source(AudioSourceId::Mic), 0.5)
            .unwrap();
        let after = store.snapshot();
        assert_eq!(before.get(&AudioSourceId::Mic).unwrap().gain, 1.0);
        assert_eq!(after.get(&AudioSourceId::Mic).unwrap().gain, 0.5);
    }

    #[test]
    fn failed_update_leaves_state() {
        let store = MixerStore::default();
        let before = store.snapshot();
        let err = store.toggle_mute(&SourceTarget::Source(AudioSourceId::remote("x")));
        assert!(err.is_err());
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[tokio::test]
    async fn subscribers_see_whole_group_update() {
        let store = MixerStore::default();
        store.ensure_source(&AudioSourceId::remote("a"), SourceConfig::remote_default());
        store.ensure_source(&AudioSourceId::remote("b"), SourceConfig::remote_default());

        let mut rx = store.subscribe();
        rx.borrow_and_update();
        store.toggle_mute(&SourceTarget::Remotes).unwrap();
        rx.changed().await.unwrap();

        let seen = rx.borrow().clone();
        assert!(seen.remote_sources().iter().all(|(_, c)| c.muted));
    }

    fn narrow() -> MixerStore {
        MixerStore::from_settings(&MixerSettings {
            min_gain: 0.0,
            max_gain: 0.8,
            default_gain: 0.5,
        })
    }

    #[test]
    fn new_strips_start_at_the_configured_gain() {
        let store = narrow();
        assert_eq!(store.default_gain(), 0.5);

        let a = AudioSourceId::remote("a");
        assert!(store.ensure_source(&a, store.remote_strip()));
        let snapshot = store.snapshot();
        let strip = snapshot.get(&a).unwrap();
        assert_eq!(strip.gain, 0.5);
        assert!(store.range().contains(strip.send(BusName::Monitor).gain));
        assert_eq!(store.local_strip().gain, 0.5);
    }

    #[test]
    fn inserted_strips_are_pulled_into_range() {
        let store = narrow();
        let b = AudioSourceId::remote("b");
        store.ensure_source(&b, SourceConfig::remote_default().with_gain(3.0));
        let snapshot = store.snapshot();
        let strip = snapshot.get(&b).unwrap();
        assert_eq!(strip.gain, 0.8);
        assert_eq!(strip.send(BusName::Monitor).gain, 0.8);

        let seeded = MixerStore::with_mic(GainRange::new(0.0, 0.8));
        assert_eq!(seeded.snapshot().get(&AudioSourceId::Mic).unwrap().gain, 0.8);
    }

    #[test]
    fn starting_gain_outside_the_range_is_clamped() {
        let store = MixerStore::new(MixerConfig::new(), GainRange::new(0.0, 0.8)).with_default_gain(1.4);
        assert_eq!(store.default_gain(), 0.8);
        assert_eq!(MixerStore::default().default_gain(), 1.0);
    }

    #[test]
    fn ensure_does_not_wake_when_present() {
        let store = MixerStore::default();
        let rx = store.subscribe();
        assert!(!store.ensure_source(&AudioSourceId::Mic, SourceConfig::remote_default()));
        assert!(!rx.has_changed().unwrap());
        assert!(!store.send_enabled(&AudioSourceId::Mic, BusName::Monitor));
    }
}
