//! Routing sink
//!
//! The render path learns which sources currently have live audio through
//! [`RoutingSink`]. [`mixdown`] is the reference bus render: it applies
//! exactly the gain the mixer model reports for each `(source, bus)` pair.

use dashmap::DashMap;
use std::sync::Arc;

use crate::audio::stream::AudioTrack;
use crate::mixer::{AudioSourceId, BusName, MixerConfig};

/// Receives stream availability changes per source
pub trait RoutingSink: Send + Sync {
    /// `Some(track)` when `source` gains a live stream, `None` when it loses it
    fn notify_stream_available(&self, source: &AudioSourceId, track: Option<AudioTrack>);
}

/// Live stream per source, as seen by a renderer
#[derive(Default)]
pub struct StreamRegistry {
    streams: DashMap<AudioSourceId, AudioTrack>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn get(&self, source: &AudioSourceId) -> Option<AudioTrack> {
        self.streams.get(source).map(|entry| entry.value().clone())
    }

    pub fn has_stream(&self, source: &AudioSourceId) -> bool {
        self.streams.contains_key(source)
    }

    /// Sources with a live stream, sorted
    pub fn sources(&self) -> Vec<AudioSourceId> {
        let mut sources: Vec<_> = self.streams.iter().map(|entry| entry.key().clone()).collect();
        sources.sort();
        sources
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl RoutingSink for StreamRegistry {
    fn notify_stream_available(&self, source: &AudioSourceId, track: Option<AudioTrack>) {
        match track {
            Some(track) => {
                tracing::debug!("Stream available for {}: {:?}", source, track);
                self.streams.insert(source.clone(), track);
            }
            None => {
                if self.streams.remove(source).is_some() {
                    tracing::debug!("Stream gone for {}", source);
                }
            }
        }
    }
}

/// Sum `inputs` into `out` for `bus`, each scaled by its effective gain.
///
/// `out` is overwritten. Inputs shorter than `out` contribute silence past
/// their end; sources unknown to `config` are silent.
pub fn mixdown(
    config: &MixerConfig,
    bus: BusName,
    inputs: &[(AudioSourceId, &[f32])],
    out: &mut [f32],
) {
    out.fill(0.0);
    for (source, samples) in inputs {
        let gain = config.effective_gain(source, bus);
        if gain == 0.0 {
            continue;
        }
        for (acc, sample) in out.iter_mut().zip(samples.iter()) {
            *acc += sample * gain;
        }
    }
}
