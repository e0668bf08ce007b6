//! Level metering
//!
//! The analysis tap subscribes to a track and keeps the latest peak and RMS
//! level in a [`LevelMeter`]. Readers (UI, status API) never block the
//! audio path: levels are stored as `f32` bits in atomics.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::audio::buffer::SharedRingBuffer;
use crate::audio::stream::AudioTrack;
use crate::mixer::{linear_to_db, meter_scale};

/// Peak fall-off per processed block, in dB
const PEAK_DECAY_DB: f32 = 1.5;

/// Latest measured levels of one source
pub struct LevelMeter {
    /// Peak level in dBFS (f32 bits)
    peak_db: AtomicU32,
    /// RMS level in dBFS (f32 bits)
    rms_db: AtomicU32,
    floor_db: f32,
}

impl LevelMeter {
    pub fn new(floor_db: f32) -> Self {
        Self {
            peak_db: AtomicU32::new(floor_db.to_bits()),
            rms_db: AtomicU32::new(floor_db.to_bits()),
            floor_db,
        }
    }

    /// Feed a block of interleaved samples
    pub fn process(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }

        let mut peak = 0.0f32;
        let mut sum_sq = 0.0f32;
        for &s in samples {
            peak = peak.max(s.abs());
            sum_sq += s * s;
        }
        let rms = (sum_sq / samples.len() as f32).sqrt();

        let block_peak = linear_to_db(peak).max(self.floor_db);
        // Peaks jump up instantly and fall back slowly
        let held = self.peak_db() - PEAK_DECAY_DB;
        let peak_db = block_peak.max(held).max(self.floor_db);

        self.peak_db.store(peak_db.to_bits(), Ordering::Relaxed);
        self.rms_db
            .store(linear_to_db(rms).max(self.floor_db).to_bits(), Ordering::Relaxed);
    }

    pub fn peak_db(&self) -> f32 {
        f32::from_bits(self.peak_db.load(Ordering::Relaxed))
    }

    pub fn rms_db(&self) -> f32 {
        f32::from_bits(self.rms_db.load(Ordering::Relaxed))
    }

    /// Peak position on a `0.0..=1.0` meter
    pub fn peak_scaled(&self) -> f32 {
        meter_scale(self.peak_db(), self.floor_db)
    }

    pub fn rms_scaled(&self) -> f32 {
        meter_scale(self.rms_db(), self.floor_db)
    }

    pub fn reset(&self) {
        self.peak_db.store(self.floor_db.to_bits(), Ordering::Relaxed);
        self.rms_db.store(self.floor_db.to_bits(), Ordering::Relaxed);
    }
}

/// Wiring between a live track and a meter
pub struct AnalysisTap {
    track: AudioTrack,
    buffer: SharedRingBuffer,
    meter: Arc<LevelMeter>,
    released: Arc<AtomicBool>,
}

impl AnalysisTap {
    /// Subscribe to `track`; call [`process_pending`](Self::process_pending)
    /// to update the meter.
    pub fn attach(track: &AudioTrack, meter: Arc<LevelMeter>, capacity: usize) -> Self {
        Self {
            track: track.clone(),
            buffer: track.subscribe(capacity),
            meter,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run everything buffered so far through the meter.
    /// Returns the number of frames processed.
    pub fn process_pending(&self) -> usize {
        if self.is_released() {
            return 0;
        }
        let mut block = Vec::new();
        let frames = self.buffer.drain_into(&mut block);
        if frames > 0 {
            self.meter.process(&block);
        }
        frames
    }

    pub fn meter(&self) -> &Arc<LevelMeter> {
        &self.meter
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Detach from the track and zero the meter. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.track.unsubscribe(&self.buffer);
        self.buffer.clear();
        self.meter.reset();
    }
}

impl Drop for AnalysisTap {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::buffer::AudioFrame;

    #[test]
    fn full_scale_sine_reads_near_zero_db() {
        let meter = LevelMeter::new(-60.0);
        let block: Vec<f32> = (0..480)
            .map(|i| (i as f32 / 48.0 * 2.0 * std::f32::consts::PI).sin())
            .collect();
        meter.process(&block);
        assert!(meter.peak_db() > -0.1);
        // Sine RMS sits 3 dB below peak
        assert!((meter.rms_db() + 3.01).abs() < 0.1);
        assert!(meter.peak_scaled() > 0.99);
    }

    #[test]
    fn silence_sits_on_the_floor() {
        let meter = LevelMeter::new(-60.0);
        meter.process(&[0.0; 64]);
        assert_eq!(meter.rms_db(), -60.0);
        assert_eq!(meter.rms_scaled(), 0.0);
    }

    #[test]
    fn peak_decays_gradually() {
        let meter = LevelMeter::new(-60.0);
        meter.process(&[1.0; 16]);
        meter.process(&[0.0; 16]);
        let after_one = meter.peak_db();
        assert!(after_one < 0.0 && after_one > -60.0);
    }

    #[test]
    fn tap_meters_track_and_releases_once() {
        let track = AudioTrack::new("mic", 48000, 1);
        let meter = Arc::new(LevelMeter::new(-60.0));
        let mut tap = AnalysisTap::attach(&track, meter.clone(), 8);
        assert_eq!(track.subscriber_count(), 1);

        track.push_frame(AudioFrame::new(vec![0.5; 32], 1, 0, 0));
        assert_eq!(tap.process_pending(), 1);
        assert!(meter.peak_db() > -7.0);

        tap.release();
        tap.release();
        assert_eq!(track.subscriber_count(), 0);
        assert_eq!(meter.peak_db(), -60.0);
        assert_eq!(tap.process_pending(), 0);
    }
}
