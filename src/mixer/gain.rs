//! Gain stage math

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_MAX_GAIN, DEFAULT_MIN_GAIN};

/// Display sentinel for silence
pub const NEG_INFINITY_LABEL: &str = "−∞";

/// Linear gain to decibels. Zero (or less) is negative infinity.
pub fn linear_to_db(gain: f32) -> f32 {
    if gain <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}

/// Decibels to linear gain
pub fn db_to_linear(db: f32) -> f32 {
    if db == f32::NEG_INFINITY {
        0.0
    } else {
        10.0_f32.powf(db / 20.0)
    }
}

/// Clamp into `[min, max]`. NaN maps to `min`.
pub fn clamp(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        return min;
    }
    value.max(min).min(max)
}

/// Fader readout, e.g. `+1.9 dB` or `−∞`
pub fn format_db(gain: f32) -> String {
    let db = linear_to_db(gain);
    if db == f32::NEG_INFINITY {
        NEG_INFINITY_LABEL.to_string()
    } else {
        format!("{:+.1} dB", db)
    }
}

/// Map a level in dBFS onto `0.0..=1.0` for a meter whose bottom is `floor_db`
pub fn meter_scale(level_db: f32, floor_db: f32) -> f32 {
    if level_db.is_nan() || level_db <= floor_db || floor_db >= 0.0 {
        return 0.0;
    }
    clamp((level_db - floor_db) / -floor_db, 0.0, 1.0)
}

/// Allowed range of a fader
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GainRange {
    pub min: f32,
    pub max: f32,
}

impl GainRange {
    pub fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        clamp(value, self.min, self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

impl Default for GainRange {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_GAIN, DEFAULT_MAX_GAIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unity_is_zero_db() {
        assert_eq!(linear_to_db(1.0), 0.0);
        assert!((linear_to_db(1.5) - 3.52).abs() < 0.01);
        assert!((linear_to_db(0.5) + 6.02).abs() < 0.01);
    }

    #[test]
    fn silence_is_negative_infinity() {
        assert_eq!(linear_to_db(0.0), f32::NEG_INFINITY);
        assert_eq!(format_db(0.0), NEG_INFINITY_LABEL);
        assert_eq!(db_to_linear(f32::NEG_INFINITY), 0.0);
    }

    #[test]
    fn readout_format() {
        assert_eq!(format_db(1.0), "+0.0 dB");
        assert_eq!(format_db(1.5), "+3.5 dB");
        assert_eq!(format_db(0.5), "-6.0 dB");
    }

    #[test]
    fn clamp_handles_nan() {
        assert_eq!(clamp(f32::NAN, 0.0, 1.5), 0.0);
        assert_eq!(clamp(f32::INFINITY, 0.0, 1.5), 1.5);
        assert_eq!(clamp(-3.0, 0.0, 1.5), 0.0);
    }

    #[test]
    fn meter_scaling() {
        assert_eq!(meter_scale(-60.0, -60.0), 0.0);
        assert_eq!(meter_scale(-80.0, -60.0), 0.0);
        assert_eq!(meter_scale(0.0, -60.0), 1.0);
        assert_eq!(meter_scale(6.0, -60.0), 1.0);
        assert!((meter_scale(-30.0, -60.0) - 0.5).abs() < 1e-6);
        assert_eq!(meter_scale(f32::NEG_INFINITY, -60.0), 0.0);
    }

    proptest! {
        #[test]
        fn clamped_gain_stays_in_range(value in proptest::num::f32::ANY) {
            let range = GainRange::default();
            let clamped = range.clamp(value);
            prop_assert!(range.contains(clamped));
        }

        #[test]
        fn db_round_trip(gain in 0.001f32..1.5) {
            let back = db_to_linear(linear_to_db(gain));
            prop_assert!((back - gain).abs() < 1e-4);
        }
    }
}
