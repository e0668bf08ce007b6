//! Mixer state: gain stage, per-source channel strips and bus sends
//!
//! [`MixerConfig`] is an immutable value; every mutation yields a new one.
//! [`MixerStore`] holds the current value and is the single shared source
//! of truth read by the render path and the level meters.

pub mod gain;
pub mod model;
pub mod source;
pub mod store;

pub use gain::{clamp, db_to_linear, format_db, linear_to_db, meter_scale, GainRange};
pub use model::{MixerConfig, SourceTarget};
pub use source::{AudioSourceId, BusName, BusSend, SendUpdate, SourceConfig};
pub use store::MixerStore;
