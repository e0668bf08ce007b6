//! Audio subsystem module

pub mod buffer;
pub mod capture;
pub mod device;
pub mod meter;
pub mod provider;
pub mod stream;

pub use buffer::{AudioFrame, RingBuffer, SharedRingBuffer};
pub use capture::{start_mic, MicCapture};
pub use device::{get_input_device, list_input_devices, InputDevice};
pub use meter::{AnalysisTap, LevelMeter};
pub use provider::{CpalMediaProvider, DeviceEvent, DeviceWatcher, MediaProvider};
pub use stream::{AudioTrack, MediaStream};
