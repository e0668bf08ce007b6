//! Local microphone lifecycle and on-air intent

pub mod controller;
pub mod state;

pub use controller::{ConnectOutcome, MicController, OnAirTransition};
pub use state::{AcquireRequest, MicState, OnAirState};
