//! # Remote Studio
//!
//! Remote-presenter contribution and mixer-state coordination for a live
//! radio studio.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────┐            ┌──────────────────────────────────┐
//! │            PRESENTER             │            │              STUDIO              │
//! │                                  │            │                                  │
//! │  ┌────────────┐  ┌────────────┐  │            │  ┌────────────┐  ┌────────────┐  │
//! │  │ Microphone │─▶│  Analysis  │  │            │  │  Presence  │  │  Control   │  │
//! │  │  (cpal)    │  │    Tap     │  │            │  │   Binder   │  │ API (axum) │  │
//! │  └─────┬──────┘  └────────────┘  │            │  └─────┬──────┘  └─────┬──────┘  │
//! │        ▼                         │            │        ▼               ▼         │
//! │  ┌────────────┐  ┌────────────┐  │  offer /   │  ┌────────────┐  ┌────────────┐  │
//! │  │    Mic     │─▶│   Peer     │◀─┼─ answer / ─┼─▶│   Peer     │─▶│ MixerStore │  │
//! │  │ Controller │  │  Sessions  │  │ candidates │  │  Sessions  │  │ (main/mon) │  │
//! │  └─────┬──────┘  └─────┬──────┘  │            │  └─────┬──────┘  └─────┬──────┘  │
//! │        ▼               │ Opus    │            │        │ Opus          ▼         │
//! │  ┌────────────┐        │ over    │            │        ▼         ┌────────────┐  │
//! │  │ MixerStore │        │ WebRTC ─┼────────────┼──▶ remote track ▶│  Routing   │  │
//! │  └────────────┘        │         │            │                  │   Sink     │  │
//! │                        ▼         │            │                  └────────────┘  │
//! └────────────────────────┼─────────┘            └──────────────────────────────────┘
//!                          │                                   ▲
//!                          ▼                                   │
//!              ┌───────────────────────────────────────────────┴──┐
//!              │  Signaling relay (signaling::server, WebSocket)  │
//!              │  signal / request_on_air / on_air_status / roster│
//!              └──────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod binder;
pub mod codec;
pub mod config;
pub mod error;
pub mod mic;
pub mod mixer;
pub mod peer;
pub mod presenter;
pub mod protocol;
pub mod routing;
pub mod signaling;
pub mod studio;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default sample rate for audio processing
    pub const DEFAULT_SAMPLE_RATE: u32 = 48000;

    /// Default channel count (stereo)
    pub const DEFAULT_CHANNELS: u16 = 2;

    /// Default Opus bitrate for contribution audio
    pub const DEFAULT_BITRATE: u32 = 64_000;

    /// Default frame size in milliseconds
    pub const DEFAULT_FRAME_SIZE_MS: f32 = 20.0;

    /// Lowest channel/send gain
    pub const DEFAULT_MIN_GAIN: f32 = 0.0;

    /// Highest channel/send gain (+3.5 dB of headroom)
    pub const DEFAULT_MAX_GAIN: f32 = 1.5;

    /// Unity gain
    pub const UNITY_GAIN: f32 = 1.0;

    /// Default port for the signaling relay
    pub const DEFAULT_RELAY_PORT: u16 = 8090;

    /// Default port for the studio HTTP control surface
    pub const DEFAULT_HTTP_PORT: u16 = 8081;

    /// Lock-free ring buffer capacity (in frames)
    pub const RING_BUFFER_CAPACITY: usize = 256;

    /// Floor of the level meter in dBFS
    pub const METER_FLOOR_DB: f32 = -60.0;

    /// Prefix for remote presenter sources (`remote_<presenter-id>`)
    pub const REMOTE_SOURCE_PREFIX: &str = "remote_";
}
