//! Application configuration
//!
//! Loaded from `config.toml` in the platform config directory, falling back
//! to defaults for anything missing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::*;
use crate::error::{Error, Result};
use crate::mixer::GainRange;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub identity: IdentityConfig,
    pub mixer: MixerSettings,
    pub signaling: SignalingConfig,
    pub ice: IceConfig,
    pub audio: AudioSettings,
    pub studio: StudioSettings,
}

/// Who this process is on the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub peer_id: String,
    pub display_name: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            peer_id: uuid::Uuid::new_v4().to_string(),
            display_name: "Presenter".to_string(),
        }
    }
}

/// Fader ranges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixerSettings {
    pub min_gain: f32,
    pub max_gain: f32,
    pub default_gain: f32,
}

impl Default for MixerSettings {
    fn default() -> Self {
        Self {
            min_gain: DEFAULT_MIN_GAIN,
            max_gain: DEFAULT_MAX_GAIN,
            default_gain: UNITY_GAIN,
        }
    }
}

impl MixerSettings {
    pub fn gain_range(&self) -> GainRange {
        GainRange::new(self.min_gain, self.max_gain)
    }
}

/// What to do with a candidate that arrives before its session exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidatePolicy {
    /// Discard it
    #[default]
    Drop,
    /// Hold it and replay once the session has a remote description
    Buffer,
}

/// Relay connection and server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Relay endpoint clients connect to
    pub relay_url: String,
    /// Relay identity of the studio presenters contribute to
    pub studio_id: String,
    /// Bind address of the relay server
    pub bind_address: String,
    pub port: u16,
    pub candidate_policy: CandidatePolicy,
    /// Per-peer limit when buffering early candidates
    pub max_pending_candidates: usize,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            relay_url: format!("ws://127.0.0.1:{}/ws", DEFAULT_RELAY_PORT),
            studio_id: "studio".to_string(),
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_RELAY_PORT,
            candidate_policy: CandidatePolicy::Drop,
            max_pending_candidates: 32,
        }
    }
}

/// NAT traversal servers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    pub stun_urls: Vec<String>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            stun_urls: vec!["stun:stun.l.google.com:19302".to_string()],
        }
    }
}

/// Capture and encoding settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_size_ms: f32,
    pub bitrate: u32,
    pub meter_floor_db: f32,
    /// Frames buffered per analysis/transport subscriber
    pub tap_capacity: usize,
    /// How often the input device list is re-read
    pub device_poll_ms: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            channels: DEFAULT_CHANNELS,
            frame_size_ms: DEFAULT_FRAME_SIZE_MS,
            bitrate: DEFAULT_BITRATE,
            meter_floor_db: METER_FLOOR_DB,
            tap_capacity: RING_BUFFER_CAPACITY,
            device_poll_ms: 2000,
        }
    }
}

/// Studio console settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioSettings {
    /// Admit on-air requests without operator action
    pub auto_admit: bool,
    pub bind_address: String,
    pub http_port: u16,
}

impl Default for StudioSettings {
    fn default() -> Self {
        Self {
            auto_admit: false,
            bind_address: "127.0.0.1".to_string(),
            http_port: DEFAULT_HTTP_PORT,
        }
    }
}

impl AppConfig {
    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "remote-studio")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the default location, or fall back to defaults
    pub fn load_or_default() -> Self {
        match Self::default_path() {
            Some(path) if path.exists() => match Self::load(&path) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Ignoring config at {}: {}", path.display(), e);
                    Self::default()
                }
            },
            _ => Self::default(),
        }
    }

    /// Write as TOML, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.mixer.min_gain <= self.mixer.max_gain) {
            return Err(Error::Config(format!(
                "min_gain {} exceeds max_gain {}",
                self.mixer.min_gain, self.mixer.max_gain
            )));
        }
        if self.mixer.min_gain < 0.0 {
            return Err(Error::Config("min_gain must not be negative".into()));
        }
        if !self.mixer.gain_range().contains(self.mixer.default_gain) {
            return Err(Error::Config(format!(
                "default_gain {} is outside {}..={}",
                self.mixer.default_gain, self.mixer.min_gain, self.mixer.max_gain
            )));
        }
        if self.audio.sample_rate == 0 {
            return Err(Error::Config("sample_rate must be positive".into()));
        }
        if !matches!(self.audio.channels, 1 | 2) {
            return Err(Error::Config(format!(
                "unsupported channel count: {}",
                self.audio.channels
            )));
        }
        if self.signaling.studio_id.is_empty() {
            return Err(Error::Config("studio_id must not be empty".into()));
        }
        if self.audio.tap_capacity == 0 {
            return Err(Error::Config("tap_capacity must be positive".into()));
        }
        Ok(())
    }
}
