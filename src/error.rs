//! Error types for the remote studio

use thiserror::Error;

use crate::mixer::{AudioSourceId, SourceTarget};
use crate::protocol::PeerId;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Signaling error: {0}")]
    Signaling(#[from] SignalingError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Mixer error: {0}")]
    Mixer(#[from] MixerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio input acquisition errors
///
/// These are the only failures the presenter is shown directly, see
/// [`DeviceError::operator_message`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Device unavailable: {0}")]
    Unavailable(String),
}

impl DeviceError {
    /// Human-readable cause shown to the operator
    pub fn operator_message(&self) -> &'static str {
        match self {
            DeviceError::PermissionDenied(_) => {
                "Microphone access was denied. Allow audio input access and try again."
            }
            DeviceError::NotFound(_) => {
                "The selected microphone could not be found. Pick another input device."
            }
            DeviceError::Unavailable(_) => {
                "The microphone could not be opened. It may be in use by another application."
            }
        }
    }
}

/// Codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Encoder initialization failed: {0}")]
    EncoderInit(String),

    #[error("Decoder initialization failed: {0}")]
    DecoderInit(String),

    #[error("Encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Invalid frame size: {0}")]
    InvalidFrameSize(usize),
}

/// Signaling relay errors
#[derive(Error, Debug)]
pub enum SignalingError {
    #[error("Failed to encode message: {0}")]
    Encode(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),

    #[error("Connection to relay failed: {0}")]
    ConnectionFailed(String),

    #[error("Send to {0} failed")]
    SendFailed(PeerId),

    #[error("Relay connection closed")]
    RelayClosed,

    #[error("Not connected to a relay")]
    NotConnected,
}

/// Peer session errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("No session for peer {0}")]
    NoSession(PeerId),

    #[error("Session is closed")]
    Closed,
}

/// Mixer model errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MixerError {
    #[error("Unknown source: {0}")]
    UnknownSource(AudioSourceId),

    #[error("Main send of {0} follows on-air admission")]
    AdmissionControlled(SourceTarget),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
