//! Opus codec wrapper
//!
//! Contribution audio is Opus over the peer connection: the presenter's
//! microphone is packetised by [`OpusEncoder`], remote tracks are turned
//! back into PCM by [`OpusDecoder`].

pub mod encoder;
pub mod decoder;

pub use encoder::OpusEncoder;
pub use decoder::OpusDecoder;

/// Samples per channel in one frame of `frame_ms` at `sample_rate`
pub fn frame_size_from_ms(sample_rate: u32, frame_ms: f32) -> usize {
    (sample_rate as f32 * frame_ms / 1000.0) as usize
}
