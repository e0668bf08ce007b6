//! Opus encoder wrapper
//!
//! Voice-tuned encoding of the presenter's microphone. Capture callbacks
//! deliver arbitrary block sizes, so the encoder keeps a carry-over buffer
//! and emits one packet per complete frame.

use bytes::Bytes;
use opus::{Application, Channels, Encoder};

use crate::codec::frame_size_from_ms;
use crate::config::AudioSettings;
use crate::error::CodecError;

/// Opus encoder with a frame accumulator
pub struct OpusEncoder {
    encoder: Encoder,
    sample_rate: u32,
    channels: u16,
    /// Samples per channel in one frame
    frame_size: usize,
    /// Interleaved samples waiting for a full frame
    pending: Vec<f32>,
    /// Encoding buffer (reused to avoid allocations)
    encode_buffer: Vec<u8>,
    frames_encoded: u64,
    bytes_produced: u64,
}

impl OpusEncoder {
    /// Create a voice encoder
    pub fn new(
        sample_rate: u32,
        channels: u16,
        bitrate: u32,
        frame_size_ms: f32,
    ) -> Result<Self, CodecError> {
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(CodecError::EncoderInit(format!(
                    "Unsupported channel count: {}",
                    channels
                )))
            }
        };

        let frame_size = frame_size_from_ms(sample_rate, frame_size_ms);
        // Opus accepts 2.5, 5, 10, 20, 40 and 60 ms frames
        let valid: Vec<usize> = [2.5f32, 5.0, 10.0, 20.0, 40.0, 60.0]
            .iter()
            .map(|ms| frame_size_from_ms(sample_rate, *ms))
            .collect();
        if !valid.contains(&frame_size) {
            return Err(CodecError::InvalidFrameSize(frame_size));
        }

        let mut encoder = Encoder::new(sample_rate, opus_channels, Application::Voip)
            .map_err(|e| CodecError::EncoderInit(e.to_string()))?;

        encoder
            .set_bitrate(opus::Bitrate::Bits(bitrate as i32))
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set bitrate: {}", e)))?;
        encoder
            .set_vbr(true)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set VBR: {}", e)))?;
        // In-band FEC lets the far end recover single lost packets
        encoder
            .set_inband_fec(true)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set FEC: {}", e)))?;
        encoder
            .set_packet_loss_perc(5)
            .map_err(|e| CodecError::EncoderInit(format!("Failed to set packet loss: {}", e)))?;

        Ok(Self {
            encoder,
            sample_rate,
            channels,
            frame_size,
            pending: Vec::with_capacity(frame_size * channels as usize * 2),
            // Max Opus packet is about 1275 bytes
            encode_buffer: vec![0u8; 4000],
            frames_encoded: 0,
            bytes_produced: 0,
        })
    }

    /// Encoder for the contribution link
    pub fn for_contribution(settings: &AudioSettings) -> Result<Self, CodecError> {
        Self::new(
            settings.sample_rate,
            settings.channels,
            settings.bitrate,
            settings.frame_size_ms,
        )
    }

    /// Encode exactly one frame of interleaved samples
    pub fn encode(&mut self, samples: &[f32]) -> Result<Bytes, CodecError> {
        if samples.len() != self.samples_per_frame() {
            return Err(CodecError::InvalidFrameSize(samples.len()));
        }

        let size = self
            .encoder
            .encode_float(samples, &mut self.encode_buffer)
            .map_err(|e| CodecError::EncodingFailed(e.to_string()))?;

        self.frames_encoded += 1;
        self.bytes_produced += size as u64;

        Ok(Bytes::copy_from_slice(&self.encode_buffer[..size]))
    }

    /// Append samples of any length, returning a packet per completed frame
    pub fn push_samples(&mut self, samples: &[f32]) -> Result<Vec<Bytes>, CodecError> {
        self.pending.extend_from_slice(samples);

        let frame_len = self.samples_per_frame();
        let mut packets = Vec::new();
        while self.pending.len() >= frame_len {
            let frame: Vec<f32> = self.pending.drain(..frame_len).collect();
            packets.push(self.encode(&frame)?);
        }
        Ok(packets)
    }

    /// Drop any partial frame
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Samples per channel in one frame
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Interleaved samples in one frame
    pub fn samples_per_frame(&self) -> usize {
        self.frame_size * self.channels as usize
    }

    pub fn frame_duration_ms(&self) -> f32 {
        self.frame_size as f32 * 1000.0 / self.sample_rate as f32
    }

    pub fn stats(&self) -> EncoderStats {
        EncoderStats {
            frames_encoded: self.frames_encoded,
            bytes_produced: self.bytes_produced,
            average_frame_size: if self.frames_encoded > 0 {
                self.bytes_produced as f32 / self.frames_encoded as f32
            } else {
                0.0
            },
        }
    }
}

/// Encoder statistics
#[derive(Debug, Clone)]
pub struct EncoderStats {
    pub frames_encoded: u64,
    pub bytes_produced: u64,
    pub average_frame_size: f32,
}
