//! Opus decoder wrapper
//!
//! Turns a presenter's RTP payloads back into interleaved PCM, concealing
//! gaps when the sequence number jumps.

use opus::{Channels, Decoder};

use crate::error::CodecError;

/// Opus decoder with loss concealment
pub struct OpusDecoder {
    decoder: Decoder,
    sample_rate: u32,
    channels: u16,
    /// Decoding buffer (reused to avoid allocations)
    decode_buffer: Vec<f32>,
    last_sequence: Option<u16>,
    /// Samples per channel of the last decoded frame
    last_frame_size: usize,
    frames_decoded: u64,
    frames_concealed: u64,
}

impl OpusDecoder {
    pub fn new(sample_rate: u32, channels: u16) -> Result<Self, CodecError> {
        let opus_channels = match channels {
            1 => Channels::Mono,
            2 => Channels::Stereo,
            _ => {
                return Err(CodecError::DecoderInit(format!(
                    "Unsupported channel count: {}",
                    channels
                )))
            }
        };

        let decoder = Decoder::new(sample_rate, opus_channels)
            .map_err(|e| CodecError::DecoderInit(e.to_string()))?;

        // 120 ms is the longest Opus frame
        let decode_buffer = vec![0.0f32; sample_rate as usize * channels as usize * 120 / 1000];

        Ok(Self {
            decoder,
            sample_rate,
            channels,
            decode_buffer,
            last_sequence: None,
            last_frame_size: 0,
            frames_decoded: 0,
            frames_concealed: 0,
        })
    }

    /// Decode one packet to interleaved samples
    pub fn decode(&mut self, data: &[u8]) -> Result<Vec<f32>, CodecError> {
        let samples = self
            .decoder
            .decode_float(data, &mut self.decode_buffer, false)
            .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;

        self.frames_decoded += 1;
        self.last_frame_size = samples;
        let total = samples * self.channels as usize;
        Ok(self.decode_buffer[..total].to_vec())
    }

    /// Decode an RTP payload, concealing a single lost packet with FEC
    /// and longer gaps with plain loss concealment.
    pub fn decode_sequenced(&mut self, sequence: u16, data: &[u8]) -> Result<Vec<f32>, CodecError> {
        let gap = match self.last_sequence {
            Some(last) => sequence.wrapping_sub(last).wrapping_sub(1),
            None => 0,
        };
        self.last_sequence = Some(sequence);

        // Large jumps are a stream restart, not loss
        let mut out = Vec::new();
        if gap > 0 && gap < 5 && self.last_frame_size > 0 {
            // Concealment decodes exactly as many samples as the output holds
            let len = self.last_frame_size * self.channels as usize;
            for missing in 0..gap {
                let fec = missing + 1 == gap;
                let input: &[u8] = if fec { data } else { &[] };
                let concealed = self
                    .decoder
                    .decode_float(input, &mut self.decode_buffer[..len], fec)
                    .map_err(|e| CodecError::DecodingFailed(e.to_string()))?;
                self.frames_concealed += 1;
                out.extend_from_slice(&self.decode_buffer[..concealed * self.channels as usize]);
            }
        }

        out.extend(self.decode(data)?);
        Ok(out)
    }

    pub fn reset(&mut self) -> Result<(), CodecError> {
        self.last_sequence = None;
        self.decoder
            .reset_state()
            .map_err(|e| CodecError::DecoderInit(e.to_string()))
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    pub fn frames_concealed(&self) -> u64 {
        self.frames_concealed
    }
}
