//! Lock-free ring buffer for audio frames
//!
//! Single-producer single-consumer queue between a capture or decode
//! thread and whoever consumes the track (analysis tap, transport pump,
//! render path). Consumers care about the freshest audio, so a full
//! buffer drops its oldest frame rather than the new one.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Audio frame containing interleaved samples
#[derive(Clone, Debug)]
pub struct AudioFrame {
    /// Interleaved audio samples (f32)
    pub samples: Vec<f32>,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in microseconds
    pub timestamp: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, channels: u16, timestamp: u64, sequence: u32) -> Self {
        Self {
            samples,
            channels,
            timestamp,
            sequence,
        }
    }

    /// Get number of samples per channel
    pub fn samples_per_channel(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Get frame duration in microseconds
    pub fn duration_us(&self, sample_rate: u32) -> u64 {
        (self.samples_per_channel() as u64 * 1_000_000) / sample_rate as u64
    }
}

/// Lock-free ring buffer for audio frames
pub struct RingBuffer {
    queue: ArrayQueue<AudioFrame>,
    dropped_count: AtomicUsize,
}

impl RingBuffer {
    /// Create a new ring buffer with the specified capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            dropped_count: AtomicUsize::new(0),
        }
    }

    /// Push a frame, evicting the oldest one when full.
    /// Returns false if a frame was evicted.
    pub fn push(&self, frame: AudioFrame) -> bool {
        match self.queue.force_push(frame) {
            None => true,
            Some(_) => {
                self.dropped_count.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Pop the oldest frame
    pub fn try_pop(&self) -> Option<AudioFrame> {
        self.queue.pop()
    }

    /// Pop every buffered frame, appending samples to `out`.
    /// Returns the number of frames drained.
    pub fn drain_into(&self, out: &mut Vec<f32>) -> usize {
        let mut frames = 0;
        while let Some(frame) = self.queue.pop() {
            out.extend_from_slice(&frame.samples);
            frames += 1;
        }
        frames
    }

    /// Discard everything buffered
    pub fn clear(&self) {
        while self.queue.pop().is_some() {}
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Frames evicted because the consumer fell behind
    pub fn dropped_count(&self) -> usize {
        self.dropped_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a ring buffer
pub type SharedRingBuffer = Arc<RingBuffer>;

/// Create a new shared ring buffer
pub fn create_shared_buffer(capacity: usize) -> SharedRingBuffer {
    Arc::new(RingBuffer::new(capacity))
}
