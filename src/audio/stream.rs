//! Live audio track and stream handles
//!
//! An [`AudioTrack`] is what moves between subsystems: the microphone
//! capture produces one, the peer transport consumes it (and produces one
//! per remote presenter), the routing sink is told about it. Frames pushed
//! into a track fan out to every subscriber buffer.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::buffer::{create_shared_buffer, AudioFrame, SharedRingBuffer};

type StopHandler = Box<dyn FnOnce() + Send>;

struct TrackInner {
    id: String,
    label: String,
    sample_rate: u32,
    channels: u16,
    live: AtomicBool,
    subscribers: RwLock<Vec<SharedRingBuffer>>,
    on_stop: Mutex<Option<StopHandler>>,
}

/// Cloneable handle to one live audio track
#[derive(Clone)]
pub struct AudioTrack {
    inner: Arc<TrackInner>,
}

impl AudioTrack {
    pub fn new(label: impl Into<String>, sample_rate: u32, channels: u16) -> Self {
        Self {
            inner: Arc::new(TrackInner {
                id: uuid::Uuid::new_v4().to_string(),
                label: label.into(),
                sample_rate,
                channels,
                live: AtomicBool::new(true),
                subscribers: RwLock::new(Vec::new()),
                on_stop: Mutex::new(None),
            }),
        }
    }

    /// Run `handler` once when the track is stopped (releases the producer)
    pub fn set_stop_handler(&self, handler: impl FnOnce() + Send + 'static) {
        if self.is_live() {
            *self.inner.on_stop.lock() = Some(Box::new(handler));
        } else {
            handler();
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.inner.channels
    }

    pub fn is_live(&self) -> bool {
        self.inner.live.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same track
    pub fn same_track(&self, other: &AudioTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// New consumer buffer receiving every frame pushed from now on
    pub fn subscribe(&self, capacity: usize) -> SharedRingBuffer {
        let buffer = create_shared_buffer(capacity);
        if self.is_live() {
            self.inner.subscribers.write().push(buffer.clone());
        }
        buffer
    }

    pub fn unsubscribe(&self, buffer: &SharedRingBuffer) {
        self.inner
            .subscribers
            .write()
            .retain(|existing| !Arc::ptr_eq(existing, buffer));
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Deliver a frame to every subscriber
    pub fn push_frame(&self, frame: AudioFrame) {
        if !self.is_live() {
            return;
        }
        let subscribers = self.inner.subscribers.read();
        for buffer in subscribers.iter() {
            buffer.push(frame.clone());
        }
    }

    /// Stop the track and release its producer. Safe to call repeatedly.
    pub fn stop(&self) {
        if !self.inner.live.swap(false, Ordering::AcqRel) {
            return;
        }
        let handler = self.inner.on_stop.lock().take();
        if let Some(handler) = handler {
            handler();
        }
        self.inner.subscribers.write().clear();
        tracing::debug!("Track {} ({}) stopped", self.inner.label, self.inner.id);
    }
}

impl fmt::Debug for AudioTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioTrack")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("live", &self.is_live())
            .finish()
    }
}

/// A set of tracks obtained together, e.g. one microphone acquisition
#[derive(Clone, Debug)]
pub struct MediaStream {
    id: String,
    tracks: Vec<AudioTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<AudioTrack>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[AudioTrack] {
        &self.tracks
    }

    /// First audio track
    pub fn audio_track(&self) -> Option<&AudioTrack> {
        self.tracks.first()
    }

    pub fn is_live(&self) -> bool {
        self.tracks.iter().any(AudioTrack::is_live)
    }

    /// Stop every track. Safe to call repeatedly.
    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn fans_out_to_subscribers() {
        let track = AudioTrack::new("mic", 48000, 1);
        let a = track.subscribe(4);
        let b = track.subscribe(4);
        track.push_frame(AudioFrame::new(vec![0.5; 4], 1, 0, 0));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 1);

        track.unsubscribe(&a);
        track.push_frame(AudioFrame::new(vec![0.5; 4], 1, 0, 1));
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 2);
    }

    #[test]
    fn stop_runs_handler_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let track = AudioTrack::new("mic", 48000, 1);
        let counter = calls.clone();
        track.set_stop_handler(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let stream = MediaStream::new(vec![track.clone()]);
        stream.stop();
        stream.stop();
        track.stop();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!stream.is_live());
    }

    #[test]
    fn stopped_track_ignores_frames() {
        let track = AudioTrack::new("remote", 48000, 2);
        let buffer = track.subscribe(4);
        track.stop();
        track.push_frame(AudioFrame::new(vec![0.0; 4], 2, 0, 0));
        assert!(buffer.is_empty());
        assert_eq!(track.subscriber_count(), 0);
    }

    #[test]
    fn handler_on_stopped_track_runs_immediately() {
        let track = AudioTrack::new("mic", 48000, 1);
        track.stop();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        track.set_stop_handler(move || flag.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));
    }
}
