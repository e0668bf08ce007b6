//! Microphone capture
//!
//! A cpal input stream is not `Send`, so each capture gets a dedicated
//! thread that builds, plays and finally drops the stream. The thread
//! reports whether the device actually opened before `start` returns,
//! which is what lets acquisition fail with a classified [`DeviceError`]
//! instead of a silent track.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::StreamConfig;
use crossbeam_channel::{bounded, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::audio::buffer::AudioFrame;
use crate::audio::device::{classify_build_error, classify_play_error, get_input_device, InputDevice};
use crate::audio::stream::AudioTrack;
use crate::config::AudioSettings;
use crate::error::DeviceError;

/// How long to wait for the backend to open the device
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Control handle of a running capture thread
struct CaptureThread {
    running: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl CaptureThread {
    /// Ask the thread to drop its stream and return without waiting for it.
    /// The device is released within one poll of the run flag.
    fn signal_stop(self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop and wait for the thread to exit
    fn join(self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.handle.join();
    }
}

/// A resolved, not yet running, microphone capture
pub struct MicCapture {
    device: InputDevice,
    config: StreamConfig,
}

impl MicCapture {
    /// Resolve `device_id` (or the default input) and prepare a stream config
    pub fn open(device_id: Option<&str>, settings: &AudioSettings) -> Result<Self, DeviceError> {
        let device = get_input_device(device_id)?;
        // Probing the default config surfaces permission problems early
        let default_config = device.default_config()?;

        let channels = settings.channels.min(default_config.channels().max(1));
        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(settings.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        Ok(Self { device, config })
    }

    pub fn device_id(&self) -> &str {
        &self.device.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Start capturing. The returned track stops the capture thread when stopped.
    pub fn start(self) -> Result<AudioTrack, DeviceError> {
        let track = AudioTrack::new(self.device.name.clone(), self.sample_rate(), self.channels());
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<(), DeviceError>>(1);

        let device_id = self.device.id.clone();
        let config = self.config;
        let channels = config.channels;
        let producer = track.clone();
        let running_for_loop = running.clone();
        let sequence = Arc::new(AtomicU32::new(0));

        let handle = thread::Builder::new()
            .name(format!("capture-{}", device_id))
            .spawn(move || {
                let cpal_device = self.device.into_inner();
                let start_time = Instant::now();
                let error_id = device_id.clone();

                let stream = cpal_device.build_input_stream(
                    &config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        let seq = sequence.fetch_add(1, Ordering::Relaxed);
                        let timestamp = start_time.elapsed().as_micros() as u64;
                        producer.push_frame(AudioFrame::new(data.to_vec(), channels, timestamp, seq));
                    },
                    move |err| {
                        tracing::error!("Input stream error on {}: {}", error_id, err);
                    },
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(classify_build_error(&device_id, e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(classify_play_error(&device_id, e)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));

                while running_for_loop.load(Ordering::Relaxed) {
                    thread::sleep(Duration::from_millis(10));
                }
                // Dropping the stream releases the device
                drop(stream);
                tracing::debug!("Capture thread for {} exiting", device_id);
            })
            .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

        let outcome = match ready_rx.recv_timeout(OPEN_TIMEOUT) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                Err(DeviceError::Unavailable("timed out opening input".to_string()))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(DeviceError::Unavailable("capture thread exited".to_string()))
            }
        };

        let worker = CaptureThread { running, handle };
        if let Err(e) = outcome {
            track.stop();
            worker.join();
            return Err(e);
        }

        // Tracks are stopped from async tasks; this must not block
        track.set_stop_handler(move || worker.signal_stop());
        tracing::info!("Capturing from {} ({} Hz, {} ch)", track.label(), track.sample_rate(), track.channels());
        Ok(track)
    }
}

/// Open and start the microphone in one step
pub fn start_mic(device_id: Option<&str>, settings: &AudioSettings) -> Result<AudioTrack, DeviceError> {
    MicCapture::open(device_id, settings)?.start()
}
