//! Media acquisition
//!
//! [`MediaProvider`] is the seam between the microphone state machine and
//! the audio hardware. The cpal implementation runs device work on the
//! blocking pool since opening an input can take a noticeable while.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::audio::capture::start_mic;
use crate::audio::device::list_input_devices;
use crate::audio::stream::MediaStream;
use crate::config::AudioSettings;
use crate::error::DeviceError;
use crate::protocol::AudioDeviceInfo;

/// Source of audio input streams
#[async_trait]
pub trait MediaProvider: Send + Sync {
    /// Open `device_id`, or the default input when `None`
    async fn acquire(&self, device_id: Option<&str>) -> Result<MediaStream, DeviceError>;

    /// Currently attached inputs
    async fn enumerate_inputs(&self) -> Vec<AudioDeviceInfo>;
}

/// Media provider backed by the system audio host
pub struct CpalMediaProvider {
    settings: AudioSettings,
}

impl CpalMediaProvider {
    pub fn new(settings: AudioSettings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl MediaProvider for CpalMediaProvider {
    async fn acquire(&self, device_id: Option<&str>) -> Result<MediaStream, DeviceError> {
        let settings = self.settings.clone();
        let device_id = device_id.map(str::to_string);

        let track = tokio::task::spawn_blocking(move || start_mic(device_id.as_deref(), &settings))
            .await
            .map_err(|e| DeviceError::Unavailable(e.to_string()))??;

        Ok(MediaStream::new(vec![track]))
    }

    async fn enumerate_inputs(&self) -> Vec<AudioDeviceInfo> {
        match tokio::task::spawn_blocking(list_input_devices).await {
            Ok(devices) => devices,
            Err(e) => {
                tracing::warn!("Device enumeration task failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Device-change notification
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    InputsChanged(Vec<AudioDeviceInfo>),
}

/// Polls the provider and reports when the input list changes
pub struct DeviceWatcher {
    handle: JoinHandle<()>,
}

impl DeviceWatcher {
    /// Start polling every `interval`. The first poll establishes the baseline.
    pub fn spawn(
        provider: Arc<dyn MediaProvider>,
        interval: Duration,
        events: mpsc::Sender<DeviceEvent>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut known = provider.enumerate_inputs().await;
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let current = provider.enumerate_inputs().await;
                if current != known {
                    tracing::info!("Input devices changed: {} available", current.len());
                    known = current.clone();
                    if events.send(DeviceEvent::InputsChanged(current)).await.is_err() {
                        break;
                    }
                }
            }
        });

        Self { handle }
    }

    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for DeviceWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct ScriptedInputs {
        lists: Mutex<Vec<Vec<AudioDeviceInfo>>>,
    }

    #[async_trait]
    impl MediaProvider for ScriptedInputs {
        async fn acquire(&self, _device_id: Option<&str>) -> Result<MediaStream, DeviceError> {
            Err(DeviceError::NotFound("scripted".into()))
        }

        async fn enumerate_inputs(&self) -> Vec<AudioDeviceInfo> {
            let mut lists = self.lists.lock();
            if lists.len() > 1 {
                lists.remove(0)
            } else {
                lists.first().cloned().unwrap_or_default()
            }
        }
    }

    fn device(name: &str) -> AudioDeviceInfo {
        AudioDeviceInfo {
            id: format!("input:{}", name),
            name: name.into(),
            is_default: false,
            sample_rates: vec![48000],
            channels: vec![1],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reports_only_changes() {
        let provider = Arc::new(ScriptedInputs {
            lists: Mutex::new(vec![
                vec![device("a")],
                vec![device("a")],
                vec![device("a"), device("b")],
            ]),
        });
        let (tx, mut rx) = mpsc::channel(4);
        let watcher = DeviceWatcher::spawn(provider, Duration::from_millis(100), tx);

        let event = rx.recv().await.unwrap();
        assert_eq!(event, DeviceEvent::InputsChanged(vec![device("a"), device("b")]));
        watcher.stop();
    }
}
