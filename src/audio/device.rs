//! Audio input enumeration

use cpal::traits::{DeviceTrait, HostTrait};

use crate::error::DeviceError;
use crate::protocol::AudioDeviceInfo;

/// Rates probed when describing a device
const PROBE_RATES: [u32; 6] = [44100, 48000, 88200, 96000, 176400, 192000];

/// Wrapper around a cpal input device
pub struct InputDevice {
    inner: cpal::Device,
    pub id: String,
    pub name: String,
}

impl InputDevice {
    fn from_cpal(device: cpal::Device) -> Self {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        Self {
            id: device_id(&name),
            inner: device,
            name,
        }
    }

    pub fn inner(&self) -> &cpal::Device {
        &self.inner
    }

    pub fn into_inner(self) -> cpal::Device {
        self.inner
    }

    pub fn default_config(&self) -> Result<cpal::SupportedStreamConfig, DeviceError> {
        self.inner
            .default_input_config()
            .map_err(|e| classify_default_config_error(&self.id, e))
    }
}

/// Stable identifier for an input named `name`
pub fn device_id(name: &str) -> String {
    format!("input:{}", name)
}

/// List every input device on the default host
pub fn list_input_devices() -> Vec<AudioDeviceInfo> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    let mut devices = Vec::new();
    let inputs = match host.input_devices() {
        Ok(inputs) => inputs,
        Err(e) => {
            tracing::warn!("Failed to enumerate input devices: {}", e);
            return devices;
        }
    };

    for device in inputs {
        let Ok(name) = device.name() else {
            continue;
        };
        let (sample_rates, channels) = input_capabilities(&device);
        devices.push(AudioDeviceInfo {
            id: device_id(&name),
            is_default: default_name.as_ref() == Some(&name),
            name,
            sample_rates,
            channels,
        });
    }

    devices
}

fn input_capabilities(device: &cpal::Device) -> (Vec<u32>, Vec<u16>) {
    let mut sample_rates = Vec::new();
    let mut channels = Vec::new();

    if let Ok(configs) = device.supported_input_configs() {
        for config in configs {
            for rate_val in PROBE_RATES {
                let rate = cpal::SampleRate(rate_val);
                if rate >= config.min_sample_rate()
                    && rate <= config.max_sample_rate()
                    && !sample_rates.contains(&rate_val)
                {
                    sample_rates.push(rate_val);
                }
            }
            let ch = config.channels();
            if !channels.contains(&ch) {
                channels.push(ch);
            }
        }
    }

    sample_rates.sort_unstable();
    channels.sort_unstable();
    (sample_rates, channels)
}

/// Resolve an input by id (`input:<name>` or a bare name), or the default
/// input when `id` is `None`
pub fn get_input_device(id: Option<&str>) -> Result<InputDevice, DeviceError> {
    let host = cpal::default_host();

    let Some(id) = id else {
        return host
            .default_input_device()
            .map(InputDevice::from_cpal)
            .ok_or_else(|| DeviceError::NotFound("no default input device".to_string()));
    };

    let name = id.strip_prefix("input:").unwrap_or(id);
    let devices = host
        .input_devices()
        .map_err(|e| DeviceError::Unavailable(e.to_string()))?;

    for device in devices {
        if device.name().ok().as_deref() == Some(name) {
            return Ok(InputDevice::from_cpal(device));
        }
    }

    Err(DeviceError::NotFound(id.to_string()))
}

/// Sort a backend error message into the operator-facing categories
pub fn classify_message(detail: &str) -> DeviceError {
    let lower = detail.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not allowed") {
        DeviceError::PermissionDenied(detail.to_string())
    } else if lower.contains("not found") || lower.contains("no such") {
        DeviceError::NotFound(detail.to_string())
    } else {
        DeviceError::Unavailable(detail.to_string())
    }
}

fn classify_default_config_error(id: &str, err: cpal::DefaultStreamConfigError) -> DeviceError {
    match err {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => DeviceError::NotFound(id.to_string()),
        other => classify_message(&other.to_string()),
    }
}

/// Classify a failure to build an input stream
pub fn classify_build_error(id: &str, err: cpal::BuildStreamError) -> DeviceError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => DeviceError::NotFound(id.to_string()),
        other => classify_message(&other.to_string()),
    }
}

/// Classify a failure to start an input stream
pub fn classify_play_error(id: &str, err: cpal::PlayStreamError) -> DeviceError {
    match err {
        cpal::PlayStreamError::DeviceNotAvailable => DeviceError::NotFound(id.to_string()),
        other => classify_message(&other.to_string()),
    }
}
