//! Microphone lifecycle
//!
//! [`MicController`] is a plain state machine: it never awaits. Acquiring a
//! device is started by the owner with the returned [`AcquireRequest`] and
//! the result is handed back through [`MicController::complete_connect`],
//! which discards anything the controller no longer wants.

use std::sync::Arc;

use crate::audio::meter::{AnalysisTap, LevelMeter};
use crate::audio::stream::MediaStream;
use crate::config::AudioSettings;
use crate::error::DeviceError;
use crate::mic::state::{AcquireRequest, MicState, OnAirState};
use crate::mixer::{AudioSourceId, BusName, MixerStore, SendUpdate, SourceTarget};
use crate::routing::RoutingSink;

/// Result of feeding an acquisition back into the controller
#[derive(Debug)]
pub enum ConnectOutcome {
    /// Mic is ready; the stream can be attached to a peer session
    Ready(MediaStream),
    /// Acquisition failed; the mic is in the error state
    Failed(DeviceError),
    /// The operator picked another device meanwhile; acquire again
    Retry(AcquireRequest),
    /// Superseded or unwanted; the stream (if any) was stopped
    Stale,
}

/// What going on air requires from the owner
#[derive(Debug, Default)]
pub struct OnAirTransition {
    /// Start this acquisition first; offer once it completes
    pub acquire: Option<AcquireRequest>,
    /// Already-live stream to offer right away
    pub stream: Option<MediaStream>,
}

pub struct MicController {
    state: MicState,
    on_air: OnAirState,
    selected_device: Option<String>,
    generation: u64,
    stream: Option<MediaStream>,
    tap: Option<AnalysisTap>,
    meter: Arc<LevelMeter>,
    last_error: Option<DeviceError>,
    store: MixerStore,
    sink: Arc<dyn RoutingSink>,
    tap_capacity: usize,
}

impl MicController {
    pub fn new(store: MixerStore, sink: Arc<dyn RoutingSink>, settings: &AudioSettings) -> Self {
        store.ensure_source(&AudioSourceId::Mic, store.local_strip());
        Self {
            state: MicState::Disconnected,
            on_air: OnAirState::default(),
            selected_device: None,
            generation: 0,
            stream: None,
            tap: None,
            meter: Arc::new(LevelMeter::new(settings.meter_floor_db)),
            last_error: None,
            store,
            sink,
            tap_capacity: settings.tap_capacity,
        }
    }

    pub fn state(&self) -> MicState {
        self.state
    }

    pub fn on_air(&self) -> OnAirState {
        self.on_air
    }

    pub fn selected_device(&self) -> Option<&str> {
        self.selected_device.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn stream(&self) -> Option<&MediaStream> {
        self.stream.as_ref()
    }

    pub fn last_error(&self) -> Option<&DeviceError> {
        self.last_error.as_ref()
    }

    /// Operator-facing description of the last failure
    pub fn error_message(&self) -> Option<&'static str> {
        self.last_error.as_ref().map(DeviceError::operator_message)
    }

    pub fn meter(&self) -> &Arc<LevelMeter> {
        &self.meter
    }

    /// Record the preferred input. Re-acquires immediately when the mic is
    /// ready or failed.
    pub fn select_device(&mut self, device_id: Option<String>) -> Option<AcquireRequest> {
        if self.selected_device == device_id && self.state == MicState::Ready {
            return None;
        }
        tracing::info!("Input device selected: {}", device_id.as_deref().unwrap_or("default"));
        self.selected_device = device_id;

        if self.state.reacquires_on_select() {
            self.release_stream();
            self.state = MicState::Disconnected;
            self.connect()
        } else {
            None
        }
    }

    /// Start acquiring the selected device. No-op while already connecting.
    pub fn connect(&mut self) -> Option<AcquireRequest> {
        if self.state == MicState::Connecting {
            return None;
        }
        if self.state == MicState::Ready && self.stream.is_some() {
            return None;
        }

        self.generation += 1;
        self.state = MicState::Connecting;
        self.last_error = None;
        tracing::info!("Acquiring microphone (generation {})", self.generation);

        Some(AcquireRequest {
            generation: self.generation,
            device_id: self.selected_device.clone(),
        })
    }

    /// Apply the result of `request`
    pub fn complete_connect(
        &mut self,
        request: &AcquireRequest,
        result: Result<MediaStream, DeviceError>,
    ) -> ConnectOutcome {
        if request.generation != self.generation || self.state != MicState::Connecting {
            tracing::debug!(
                "Discarding acquisition {} (current {}, state {})",
                request.generation,
                self.generation,
                self.state
            );
            if let Ok(stream) = result {
                stream.stop();
            }
            return ConnectOutcome::Stale;
        }

        if request.device_id != self.selected_device {
            if let Ok(stream) = result {
                stream.stop();
            }
            self.state = MicState::Disconnected;
            return match self.connect() {
                Some(next) => ConnectOutcome::Retry(next),
                None => ConnectOutcome::Stale,
            };
        }

        match result {
            Ok(stream) => {
                let Some(track) = stream.audio_track().cloned() else {
                    stream.stop();
                    return self.fail(DeviceError::Unavailable("stream has no audio track".into()));
                };

                self.tap = Some(AnalysisTap::attach(&track, self.meter.clone(), self.tap_capacity));
                self.sink.notify_stream_available(&AudioSourceId::Mic, Some(track));
                self.stream = Some(stream.clone());
                self.state = MicState::Ready;
                tracing::info!("Microphone ready");

                if self.on_air.confirmed_on_air {
                    self.write_send(BusName::Main, self.on_air.main_enabled());
                }
                ConnectOutcome::Ready(stream)
            }
            Err(e) => self.fail(e),
        }
    }

    fn fail(&mut self, error: DeviceError) -> ConnectOutcome {
        tracing::warn!("Microphone acquisition failed: {}", error);
        self.release_stream();
        self.state = MicState::Error;
        self.last_error = Some(error.clone());
        // No audio path, so the presenter cannot stay flagged on air
        self.write_send(BusName::Main, false);
        ConnectOutcome::Failed(error)
    }

    /// Register on-air intent and light the local cue send
    pub fn go_on_air(&mut self) -> OnAirTransition {
        self.on_air.requested_on_air = true;
        self.write_send(BusName::Monitor, true);

        match self.state {
            MicState::Ready => OnAirTransition {
                acquire: None,
                stream: self.stream.clone(),
            },
            MicState::Connecting => OnAirTransition::default(),
            MicState::Disconnected | MicState::Error => OnAirTransition {
                acquire: self.connect(),
                stream: None,
            },
        }
    }

    /// Drop on-air intent. Returns false if it was not set.
    pub fn go_off_air(&mut self) -> bool {
        let was_requested = self.on_air.requested_on_air;
        self.on_air.requested_on_air = false;
        self.write_send(BusName::Monitor, false);
        was_requested
    }

    /// Studio verdict on our on-air request
    pub fn apply_confirmation(&mut self, on_air: bool) {
        self.on_air.confirmed_on_air = on_air;
        let main = self.on_air.main_enabled() && self.state == MicState::Ready;
        if on_air && !main {
            tracing::debug!("Ignoring on-air confirmation: no longer wanted or no audio path");
        }
        self.write_send(BusName::Main, main);
        tracing::info!("Studio confirmed on-air = {}", on_air);
    }

    /// Update the level meter from buffered capture
    pub fn refresh_meter(&self) -> usize {
        self.tap.as_ref().map(AnalysisTap::process_pending).unwrap_or(0)
    }

    /// Stop the hardware, release the tap and forget any in-flight
    /// acquisition. Safe on an already disconnected mic.
    pub fn teardown(&mut self) {
        if self.state == MicState::Disconnected && self.stream.is_none() && self.tap.is_none() {
            return;
        }
        self.generation += 1;
        self.release_stream();
        self.state = MicState::Disconnected;
        tracing::info!("Microphone released");
    }

    fn release_stream(&mut self) {
        if let Some(mut tap) = self.tap.take() {
            tap.release();
        }
        if let Some(stream) = self.stream.take() {
            stream.stop();
            self.sink.notify_stream_available(&AudioSourceId::Mic, None);
        }
    }

    fn write_send(&self, bus: BusName, enabled: bool) {
        if self.store.send_enabled(&AudioSourceId::Mic, bus) == enabled {
            return;
        }
        if let Err(e) = self.store.set_send(
            &SourceTarget::Source(AudioSourceId::Mic),
            bus,
            SendUpdate::enable(enabled),
        ) {
            tracing::warn!("Could not update mic {} send: {}", bus, e);
        }
    }
}

impl Drop for MicController {
    fn drop(&mut self) {
        self.release_stream();
    }
}
