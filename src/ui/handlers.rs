//! HTTP API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::error::{Error, MixerError, SignalingError};
use crate::mixer::{AudioSourceId, BusName, MixerConfig, SendUpdate, SourceTarget};
use crate::peer::SessionSummary;
use crate::protocol::{AudioDeviceInfo, PeerId};
use crate::studio::{PendingRequest, StudioCommand, StudioStatus};
use crate::ui::server::AppState;

/// API response wrapper
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type ApiResult = (StatusCode, Json<ApiResponse<()>>);

fn status_for(error: &Error) -> StatusCode {
    match error {
        Error::Mixer(MixerError::UnknownSource(_)) => StatusCode::NOT_FOUND,
        Error::Mixer(MixerError::AdmissionControlled(_)) => StatusCode::CONFLICT,
        Error::Signaling(SignalingError::NotConnected) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

async fn dispatch(state: &AppState, command: StudioCommand) -> ApiResult {
    match state.studio.send(command).await {
        Ok(()) => (StatusCode::OK, Json(ApiResponse::ok(()))),
        Err(e) => (status_for(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

fn bad_request(msg: impl Into<String>) -> ApiResult {
    (StatusCode::BAD_REQUEST, Json(ApiResponse::error(msg)))
}

/// Get studio status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<StudioStatus>> {
    Json(ApiResponse::ok(state.studio.status()))
}

/// Get the current mixer config
pub async fn get_mixer(State(state): State<Arc<AppState>>) -> Json<ApiResponse<MixerConfig>> {
    let snapshot = state.studio.store().snapshot();
    Json(ApiResponse::ok(MixerConfig::clone(&snapshot)))
}

pub async fn get_sessions(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<SessionSummary>>> {
    Json(ApiResponse::ok(state.studio.status().sessions))
}

/// Presenters waiting to go on air
pub async fn get_requests(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<PendingRequest>>> {
    Json(ApiResponse::ok(state.studio.status().requests))
}

/// Get available audio inputs
pub async fn get_devices(State(state): State<Arc<AppState>>) -> Json<ApiResponse<Vec<AudioDeviceInfo>>> {
    Json(ApiResponse::ok(state.provider.enumerate_inputs().await))
}

#[derive(serde::Deserialize)]
pub struct GainRequest {
    pub gain: f32,
}

/// Set channel gain; `remotes` addresses every remote strip
pub async fn set_gain(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<GainRequest>,
) -> ApiResult {
    let target = match id.parse::<SourceTarget>() {
        Ok(target) => target,
        Err(e) => return bad_request(e),
    };
    dispatch(&state, StudioCommand::SetChannelGain { target, gain: req.gain }).await
}

pub async fn toggle_mute(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let target = match id.parse::<SourceTarget>() {
        Ok(target) => target,
        Err(e) => return bad_request(e),
    };
    dispatch(&state, StudioCommand::ToggleMute { target }).await
}

pub async fn toggle_pfl(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let target = match id.parse::<SourceTarget>() {
        Ok(target) => target,
        Err(e) => return bad_request(e),
    };
    dispatch(&state, StudioCommand::TogglePfl { target }).await
}

/// Partial update of one bus send
pub async fn set_send(
    State(state): State<Arc<AppState>>,
    Path((id, bus)): Path<(String, String)>,
    Json(update): Json<SendUpdate>,
) -> ApiResult {
    let target = match id.parse::<SourceTarget>() {
        Ok(target) => target,
        Err(e) => return bad_request(e),
    };
    let bus = match bus.parse::<BusName>() {
        Ok(bus) => bus,
        Err(e) => return bad_request(e),
    };
    dispatch(&state, StudioCommand::SetSend { target, bus, update }).await
}

#[derive(serde::Deserialize)]
pub struct OnAirRequest {
    pub on_air: bool,
}

/// Put a presenter on or off air
pub async fn set_on_air(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<OnAirRequest>,
) -> ApiResult {
    let command = StudioCommand::SetPresenterOnAir {
        peer: PeerId::new(id),
        on_air: req.on_air,
    };
    dispatch(&state, command).await
}

/// Delete a remote channel strip
pub async fn delete_source(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    match id.parse::<AudioSourceId>() {
        Ok(AudioSourceId::Remote(peer)) => dispatch(&state, StudioCommand::RemoveSource { peer }).await,
        Ok(AudioSourceId::Mic) => bad_request("the local mic strip cannot be removed"),
        Err(e) => bad_request(e),
    }
}

/// Terminate the session with a presenter
pub async fn close_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    dispatch(&state, StudioCommand::CloseSession { peer: PeerId::new(id) }).await
}
