use super::state::AppState;
use crate::error::TriggerError;
use crate::gateway::{validate_device_id, TriggerRequest};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TriggerBody {
    /// Optional ASR language override
    pub language: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub session_id: Uuid,
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for TriggerError {
    fn into_response(self) -> Response {
        let status = match &self {
            TriggerError::InvalidDevice(_) => StatusCode::BAD_REQUEST,
            TriggerError::UnknownDevice(_) | TriggerError::UnknownSession(_) => StatusCode::NOT_FOUND,
            TriggerError::AlreadyActive { .. } => StatusCode::CONFLICT,
        };

        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

fn not_found(what: String) -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error: what })).into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /devices/:device_id/trigger
/// Start a pipeline run on the device without a wake word
pub async fn trigger_device(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
    body: Option<Json<TriggerBody>>,
) -> Result<impl IntoResponse, TriggerError> {
    let language = body.and_then(|Json(body)| body.language);
    info!("Trigger requested for device: {}", device_id);

    let accepted = state
        .gateway
        .trigger(TriggerRequest {
            device_id,
            language,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// POST /sessions/:session_id/cancel
pub async fn cancel_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, TriggerError> {
    let requested = state.gateway.cancel(session_id)?;

    Ok((
        StatusCode::OK,
        Json(CancelResponse {
            session_id,
            status: if requested { "cancelling" } else { "finished" }.to_string(),
        }),
    ))
}

/// GET /sessions/:session_id
/// Latest committed snapshot of a session
pub async fn get_session(State(state): State<AppState>, Path(session_id): Path<Uuid>) -> Response {
    match state.gateway.registry().get_result(session_id) {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => not_found(format!("Session {} not found", session_id)),
    }
}

/// GET /devices/:device_id/result
/// Most recent completed result for a device
pub async fn get_device_result(State(state): State<AppState>, Path(device_id): Path<String>) -> Response {
    let device_id = match validate_device_id(&device_id) {
        Ok(device_id) => device_id,
        Err(e) => return e.into_response(),
    };

    match state.board.get(device_id) {
        Some(result) => (StatusCode::OK, Json(result)).into_response(),
        None => not_found(format!("No result for device {}", device_id)),
    }
}

/// GET /devices
pub async fn list_devices(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.devices().await)
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
