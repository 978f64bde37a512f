//! Axum Handlers for the REST API
//!
//! Health, status, voice catalogue and broadcast endpoints. Each handler is
//! annotated with `utoipa` so the OpenAPI document stays in sync.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;
use voicegate_core::ProviderError;

use crate::{
    models::{BroadcastPayload, BroadcastResult, ErrorResponse, StatusInfo, VoiceInfo},
    state::AppState,
};

pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    ServiceUnavailable(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::ServiceUnavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse { message }),
            )
                .into_response(),
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::ProviderNotFound(_) => Self::NotFound(err.to_string()),
            ProviderError::NotInitialized => Self::ServiceUnavailable(err.to_string()),
            other => Self::InternalServerError(other.into()),
        }
    }
}

/// Formats an uptime as hours, minutes and seconds.
fn format_uptime(elapsed: chrono::TimeDelta) -> String {
    let secs = elapsed.num_seconds().max(0);
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = String))
)]
pub async fn health() -> &'static str {
    "OK"
}

/// Report connection count, uptime and the active backends.
#[utoipa::path(
    get,
    path = "/status",
    responses((status = 200, description = "Service status", body = StatusInfo))
)]
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusInfo> {
    Json(StatusInfo {
        status: "running".to_string(),
        active_connections: state.connections.count().await,
        server_start_time: state.started_at,
        uptime: format_uptime(Utc::now() - state.started_at),
        version: env!("CARGO_PKG_VERSION").to_string(),
        llm_provider: state.llm.default_name().await,
        tts_provider: state.tts.default_name().await,
        llm_providers: state.llm.names().await,
        tts_providers: state.tts.names().await,
    })
}

/// List the voices of the default synthesis provider.
#[utoipa::path(
    get,
    path = "/api/tts/voices",
    responses(
        (status = 200, description = "Available voices", body = [VoiceInfo]),
        (status = 404, description = "No synthesis provider configured", body = ErrorResponse),
        (status = 503, description = "Synthesis providers not initialized", body = ErrorResponse)
    )
)]
pub async fn list_voices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<VoiceInfo>>, ApiError> {
    let voices = state.tts.voices(None).await?;
    Ok(Json(voices.into_iter().map(VoiceInfo::from).collect()))
}

/// Send a text frame to every connected device.
#[utoipa::path(
    post,
    path = "/api/broadcast",
    request_body = BroadcastPayload,
    responses(
        (status = 200, description = "Broadcast sent", body = BroadcastResult),
        (status = 400, description = "Empty text", body = ErrorResponse)
    )
)]
pub async fn broadcast(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BroadcastPayload>,
) -> Result<Json<BroadcastResult>, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }
    let delivered = state.connections.broadcast_text(&payload.text).await;
    Ok(Json(BroadcastResult { delivered }))
}
