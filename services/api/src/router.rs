//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, the device WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{BroadcastPayload, BroadcastResult, ErrorResponse, StatusInfo, VoiceInfo},
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::status,
        handlers::list_voices,
        handlers::broadcast,
    ),
    components(
        schemas(StatusInfo, VoiceInfo, BroadcastPayload, BroadcastResult, ErrorResponse)
    ),
    tags(
        (name = "Voice Gateway", description = "Status and control endpoints of the device voice gateway")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .route("/xiaozhi/v1", get(ws_handler))
        .route("/xiaozhi/v1/", get(ws_handler))
        .route("/health", get(handlers::health))
        .route("/status", get(handlers::status))
        .route("/api/tts/voices", get(handlers::list_voices))
        .route("/api/broadcast", post(handlers::broadcast))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
