//! Main Entrypoint for the Voice Gateway Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Registering and initializing the generation and synthesis backends.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use voicegate_api::{config::Config, router::create_router, state::AppState};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing providers...");

    // --- 3. Initialize Providers ---
    let app_state = Arc::new(AppState::from_config(config.clone()).await?);
    // A backend that fails to start leaves its registry not ready; rounds
    // then answer with the fallback text and the server keeps running.
    if let Err(e) = app_state.llm.initialize_all().await {
        warn!(error = %e, "Generation providers failed to initialize");
    }
    if let Err(e) = app_state.tts.initialize_all().await {
        warn!(error = %e, "Synthesis providers failed to initialize");
    }

    // --- 4. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state.clone()).layer(cors);

    // --- 5. Start Server ---
    info!(
        llm = ?config.llm_backend,
        tts = ?config.tts_backend,
        mode = ?config.session.generation_mode,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    app_state.llm.cleanup_all().await;
    app_state.tts.cleanup_all().await;
    info!("Server has shut down.");
    Ok(())
}
