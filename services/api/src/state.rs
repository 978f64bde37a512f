//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds the provider
//! registries, the live connection table and the loaded configuration.

use crate::{
    config::{Config, LlmBackend, TtsBackend},
    ws::registry::ConnectionRegistry,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use voicegate_core::{
    LlmManager, TtsManager,
    llm::{DeepseekProvider, MockGenerationProvider},
    tts::{DoubaoProvider, MockSynthesisProvider},
};

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub llm: Arc<LlmManager>,
    pub tts: Arc<TtsManager>,
    pub connections: Arc<ConnectionRegistry>,
    pub config: Arc<Config>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Assembles the state around already-populated registries.
    pub fn new(config: Config, llm: LlmManager, tts: TtsManager) -> Self {
        Self {
            llm: Arc::new(llm),
            tts: Arc::new(tts),
            connections: Arc::new(ConnectionRegistry::new()),
            config: Arc::new(config),
            started_at: Utc::now(),
        }
    }

    /// Registers the backends selected by `config`. Providers are not
    /// initialized here.
    pub async fn from_config(config: Config) -> anyhow::Result<Self> {
        let llm = LlmManager::new("llm");
        match config.llm_backend {
            LlmBackend::Mock => {
                llm.register("mock", Arc::new(MockGenerationProvider::new("mock-llm")))
                    .await;
            }
            LlmBackend::Deepseek => {
                let provider = DeepseekProvider::new(
                    config.deepseek_api_key.clone().unwrap_or_default(),
                    config.deepseek_model.clone(),
                )
                .context("Failed to build Deepseek client")?
                .with_endpoint(config.deepseek_api_url.clone());
                llm.register("deepseek", Arc::new(provider)).await;
            }
        }

        let tts = TtsManager::new("tts");
        match config.tts_backend {
            TtsBackend::Mock => {
                tts.register("mock", Arc::new(MockSynthesisProvider::new()))
                    .await;
            }
            TtsBackend::Doubao => {
                let provider = DoubaoProvider::new(config.doubao_api_key.clone().unwrap_or_default())
                    .context("Failed to build Doubao client")?
                    .with_endpoint(config.doubao_api_url.clone());
                tts.register("doubao", Arc::new(provider)).await;
            }
            TtsBackend::None => info!("Speech synthesis disabled"),
        }

        Ok(Self::new(config, llm, tts))
    }
}
