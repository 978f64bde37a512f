//! Generation Providers
//!
//! The contract a language-generation backend must satisfy, plus the registry
//! dispatch used by sessions. Streaming output is modelled as a lazy, finite
//! stream of [`ResponseChunk`]s; the consumer stops the producer by dropping
//! the stream.

pub mod deepseek;
pub mod mock;

use crate::{
    conversation::Message,
    error::Result,
    registry::{Provider, ProviderRegistry},
};
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, pin::Pin};
use tracing::debug;

pub use deepseek::DeepseekProvider;
pub use mock::MockGenerationProvider;

/// Open key-value generation options (temperature, max_tokens, top_p,
/// frequency_penalty, presence_penalty, system). Unset keys fall back to the
/// provider defaults.
pub type GenerationOptions = HashMap<String, serde_json::Value>;

/// A complete, non-streamed generation result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Response {
    pub content: String,
    pub finish_reason: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// One incremental fragment of generated text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseChunk {
    pub content: String,
    pub is_final: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

impl ResponseChunk {
    pub fn delta(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_final: false,
            finish_reason: None,
        }
    }

    pub fn terminal(content: impl Into<String>, finish_reason: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_final: true,
            finish_reason: Some(finish_reason.into()),
        }
    }
}

/// A stream of chunks for a single generation request, in emission order.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<ResponseChunk>> + Send>>;

/// A language-generation backend.
#[async_trait]
pub trait GenerationProvider: Provider {
    /// Returns once the full response is available.
    async fn generate(&self, history: &[Message], options: &GenerationOptions) -> Result<Response>;

    /// Starts a streamed generation. The returned stream ends after the chunk
    /// flagged `is_final`.
    async fn generate_stream(
        &self,
        history: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChunkStream>;
}

/// Registry of generation backends.
pub type LlmManager = ProviderRegistry<dyn GenerationProvider>;

impl ProviderRegistry<dyn GenerationProvider> {
    /// Runs a batch generation on the default provider.
    pub async fn generate(
        &self,
        history: &[Message],
        options: &GenerationOptions,
    ) -> Result<Response> {
        let (name, provider) = self.default_provider().await?;
        debug!(provider = %name, messages = history.len(), "Dispatching generation");
        provider.generate(history, options).await
    }

    /// Starts a streamed generation on the default provider.
    pub async fn generate_stream(
        &self,
        history: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChunkStream> {
        let (name, provider) = self.default_provider().await?;
        debug!(provider = %name, messages = history.len(), "Dispatching streamed generation");
        provider.generate_stream(history, options).await
    }
}

/// Returns the content of the most recent user message, if any.
pub(crate) fn last_user_message(history: &[Message]) -> Option<&str> {
    history
        .iter()
        .rev()
        .find(|m| m.role == crate::conversation::Role::User)
        .map(|m| m.content.as_str())
}
