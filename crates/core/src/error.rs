//! Error taxonomy shared by the provider registries and backend adapters.

use thiserror::Error;

/// Errors raised while dispatching to, or talking with, a provider backend.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The requested (or default) provider name is not registered.
    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    /// Dispatch was attempted before a successful initialization.
    #[error("provider not initialized")]
    NotInitialized,

    /// The HTTP request to the backend could not be completed.
    #[error("backend transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status code.
    #[error("backend returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend payload could not be decoded.
    #[error("malformed backend payload: {0}")]
    Malformed(String),

    /// The backend answered successfully but without any candidate.
    #[error("backend returned an empty result")]
    EmptyResult,

    /// The provider is missing something it needs to start (e.g. an API key).
    #[error("invalid provider configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// Result type for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
