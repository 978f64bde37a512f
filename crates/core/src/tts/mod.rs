//! Speech synthesis providers and the registry dispatch used by sessions.

pub mod doubao;
pub mod mock;

use crate::{
    error::Result,
    registry::{Provider, ProviderRegistry},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

pub use doubao::DoubaoProvider;
pub use mock::MockSynthesisProvider;

/// Synthesis options. Recognized keys are `voice_id`, `format` and `speed`.
pub type SynthesisOptions = HashMap<String, String>;

/// A voice offered by a synthesis backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub gender: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl Voice {
    pub(crate) fn neural(id: &str, name: &str, gender: &str, age: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            gender: gender.to_string(),
            language: "zh-CN".to_string(),
            tags: BTreeMap::from([
                ("type".to_string(), "neural".to_string()),
                ("age".to_string(), age.to_string()),
            ]),
        }
    }
}

/// A text-to-speech backend.
#[async_trait]
pub trait SynthesisProvider: Provider {
    /// Renders `text` into encoded audio bytes.
    async fn synthesize(&self, text: &str, options: &SynthesisOptions) -> Result<Vec<u8>>;

    /// Lists the voices this backend can render.
    async fn voices(&self) -> Result<Vec<Voice>>;
}

/// Registry of synthesis backends.
pub type TtsManager = ProviderRegistry<dyn SynthesisProvider>;

impl ProviderRegistry<dyn SynthesisProvider> {
    /// Synthesizes with the default provider.
    pub async fn synthesize(&self, text: &str, options: &SynthesisOptions) -> Result<Vec<u8>> {
        let (name, provider) = self.default_provider().await?;
        debug!(provider = %name, chars = text.chars().count(), "Dispatching synthesis");
        provider.synthesize(text, options).await
    }

    /// Voice catalogue of the named provider, or of the default one.
    pub async fn voices(&self, name: Option<&str>) -> Result<Vec<Voice>> {
        let provider = match name {
            Some(name) => self.get(name).await?,
            None => self.default_provider().await?.1,
        };
        provider.voices().await
    }
}
