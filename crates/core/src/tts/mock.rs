//! Synthesis backend that produces noise instead of speech.

use super::{SynthesisOptions, SynthesisProvider, Voice};
use crate::{
    error::{ProviderError, Result},
    registry::Provider,
};
use async_trait::async_trait;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};

/// Bytes of fake audio per byte of input text.
const BYTES_PER_TEXT_BYTE: usize = 100;

#[derive(Default)]
pub struct MockSynthesisProvider {
    initialized: AtomicBool,
}

impl MockSynthesisProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ProviderError::NotInitialized)
        }
    }
}

#[async_trait]
impl Provider for MockSynthesisProvider {
    async fn initialize(&self) -> Result<()> {
        info!("Initializing mock synthesis provider");
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        info!("Cleaning up mock synthesis provider");
        self.initialized.store(false, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl SynthesisProvider for MockSynthesisProvider {
    async fn synthesize(&self, text: &str, options: &SynthesisOptions) -> Result<Vec<u8>> {
        self.ensure_initialized()?;
        debug!(chars = text.chars().count(), ?options, "Mock synthesis request");

        let mut audio = vec![0u8; text.len() * BYTES_PER_TEXT_BYTE];
        rand::rng().fill(&mut audio[..]);
        Ok(audio)
    }

    async fn voices(&self) -> Result<Vec<Voice>> {
        self.ensure_initialized()?;
        Ok(vec![
            Voice::neural("mock-female-1", "小美", "female", "young"),
            Voice::neural("mock-male-1", "小刚", "male", "adult"),
        ])
    }
}
