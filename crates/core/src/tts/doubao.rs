//! Doubao text-to-speech backend.

use super::{SynthesisOptions, SynthesisProvider, Voice};
use crate::{
    error::{ProviderError, Result},
    registry::Provider,
};
use async_trait::async_trait;
use serde::Serialize;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tracing::{debug, info};

pub const DEFAULT_ENDPOINT: &str = "https://api.doubao.com/v1/audio/tts/generation";
pub const DEFAULT_VOICE: &str = "zh_female_qingxin";
const MODEL: &str = "doubao-tts-v1";
const DEFAULT_FORMAT: &str = "mp3";
const DEFAULT_SPEED: f64 = 1.0;
const TEMPERATURE: f64 = 0.3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Serialize, PartialEq)]
struct SynthesisRequest<'a> {
    model: &'static str,
    input: &'a str,
    voice: &'a str,
    format: &'a str,
    speed: f64,
    temperature: f64,
}

impl<'a> SynthesisRequest<'a> {
    fn new(text: &'a str, options: &'a SynthesisOptions) -> Self {
        let option = move |key: &str| {
            options
                .get(key)
                .map(String::as_str)
                .filter(|v| !v.is_empty())
        };
        Self {
            model: MODEL,
            input: text,
            voice: option("voice_id").unwrap_or(DEFAULT_VOICE),
            format: option("format").unwrap_or(DEFAULT_FORMAT),
            speed: option("speed")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(DEFAULT_SPEED),
            temperature: TEMPERATURE,
        }
    }
}

pub struct DoubaoProvider {
    api_key: String,
    endpoint: String,
    http: reqwest::Client,
    initialized: AtomicBool,
}

impl DoubaoProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http,
            initialized: AtomicBool::new(false),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
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
impl Provider for DoubaoProvider {
    async fn initialize(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Config(
                "Doubao TTS API key is required".to_string(),
            ));
        }
        info!("Initializing Doubao synthesis provider");
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        info!("Cleaning up Doubao synthesis provider");
        self.initialized.store(false, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl SynthesisProvider for DoubaoProvider {
    async fn synthesize(&self, text: &str, options: &SynthesisOptions) -> Result<Vec<u8>> {
        self.ensure_initialized()?;
        let body = SynthesisRequest::new(text, options);
        debug!(voice = body.voice, format = body.format, "Sending Doubao synthesis request");

        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .header(reqwest::header::ACCEPT, "application/octet-stream")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response.bytes().await?.to_vec();
        info!(bytes = audio.len(), "Doubao synthesis complete");
        Ok(audio)
    }

    async fn voices(&self) -> Result<Vec<Voice>> {
        self.ensure_initialized()?;
        Ok(vec![
            Voice::neural("zh_female_qingxin", "清新女声", "female", "young"),
            Voice::neural("zh_male_wenzhong", "稳重男声", "male", "adult"),
            Voice::neural("zh_female_wenzhong", "稳重女声", "female", "adult"),
        ])
    }
}
