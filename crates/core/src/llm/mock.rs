//! A deterministic generation backend for development and integration testing.

use super::{
    ChunkStream, GenerationOptions, GenerationProvider, Response, ResponseChunk, last_user_message,
};
use crate::{
    conversation::Message,
    error::{ProviderError, Result},
    registry::Provider,
};
use async_trait::async_trait;
use futures::{StreamExt, stream};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tracing::{debug, info};

/// Characters per streamed chunk.
const CHUNK_CHARS: usize = 10;
/// Simulated network gap between streamed chunks.
const CHUNK_DELAY: Duration = Duration::from_millis(100);

/// Answers with canned replies picked by keywords in the last user message.
pub struct MockGenerationProvider {
    name: String,
    initialized: AtomicBool,
}

impl MockGenerationProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            initialized: AtomicBool::new(false),
        }
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
impl Provider for MockGenerationProvider {
    async fn initialize(&self) -> Result<()> {
        info!(model = %self.name, "Initializing mock generation provider");
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        self.initialized.store(false, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl GenerationProvider for MockGenerationProvider {
    async fn generate(&self, history: &[Message], _options: &GenerationOptions) -> Result<Response> {
        self.ensure_initialized()?;
        debug!(messages = history.len(), "Mock generation request");

        let content = canned_reply(last_user_message(history).unwrap_or_default());
        let mut metadata = HashMap::new();
        metadata.insert("model".to_string(), serde_json::json!(self.name));
        metadata.insert(
            "response_time".to_string(),
            serde_json::json!(chrono::Utc::now().timestamp()),
        );

        Ok(Response {
            content,
            finish_reason: "stop".to_string(),
            metadata,
        })
    }

    async fn generate_stream(
        &self,
        history: &[Message],
        _options: &GenerationOptions,
    ) -> Result<ChunkStream> {
        self.ensure_initialized()?;
        debug!(messages = history.len(), "Mock streamed generation request");

        let content = canned_reply(last_user_message(history).unwrap_or_default());
        let chunks = split_into_chunks(&content, CHUNK_CHARS);

        Ok(Box::pin(stream::iter(chunks.into_iter().enumerate()).then(
            |(i, chunk)| async move {
                if i > 0 {
                    tokio::time::sleep(CHUNK_DELAY).await;
                }
                Ok(chunk)
            },
        )))
    }
}

/// Splits `text` into chunks of at most `size` characters, the last of which
/// is terminal. Empty input yields a single empty terminal chunk.
fn split_into_chunks(text: &str, size: usize) -> Vec<ResponseChunk> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return vec![ResponseChunk::terminal("", "stop")];
    }

    let count = chars.len().div_ceil(size);
    chars
        .chunks(size)
        .enumerate()
        .map(|(i, piece)| {
            let piece: String = piece.iter().collect();
            if i + 1 == count {
                ResponseChunk::terminal(piece, "stop")
            } else {
                ResponseChunk::delta(piece)
            }
        })
        .collect()
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn canned_reply(user_message: &str) -> String {
    let message = user_message.to_lowercase();
    let has = |needles: &[&str]| contains_any(&message, needles);

    if has(&["你好", "hello", "hi"][..]) {
        "Hello! I'm a simulated voice assistant. I can answer questions, share information or just chat. What can I do for you?".to_string()
    } else if has(&["你是谁", "你的名字", "who are you", "your name"][..]) {
        "I'm a simulated voice assistant used to test the voice interaction pipeline, not a real AI model.".to_string()
    } else if has(&["时间", "几点", "time"][..]) {
        format!(
            "It is {} right now. This is a simulated answer and may not be accurate.",
            chrono::Local::now().format("%H:%M:%S")
        )
    } else if has(&["日期", "今天", "date", "today"][..]) {
        format!(
            "Today is {}. This is a simulated answer for testing only.",
            chrono::Local::now().format("%Y-%m-%d")
        )
    } else if has(&["天气", "weather"][..]) {
        "It's sunny and around 25°C today. This is a simulated weather report, not real data.".to_string()
    } else {
        "This is a simulated response for testing the voice pipeline. Your message was received, but only canned answers are available.".to_string()
    }
}
