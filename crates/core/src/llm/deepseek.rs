//! Deepseek chat-completions backend.
//!
//! Speaks the OpenAI-style chat completions protocol with one extension: the
//! system prompt is sent in a dedicated `system` field and stripped from the
//! role-tagged message list. Streaming responses are server-sent events
//! terminated by a `data: [DONE]` sentinel.

use super::{ChunkStream, GenerationOptions, GenerationProvider, Response, ResponseChunk};
use crate::{
    conversation::{Message, Role},
    error::{ProviderError, Result},
    registry::Provider,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, stream::BoxStream};
use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, VecDeque},
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use tracing::{debug, info};

pub const DEFAULT_ENDPOINT: &str = "https://api.deepseek.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "deepseek-chat";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);
const DEFAULT_TEMPERATURE: f64 = 0.7;
const DEFAULT_MAX_TOKENS: u64 = 2000;
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    finish_reason: Option<String>,
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    created: i64,
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

/// Generation backend for the Deepseek chat completions API.
pub struct DeepseekProvider {
    api_key: String,
    endpoint: String,
    model: String,
    http: reqwest::Client,
    initialized: AtomicBool,
}

impl DeepseekProvider {
    /// Creates a provider for `model`, falling back to `deepseek-chat` when empty.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self> {
        let model = model.into();
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: if model.is_empty() {
                DEFAULT_MODEL.to_string()
            } else {
                model
            },
            http,
            initialized: AtomicBool::new(false),
        })
    }

    /// Overrides the chat completions endpoint.
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

    async fn post(&self, body: &ChatRequest) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(body);
        if body.stream {
            request = request.header(reqwest::header::ACCEPT, "text/event-stream");
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl Provider for DeepseekProvider {
    async fn initialize(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Config(
                "Deepseek API key is required".to_string(),
            ));
        }
        info!(model = %self.model, "Initializing Deepseek provider");
        self.initialized.store(true, Ordering::Release);
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        info!("Cleaning up Deepseek provider");
        self.initialized.store(false, Ordering::Release);
        Ok(())
    }
}

#[async_trait]
impl GenerationProvider for DeepseekProvider {
    async fn generate(&self, history: &[Message], options: &GenerationOptions) -> Result<Response> {
        self.ensure_initialized()?;
        let body = build_request(&self.model, history, options, false);
        debug!(messages = history.len(), "Sending Deepseek chat request");

        let response: ChatResponse = self.post(&body).await?.json().await?;
        into_response(response)
    }

    async fn generate_stream(
        &self,
        history: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChunkStream> {
        self.ensure_initialized()?;
        let body = build_request(&self.model, history, options, true);
        debug!(messages = history.len(), "Sending Deepseek streamed chat request");

        let response = self.post(&body).await?;
        Ok(sse_chunks(response.bytes_stream().boxed()))
    }
}

/// Builds the wire request: defaults first, then caller options, then the
/// system prompt moved out of the message list.
fn build_request(
    model: &str,
    history: &[Message],
    options: &GenerationOptions,
    stream: bool,
) -> ChatRequest {
    let float = |key: &str| options.get(key).and_then(serde_json::Value::as_f64);

    let system = options
        .get("system")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .or_else(|| {
            history
                .iter()
                .find(|m| m.role == Role::System)
                .map(|m| m.content.clone())
        });

    let messages = history
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| WireMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        })
        .collect();

    ChatRequest {
        model: model.to_string(),
        messages,
        stream,
        temperature: Some(float("temperature").unwrap_or(DEFAULT_TEMPERATURE)),
        max_tokens: Some(
            options
                .get("max_tokens")
                .and_then(serde_json::Value::as_u64)
                .unwrap_or(DEFAULT_MAX_TOKENS),
        ),
        top_p: float("top_p"),
        frequency_penalty: float("frequency_penalty"),
        presence_penalty: float("presence_penalty"),
        system,
    }
}

fn into_response(response: ChatResponse) -> Result<Response> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyResult)?;

    let mut metadata = HashMap::new();
    metadata.insert("model".to_string(), serde_json::json!(response.model));
    metadata.insert("id".to_string(), serde_json::json!(response.id));
    metadata.insert("created".to_string(), serde_json::json!(response.created));
    if let Some(usage) = response.usage {
        metadata.insert("usage".to_string(), serde_json::to_value(usage)?);
    }

    Ok(Response {
        content: choice.message.content,
        finish_reason: choice.finish_reason.unwrap_or_default(),
        metadata,
    })
}

/// Incremental SSE decoder state.
struct SseState {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    buffer: Vec<u8>,
    pending: VecDeque<ResponseChunk>,
    finished: bool,
}

impl SseState {
    /// Consumes every complete line in the buffer.
    fn drain_lines(&mut self) -> Result<()> {
        while !self.finished {
            let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.handle_line(&String::from_utf8_lossy(&line))?;
        }
        Ok(())
    }

    fn handle_line(&mut self, line: &str) -> Result<()> {
        let line = line.trim();
        if line.is_empty() || line.starts_with(':') {
            return Ok(());
        }
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(());
        };
        let data = data.trim_start();

        if data == DONE_SENTINEL {
            self.pending.push_back(ResponseChunk::terminal("", "stop"));
            self.finished = true;
            return Ok(());
        }

        let event: StreamResponse = serde_json::from_str(data)?;
        let Some(choice) = event.choices.into_iter().next() else {
            return Ok(());
        };
        let content = choice.delta.content.unwrap_or_default();
        match choice.finish_reason.filter(|r| !r.is_empty()) {
            Some(reason) => {
                self.pending.push_back(ResponseChunk::terminal(content, reason));
                self.finished = true;
            }
            None => self.pending.push_back(ResponseChunk::delta(content)),
        }
        Ok(())
    }
}

/// Turns a raw SSE body into a chunk stream that ends after the terminal chunk.
fn sse_chunks(body: BoxStream<'static, reqwest::Result<Bytes>>) -> ChunkStream {
    let state = SseState {
        body,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures::stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Ok::<_, ProviderError>(Some((chunk, state)));
            }
            if state.finished {
                return Ok(None);
            }
            match state.body.next().await {
                Some(bytes) => {
                    state.buffer.extend_from_slice(&bytes?);
                    state.drain_lines()?;
                }
                None => {
                    // A final line may lack its trailing newline.
                    let rest = std::mem::take(&mut state.buffer);
                    state.handle_line(&String::from_utf8_lossy(&rest))?;
                    state.finished = true;
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn body(parts: &[&'static [u8]]) -> BoxStream<'static, reqwest::Result<Bytes>> {
        stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p)))
                .collect::<Vec<_>>(),
        )
        .boxed()
    }

    async fn collect(body: BoxStream<'static, reqwest::Result<Bytes>>) -> Vec<ResponseChunk> {
        sse_chunks(body).map(|c| c.unwrap()).collect().await
    }

    #[test]
    fn test_build_request_extracts_system_prompt() {
        let history = vec![
            Message::system("be brief"),
            Message::user("hi"),
            Message::assistant("hello"),
            Message::user("again"),
        ];
        let request = build_request("deepseek-chat", &history, &GenerationOptions::new(), false);

        assert_eq!(request.system.as_deref(), Some("be brief"));
        assert_eq!(request.messages.len(), 3);
        assert!(request.messages.iter().all(|m| m.role != "system"));
        assert_eq!(request.temperature, Some(DEFAULT_TEMPERATURE));
        assert_eq!(request.max_tokens, Some(DEFAULT_MAX_TOKENS));
        assert_eq!(request.top_p, None);
    }

    #[test]
    fn test_build_request_applies_options() {
        let mut options = GenerationOptions::new();
        options.insert("temperature".into(), serde_json::json!(0.2));
        options.insert("max_tokens".into(), serde_json::json!(128));
        options.insert("top_p".into(), serde_json::json!(0.9));
        options.insert("presence_penalty".into(), serde_json::json!(0.5));
        options.insert("system".into(), serde_json::json!("override"));

        let history = vec![Message::system("original"), Message::user("hi")];
        let request = build_request("m", &history, &options, true);

        assert!(request.stream);
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(128));
        assert_eq!(request.top_p, Some(0.9));
        assert_eq!(request.presence_penalty, Some(0.5));
        assert_eq!(request.frequency_penalty, None);
        assert_eq!(request.system.as_deref(), Some("override"));
        assert_eq!(request.messages.len(), 1);

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("frequency_penalty").is_none());
    }

    #[test]
    fn test_empty_choices_is_an_error() {
        let response: ChatResponse =
            serde_json::from_str(r#"{"id":"x","created":1,"model":"m","choices":[]}"#).unwrap();
        assert!(matches!(
            into_response(response),
            Err(ProviderError::EmptyResult)
        ));
    }

    #[test]
    fn test_response_metadata() {
        let response: ChatResponse = serde_json::from_str(
            r#"{"id":"abc","created":7,"model":"deepseek-chat",
                "choices":[{"index":0,"finish_reason":"stop","message":{"role":"assistant","content":"hi"}}],
                "usage":{"prompt_tokens":3,"completion_tokens":1,"total_tokens":4}}"#,
        )
        .unwrap();
        let response = into_response(response).unwrap();
        assert_eq!(response.content, "hi");
        assert_eq!(response.finish_reason, "stop");
        assert_eq!(response.metadata["id"], "abc");
        assert_eq!(response.metadata["usage"]["total_tokens"], 4);
    }

    #[tokio::test]
    async fn test_sse_done_sentinel_is_terminal() {
        let chunks = collect(body(&[
            b": keep-alive\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            b"data: [DONE]\n\n",
            b"data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        ]))
        .await;

        assert_eq!(
            chunks,
            vec![
                ResponseChunk::delta("Hel"),
                ResponseChunk::delta("lo"),
                ResponseChunk::terminal("", "stop"),
            ]
        );
    }

    #[tokio::test]
    async fn test_sse_finish_reason_ends_stream() {
        let chunks = collect(body(&[
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            b"data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"length\"}]}\n",
            b"data: [DONE]\n",
        ]))
        .await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1], ResponseChunk::terminal("", "length"));
    }

    #[tokio::test]
    async fn test_sse_reassembles_split_utf8() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"你好\"}}]}\n".as_bytes();
        let (head, tail) = line.split_at(line.len() - 8);
        let head: &'static [u8] = Box::leak(head.to_vec().into_boxed_slice());
        let tail: &'static [u8] = Box::leak(tail.to_vec().into_boxed_slice());

        let chunks = collect(body(&[head, tail, b"data: [DONE]"])).await;
        assert_eq!(chunks[0], ResponseChunk::delta("你好"));
        assert!(chunks[1].is_final);
    }

    #[tokio::test]
    async fn test_sse_malformed_event_is_an_error() {
        let mut stream = sse_chunks(body(&[b"data: {not json}\n"]));
        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(ProviderError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_requests_fail_before_initialize() {
        let provider = DeepseekProvider::new("", "").unwrap();
        assert!(matches!(
            provider.initialize().await,
            Err(ProviderError::Config(_))
        ));
        let err = provider
            .generate(&[Message::user("hi")], &GenerationOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NotInitialized));
    }
}
