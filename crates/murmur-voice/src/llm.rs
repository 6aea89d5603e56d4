//! Streaming chat completions from an OpenAI-compatible backend.
//!
//! [`ResponseSource`] is the upstream boundary of the gate: it resolves once
//! to a stream of [`ResponseFragment`]s, or to `None` when the backend has
//! nothing to say. [`ChatCompletionsClient`] implements it against
//! `POST {base_url}/chat/completions` with server-sent events.

use crate::config::LlmConfig;
use crate::error::VoiceError;
use futures_util::future::BoxFuture;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use murmur_types::{
    ChatChunk, ChatContext, ChoiceDelta, CompletionUsage, ResponseFragment, StreamMarker,
    ToolCallDelta, ToolSpec,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::debug;

/// Connect timeout for the backend. The response stream itself is unbounded.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A live stream of response fragments.
pub type FragmentStream = BoxStream<'static, Result<ResponseFragment, VoiceError>>;

/// Produces the raw model response for one turn.
pub trait ResponseSource: Send + Sync {
    fn respond<'a>(
        &'a self,
        chat_ctx: &'a ChatContext,
        tools: &'a [ToolSpec],
    ) -> BoxFuture<'a, Result<Option<FragmentStream>, VoiceError>>;
}

#[derive(Debug, Clone)]
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl ChatCompletionsClient {
    pub fn new(config: LlmConfig) -> Result<Self, VoiceError> {
        if config.api_key.trim().is_empty() {
            return Err(VoiceError::Config("LLM api_key is required".to_string()));
        }
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        Ok(Self { http, config })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    async fn stream_completion(
        &self,
        chat_ctx: &ChatContext,
        tools: &[ToolSpec],
    ) -> Result<Option<FragmentStream>, VoiceError> {
        let body = request_body(&self.config.model, chat_ctx, tools);
        debug!(
            model = %self.config.model,
            messages = chat_ctx.len(),
            tools = tools.len(),
            "requesting chat completion stream"
        );

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Llm(format!(
                "backend returned {}: {}",
                status,
                detail.trim()
            )));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(VoiceError::from));
        Ok(Some(sse_fragments(body)))
    }
}

impl ResponseSource for ChatCompletionsClient {
    fn respond<'a>(
        &'a self,
        chat_ctx: &'a ChatContext,
        tools: &'a [ToolSpec],
    ) -> BoxFuture<'a, Result<Option<FragmentStream>, VoiceError>> {
        Box::pin(self.stream_completion(chat_ctx, tools))
    }
}

/// Builds the JSON request for a streamed completion.
pub fn request_body(model: &str, chat_ctx: &ChatContext, tools: &[ToolSpec]) -> Value {
    let mut body = json!({
        "model": model,
        "messages": chat_ctx.messages,
        "stream": true,
        "stream_options": { "include_usage": true },
    });
    if !tools.is_empty() {
        body["tools"] = tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect();
    }
    body
}

/// Splits a byte stream into `data:` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feeds bytes and returns the payloads of every line completed so far.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(payload) = data_payload(&line) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Returns the payload of a trailing line with no newline.
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    line.strip_prefix("data:")
        .map(|data| data.trim_start().to_string())
        .filter(|data| !data.is_empty())
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: Option<WireDelta>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunction>,
}

#[derive(Debug, Deserialize)]
struct WireFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Converts one SSE payload into fragments.
///
/// Keep-alive payloads with neither choices nor usage produce nothing.
pub fn parse_payload(payload: &str) -> Result<Vec<ResponseFragment>, VoiceError> {
    let chunk: WireChunk = serde_json::from_str(payload)
        .map_err(|e| VoiceError::Llm(format!("malformed stream payload: {}", e)))?;

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(VoiceError::Llm(message));
    }

    let mut fragments = Vec::new();
    if let Some(choice) = chunk.choices.into_iter().next() {
        let delta = choice.delta.map(|delta| ChoiceDelta {
            role: delta.role,
            content: delta.content,
            tool_calls: delta
                .tool_calls
                .into_iter()
                .map(|call| {
                    let (name, arguments) = match call.function {
                        Some(function) => (function.name, function.arguments.unwrap_or_default()),
                        None => (None, String::new()),
                    };
                    ToolCallDelta {
                        index: call.index,
                        call_id: call.id,
                        name,
                        arguments,
                    }
                })
                .collect(),
        });
        fragments.push(ResponseFragment::Chunk(ChatChunk {
            id: chunk.id,
            delta,
        }));
    }
    if let Some(usage) = chunk.usage {
        fragments.push(ResponseFragment::Marker(StreamMarker::Usage(usage)));
    }
    Ok(fragments)
}

struct SseState<S> {
    body: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<ResponseFragment, VoiceError>>,
    finished: bool,
}

impl<S> SseState<S> {
    /// Queues the fragments of one payload. Returns false once the stream
    /// is over, either by `[DONE]` or by an error.
    fn accept(&mut self, payload: &str) -> bool {
        if payload == "[DONE]" {
            self.finished = true;
            return false;
        }
        match parse_payload(payload) {
            Ok(fragments) => {
                self.pending.extend(fragments.into_iter().map(Ok));
                true
            }
            Err(e) => {
                self.pending.push_back(Err(e));
                self.finished = true;
                false
            }
        }
    }
}

/// Decodes a server-sent-event body into response fragments.
pub fn sse_fragments<S, B>(body: S) -> FragmentStream
where
    S: Stream<Item = Result<B, VoiceError>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        body: Box::pin(body),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(bytes)) => {
                    for payload in state.decoder.push(bytes.as_ref()) {
                        if !state.accept(&payload) {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    state.pending.push_back(Err(e));
                    state.finished = true;
                }
                None => {
                    if let Some(payload) = state.decoder.finish() {
                        state.accept(&payload);
                    }
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}
