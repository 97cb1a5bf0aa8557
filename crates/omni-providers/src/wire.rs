//! OpenAI chat-completions wire format, shared by the OpenAI adapter and the
//! OpenAI-compatible local servers.

use std::collections::HashMap;

use omni_core::types::{
    GenerationConfig, LlmResponse, ToolCall, ToolChoice, ToolDefinition, Usage,
    DEFAULT_PENALTY, DEFAULT_TEMPERATURE, DEFAULT_TOP_P,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::base::ChatMessage;
use crate::client::{BackendError, SseChunk};

/// Terminal marker of an OpenAI SSE stream.
const DONE_MARKER: &str = "[DONE]";

// ─────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────

/// Body of `POST {base}/chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    /// Pass-through parameters; on key collision these win.
    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl ChatCompletionRequest {
    /// Build a request from a merged config.
    ///
    /// Sampling parameters equal to the contract defaults are left out so the
    /// backend applies its own. Tools (and tool choice) are only sent when
    /// `include_tools` is set and tools are present.
    pub fn build(
        messages: Vec<ChatMessage>,
        config: &GenerationConfig,
        include_tools: bool,
    ) -> Self {
        let send_tools = include_tools && !config.tools.is_empty();

        ChatCompletionRequest {
            model: config.model.clone(),
            messages,
            temperature: non_default(config.temperature, DEFAULT_TEMPERATURE),
            top_p: non_default(config.top_p, DEFAULT_TOP_P),
            max_tokens: config.max_tokens,
            frequency_penalty: non_default(config.frequency_penalty, DEFAULT_PENALTY),
            presence_penalty: non_default(config.presence_penalty, DEFAULT_PENALTY),
            stop: (!config.stop.is_empty()).then(|| config.stop.clone()),
            tools: send_tools.then(|| config.tools.clone()),
            tool_choice: if send_tools { config.tool_choice.clone() } else { None },
            response_format: config.response_format.clone(),
            seed: config.seed,
            stream: None,
            extra: config.extra.clone(),
        }
    }

    pub fn streaming(mut self) -> Self {
        self.stream = Some(true);
        self
    }

    /// Final JSON body. Pass-through keys override same-named fields.
    pub fn into_body(self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

fn non_default(value: f64, default: f64) -> Option<f64> {
    ((value - default).abs() > f64::EPSILON).then_some(value)
}

/// Body of `POST {base}/embeddings`.
#[derive(Debug, Serialize)]
pub struct EmbeddingRequest<'a> {
    pub model: &'a str,
    pub input: &'a [String],
}

// ─────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ResponseToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ResponseToolCall {
    #[serde(default)]
    id: String,
    function: ResponseFunction,
}

#[derive(Debug, Deserialize)]
struct ResponseFunction {
    name: String,
    /// Usually a JSON string; some local servers send an object.
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
    #[serde(default)]
    total_tokens: Option<u32>,
}

impl WireUsage {
    fn into_usage(self) -> Option<Usage> {
        match (self.prompt_tokens, self.completion_tokens) {
            (Some(prompt), Some(completion)) => Some(Usage::new(prompt, completion)),
            (None, None) if self.total_tokens.is_none() => None,
            (prompt, completion) => {
                let prompt = prompt.unwrap_or(0);
                let completion = completion.unwrap_or(0);
                Some(Usage {
                    prompt_tokens: prompt,
                    completion_tokens: completion,
                    total_tokens: self.total_tokens.unwrap_or(prompt + completion),
                })
            }
        }
    }
}

/// Arguments text as the contract carries it: always a JSON string.
fn arguments_text(arguments: Value) -> String {
    match arguments {
        Value::String(text) => text,
        Value::Null => "{}".to_string(),
        other => other.to_string(),
    }
}

/// Normalize a chat-completions reply into an [`LlmResponse`].
///
/// The first choice is used. `requested_model` fills in when the backend does
/// not echo the model.
pub fn parse_chat_response(raw: Value, requested_model: &str) -> Result<LlmResponse, BackendError> {
    let parsed: ChatCompletionResponse = serde_json::from_value(raw.clone())
        .map_err(|e| BackendError::Invalid(e.to_string()))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Invalid("no choices in response".to_string()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            ToolCall::new(call.id, call.function.name, arguments_text(call.function.arguments))
        })
        .collect();

    Ok(LlmResponse {
        content: choice.message.content,
        tool_calls,
        usage: parsed.usage.and_then(WireUsage::into_usage),
        model: parsed
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| requested_model.to_string()),
        finish_reason: choice.finish_reason,
        raw,
    })
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Extract embedding vectors in input order. The reply must carry exactly
/// one vector per input.
pub fn parse_embeddings(raw: Value, expected: usize) -> Result<Vec<Vec<f32>>, BackendError> {
    let mut parsed: EmbeddingResponse =
        serde_json::from_value(raw).map_err(|e| BackendError::Invalid(e.to_string()))?;

    if parsed.data.len() != expected {
        return Err(BackendError::Invalid(format!(
            "expected {expected} embeddings, got {}",
            parsed.data.len()
        )));
    }
    if parsed.data.iter().all(|d| d.index.is_some()) {
        parsed.data.sort_by_key(|d| d.index);
    }
    Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// Model ids from a `GET {base}/models` reply.
pub fn parse_model_ids(raw: Value) -> Result<Vec<String>, BackendError> {
    let parsed: ModelList =
        serde_json::from_value(raw).map_err(|e| BackendError::Invalid(e.to_string()))?;
    Ok(parsed.data.into_iter().map(|m| m.id).collect())
}

// ─────────────────────────────────────────────
// Streaming
// ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Interpret one SSE `data:` payload of a chat-completions stream.
///
/// Deltas without text (role announcements, tool-call deltas) are skipped.
pub fn parse_stream_chunk(_event: &str, data: &str) -> SseChunk {
    let data = data.trim();
    if data == DONE_MARKER {
        return SseChunk::Done;
    }
    if data.is_empty() {
        return SseChunk::Skip;
    }

    match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => {
            if let Some(error) = chunk.error {
                return SseChunk::Error(BackendError::Stream(error.to_string()));
            }
            chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .filter(|text| !text.is_empty())
                .map_or(SseChunk::Skip, SseChunk::Text)
        }
        Err(e) => {
            debug!(error = %e, "Skipping unparseable stream chunk");
            SseChunk::Skip
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
