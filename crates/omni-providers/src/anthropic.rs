//! Anthropic Messages API adapter.
//!
//! The contract's chat shape differs from Anthropic's in three places this
//! module translates: system messages travel in a dedicated `system` field,
//! tools use `input_schema`, and tool calls/results are content blocks.

use async_trait::async_trait;
use omni_core::types::{
    GenerationConfig, LlmResponse, Message, Role, ToolCall, ToolChoice, ToolDefinition, Usage,
    DEFAULT_TEMPERATURE, DEFAULT_TOP_P,
};
use omni_core::ProviderError;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::base::{
    explicit_or_env, generic_error, is_authentication, is_rate_limit, BaseAdapter,
    ProviderOptions,
};
use crate::client::{sse_text_stream, BackendError, HttpBackend, SseChunk};
use crate::traits::{LlmProvider, TextStream};

pub const PROVIDER_NAME: &str = "anthropic";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-3-sonnet-20240229";
/// Reported for discovery only; Anthropic serves no embeddings.
pub const DEFAULT_EMBEDDING_MODEL: &str = "voyage-large-2";
/// Output budget when the caller sets none; the API requires one.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const API_VERSION: &str = "2023-06-01";

const MESSAGES_PATH: &str = "v1/messages";

// ─────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream: Option<bool>,
}

#[derive(Debug, Serialize, PartialEq)]
struct AnthropicMessage {
    role: &'static str,
    content: AnthropicContent,
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    ToolResult { tool_use_id: String, content: String },
}

#[derive(Debug, Serialize, PartialEq)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: Value,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    content: Vec<ResponseBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

// ─────────────────────────────────────────────
// Conversion
// ─────────────────────────────────────────────

/// Split out system text and convert the remaining turns, in order.
///
/// Several system messages are joined with a blank line.
fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut converted = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => system_parts.push(&msg.content),
            Role::User => converted.push(AnthropicMessage {
                role: "user",
                content: AnthropicContent::Text(msg.content.clone()),
            }),
            Role::Assistant => {
                let calls = msg.tool_calls.as_deref().unwrap_or_default();
                let content = if calls.is_empty() {
                    AnthropicContent::Text(msg.content.clone())
                } else {
                    let mut blocks = Vec::with_capacity(calls.len() + 1);
                    if !msg.content.is_empty() {
                        blocks.push(ContentBlock::Text { text: msg.content.clone() });
                    }
                    blocks.extend(calls.iter().map(tool_use_block));
                    AnthropicContent::Blocks(blocks)
                };
                converted.push(AnthropicMessage { role: "assistant", content });
            }
            Role::Tool => converted.push(AnthropicMessage {
                role: "user",
                content: AnthropicContent::Blocks(vec![ContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: msg.content.clone(),
                }]),
            }),
        }
    }

    let system = (!system_parts.is_empty()).then(|| system_parts.join("\n\n"));
    (system, converted)
}

fn tool_use_block(call: &ToolCall) -> ContentBlock {
    let input = call.parsed_arguments().unwrap_or_else(|e| {
        warn!(tool = %call.name, error = %e, "Tool call arguments are not valid JSON");
        json!({})
    });
    ContentBlock::ToolUse { id: call.id.clone(), name: call.name.clone(), input }
}

/// Function tools only; other tool kinds have no Anthropic equivalent.
fn convert_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
    tools
        .iter()
        .filter(|t| t.is_function())
        .map(|t| AnthropicTool {
            name: t.function.name.clone(),
            description: t.function.description.clone(),
            input_schema: t.function.parameters.clone(),
        })
        .collect()
}

fn convert_tool_choice(choice: &ToolChoice) -> Option<Value> {
    match choice {
        ToolChoice::Mode(mode) => match mode.as_str() {
            "auto" => Some(json!({"type": "auto"})),
            "required" | "any" => Some(json!({"type": "any"})),
            "none" => Some(json!({"type": "none"})),
            other => {
                debug!(mode = other, "Ignoring unknown tool_choice mode");
                None
            }
        },
        ToolChoice::Function(named) => Some(json!({"type": "tool", "name": named.function.name})),
    }
}

fn build_request(messages: &[Message], config: &GenerationConfig, stream: bool) -> MessagesRequest {
    let (system, messages) = convert_messages(messages);
    let tools = convert_tools(&config.tools);
    let tool_choice = if tools.is_empty() {
        None
    } else {
        config.tool_choice.as_ref().and_then(convert_tool_choice)
    };

    MessagesRequest {
        model: config.model.clone(),
        messages,
        max_tokens: config.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        system,
        temperature: ((config.temperature - DEFAULT_TEMPERATURE).abs() > f64::EPSILON)
            .then_some(config.temperature),
        top_p: ((config.top_p - DEFAULT_TOP_P).abs() > f64::EPSILON).then_some(config.top_p),
        stop_sequences: (!config.stop.is_empty()).then(|| config.stop.clone()),
        tools: (!tools.is_empty()).then_some(tools),
        tool_choice,
        stream: stream.then_some(true),
    }
}

fn parse_response(raw: Value, requested_model: &str) -> Result<LlmResponse, BackendError> {
    let parsed: MessagesResponse =
        serde_json::from_value(raw.clone()).map_err(|e| BackendError::Invalid(e.to_string()))?;

    let mut text: Option<String> = None;
    let mut tool_calls = Vec::new();
    for block in parsed.content {
        match block {
            ResponseBlock::Text { text: t } => text.get_or_insert_with(String::new).push_str(&t),
            ResponseBlock::ToolUse { id, name, input } => {
                let input = if input.is_null() { json!({}) } else { input };
                tool_calls.push(ToolCall::new(id, name, input.to_string()));
            }
            ResponseBlock::Other => {}
        }
    }

    Ok(LlmResponse {
        content: text,
        tool_calls,
        usage: parsed.usage.map(|u| Usage::new(u.input_tokens, u.output_tokens)),
        model: parsed
            .model
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| requested_model.to_string()),
        finish_reason: parsed.stop_reason,
        raw,
    })
}

/// Interpret one Anthropic stream event.
fn parse_stream_event(event: &str, data: &str) -> SseChunk {
    let Ok(payload) = serde_json::from_str::<Value>(data) else {
        return SseChunk::Skip;
    };
    let kind = payload
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or(event);

    match kind {
        "content_block_delta" => {
            let delta = &payload["delta"];
            match (delta["type"].as_str(), delta["text"].as_str()) {
                (Some("text_delta"), Some(text)) if !text.is_empty() => {
                    SseChunk::Text(text.to_string())
                }
                _ => SseChunk::Skip,
            }
        }
        "message_stop" => SseChunk::Done,
        "error" => SseChunk::Error(BackendError::Stream(payload["error"].to_string())),
        _ => SseChunk::Skip,
    }
}

/// Classify an Anthropic backend failure. There is no context-length
/// category here: those surface as generic provider errors.
fn map_error(err: BackendError) -> ProviderError {
    if is_rate_limit(&err) {
        warn!(provider = PROVIDER_NAME, error = %err, "Rate limit exceeded");
        return ProviderError::rate_limited(PROVIDER_NAME).with_source(err);
    }
    if is_authentication(&err) {
        return ProviderError::authentication(PROVIDER_NAME).with_source(err);
    }
    generic_error(PROVIDER_NAME, err)
}

// ─────────────────────────────────────────────
// Provider
// ─────────────────────────────────────────────

/// Adapter for Anthropic's Messages API.
#[derive(Debug)]
pub struct AnthropicProvider {
    base: BaseAdapter,
}

impl AnthropicProvider {
    /// Explicit options win over `ANTHROPIC_API_KEY` and `ANTHROPIC_BASE_URL`.
    pub fn new(options: ProviderOptions) -> Self {
        let api_key = explicit_or_env(options.api_key.as_deref(), "ANTHROPIC_API_KEY");
        let base_url = explicit_or_env(options.base_url.as_deref(), "ANTHROPIC_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        AnthropicProvider {
            base: BaseAdapter::new(
                &options,
                api_key,
                base_url,
                DEFAULT_MODEL,
                DEFAULT_EMBEDDING_MODEL,
            ),
        }
    }

    pub fn base_url(&self) -> &str {
        self.base.base_url()
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        if let Some(key) = self.base.api_key() {
            match HeaderValue::from_str(key) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert("x-api-key", value);
                }
                Err(_) => warn!(provider = PROVIDER_NAME, "API key is not a valid header value"),
            }
        }
        headers
    }

    async fn backend(&self) -> Result<&HttpBackend, ProviderError> {
        self.base
            .client(|| self.headers())
            .await
            .map_err(|e| self.base.wrap_error(PROVIDER_NAME, "failed to initialise HTTP client", e))
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: &[Message],
        config: Option<&GenerationConfig>,
    ) -> Result<LlmResponse, ProviderError> {
        let config = self.base.merge_config(config);
        let request = build_request(messages, &config, false);

        debug!(
            provider = PROVIDER_NAME,
            model = %config.model,
            messages = request.messages.len(),
            tools = config.tools.len(),
            "Calling LLM"
        );

        let raw = self
            .backend()
            .await?
            .post_json(MESSAGES_PATH, &request)
            .await
            .map_err(map_error)?;
        let response = parse_response(raw, &config.model).map_err(map_error)?;

        debug!(
            provider = PROVIDER_NAME,
            model = %response.model,
            has_content = response.content.is_some(),
            tool_calls = response.tool_calls.len(),
            finish_reason = ?response.finish_reason,
            "LLM response received"
        );
        Ok(response)
    }

    async fn stream(
        &self,
        messages: &[Message],
        config: Option<&GenerationConfig>,
    ) -> Result<TextStream, ProviderError> {
        let config = self.base.merge_config(config);
        let request = build_request(messages, &config, true);

        debug!(provider = PROVIDER_NAME, model = %config.model, "Opening completion stream");

        let response = self
            .backend()
            .await?
            .post_stream(MESSAGES_PATH, &request)
            .await
            .map_err(map_error)?;
        Ok(sse_text_stream(response, parse_stream_event, map_error))
    }

    async fn embed(
        &self,
        _texts: &[String],
        _model: Option<&str>,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::new(
            PROVIDER_NAME,
            "Anthropic does not provide embeddings. Use a different provider.",
        ))
    }

    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    fn is_available(&self) -> bool {
        self.base.api_key().is_some()
    }

    fn default_model(&self) -> &str {
        self.base.default_model()
    }

    fn default_embedding_model(&self) -> &str {
        self.base.default_embedding_model()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
