//! Contract value types shared by every provider adapter.
//!
//! Callers build [`Message`]s and an optional [`GenerationConfig`]; adapters
//! return an [`LlmResponse`]. Every adapter normalizes backend tool invocations
//! into the same [`ToolCall`] shape, whatever the backend sent.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Contract default for `temperature`. Adapters omit it from requests when unchanged.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Contract default for `top_p`.
pub const DEFAULT_TOP_P: f64 = 1.0;
/// Contract default for frequency/presence penalties.
pub const DEFAULT_PENALTY: f64 = 0.0;

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// Who authored a message.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// Wire name of the role (`"system"`, `"user"`, …).
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// A single conversation message.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Optional participant name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Set on tool results: the id of the call this message answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Set on assistant turns that invoked tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Message {
            role,
            content: content.into(),
            name: None,
            tool_call_id: None,
            tool_calls: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    /// Create an assistant message with text content.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Create an assistant turn that invoked tools (content may be empty).
    pub fn assistant_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message {
            tool_calls: Some(tool_calls),
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// Create a tool result message.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    /// Attach a participant name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

// ─────────────────────────────────────────────
// Tool calls and definitions
// ─────────────────────────────────────────────

/// A tool invocation requested by the model.
///
/// `arguments` is always JSON text, even when the backend delivered an object.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    /// Backend-assigned id, echoed back in the matching tool result.
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Parse `arguments` back into JSON. Empty text parses as `{}`.
    pub fn parsed_arguments(&self) -> serde_json::Result<serde_json::Value> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Value::Object(Default::default()));
        }
        serde_json::from_str(&self.arguments)
    }
}

/// Canonical (function-style) tool schema supplied by callers.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// `"function"` for every tool adapters know how to translate.
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

/// Name, description and JSON-schema parameters of a function tool.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_schema")]
    pub parameters: serde_json::Value,
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({})
}

impl ToolDefinition {
    /// Create a new function tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }

    pub fn is_function(&self) -> bool {
        self.tool_type == "function"
    }
}

/// How the model may pick tools: a mode string or a specific function.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ToolChoice {
    /// `"auto"`, `"none"`, `"required"`.
    Mode(String),
    /// `{"type": "function", "function": {"name": "..."}}`.
    Function(NamedToolChoice),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct NamedToolChoice {
    #[serde(rename = "type", default = "function_type")]
    pub choice_type: String,
    pub function: ToolChoiceName,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolChoiceName {
    pub name: String,
}

fn function_type() -> String {
    "function".to_string()
}

impl ToolChoice {
    pub fn auto() -> Self {
        ToolChoice::Mode("auto".to_string())
    }

    pub fn none() -> Self {
        ToolChoice::Mode("none".to_string())
    }

    pub fn required() -> Self {
        ToolChoice::Mode("required".to_string())
    }

    /// Force a call to the named function.
    pub fn function(name: impl Into<String>) -> Self {
        ToolChoice::Function(NamedToolChoice {
            choice_type: function_type(),
            function: ToolChoiceName { name: name.into() },
        })
    }
}

// ─────────────────────────────────────────────
// Generation config
// ─────────────────────────────────────────────

/// Per-call generation options.
///
/// An empty `model` means "use the adapter's default model".
#[derive(Clone, Debug, PartialEq)]
pub struct GenerationConfig {
    pub model: String,
    /// Sampling temperature (0.0 – 2.0).
    pub temperature: f64,
    pub top_p: f64,
    /// Maximum output tokens; each backend has its own fallback when unset.
    pub max_tokens: Option<u32>,
    pub frequency_penalty: f64,
    pub presence_penalty: f64,
    pub stop: Vec<String>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: Option<ToolChoice>,
    /// Structured output directive, e.g. `{"type": "json_object"}`.
    pub response_format: Option<serde_json::Value>,
    pub seed: Option<i64>,
    /// Provider-specific pass-through parameters.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            max_tokens: None,
            frequency_penalty: DEFAULT_PENALTY,
            presence_penalty: DEFAULT_PENALTY,
            stop: Vec::new(),
            tools: Vec::new(),
            tool_choice: None,
            response_format: None,
            seed: None,
            extra: HashMap::new(),
        }
    }
}

impl GenerationConfig {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    pub fn with_response_format(mut self, format: serde_json::Value) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

// ─────────────────────────────────────────────
// LLM Response
// ─────────────────────────────────────────────

/// Normalized result of a completion call.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    /// Text content (None when the model only called tools).
    pub content: Option<String>,
    /// Tool invocations; may coexist with `content`.
    pub tool_calls: Vec<ToolCall>,
    /// None when the backend did not report usage.
    pub usage: Option<Usage>,
    /// Model that actually answered.
    pub model: String,
    pub finish_reason: Option<String>,
    /// Unmodified backend payload.
    pub raw: serde_json::Value,
}

impl LlmResponse {
    /// Whether the response contains tool calls.
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Token accounting for one call.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Build from prompt/completion counts; total is their sum.
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Usage {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_value(Role::Assistant).unwrap();
        assert_eq!(json, "assistant");
        assert_eq!(Role::Tool.as_str(), "tool");
    }

    #[test]
    fn test_plain_message_omits_optional_fields() {
        let json = serde_json::to_value(Message::user("Hello")).unwrap();

        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "Hello");
        assert!(json.get("name").is_none());
        assert!(json.get("tool_call_id").is_none());
        assert!(json.get("tool_calls").is_none());
    }

    #[test]
    fn test_tool_result_message() {
        let msg = Message::tool_result("call_1", "42");
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(msg.content, "42");
    }

    #[test]
    fn test_assistant_tool_calls_message() {
        let msg = Message::assistant_tool_calls(
            "Let me check.",
            vec![ToolCall::new("call_9", "lookup", r#"{"q":"rust"}"#)],
        )
        .with_name("planner");

        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Let me check.");
        assert_eq!(msg.tool_calls.as_ref().unwrap().len(), 1);
        assert_eq!(msg.name.as_deref(), Some("planner"));
    }

    #[test]
    fn test_parsed_arguments() {
        let call = ToolCall::new("c", "f", r#"{"path": "/tmp"}"#);
        assert_eq!(call.parsed_arguments().unwrap()["path"], "/tmp");

        let empty = ToolCall::new("c", "f", "");
        assert_eq!(empty.parsed_arguments().unwrap(), json!({}));

        let broken = ToolCall::new("c", "f", "{not json");
        assert!(broken.parsed_arguments().is_err());
    }

    #[test]
    fn test_tool_definition_serialization() {
        let tool = ToolDefinition::new(
            "read_file",
            "Read a file",
            json!({"type": "object", "properties": {"path": {"type": "string"}}}),
        );
        let json = serde_json::to_value(&tool).unwrap();

        assert_eq!(json["type"], "function");
        assert_eq!(json["function"]["name"], "read_file");
        assert_eq!(json["function"]["parameters"]["type"], "object");
        assert!(tool.is_function());
    }

    #[test]
    fn test_tool_definition_defaults_when_fields_missing() {
        let tool: ToolDefinition =
            serde_json::from_value(json!({"type": "function", "function": {"name": "ping"}}))
                .unwrap();
        assert_eq!(tool.function.description, "");
        assert_eq!(tool.function.parameters, json!({}));
    }

    #[test]
    fn test_tool_choice_shapes() {
        assert_eq!(serde_json::to_value(ToolChoice::auto()).unwrap(), json!("auto"));
        assert_eq!(
            serde_json::to_value(ToolChoice::function("lookup")).unwrap(),
            json!({"type": "function", "function": {"name": "lookup"}})
        );

        let parsed: ToolChoice =
            serde_json::from_value(json!({"function": {"name": "lookup"}})).unwrap();
        assert_eq!(parsed, ToolChoice::function("lookup"));
    }

    #[test]
    fn test_generation_config_defaults() {
        let config = GenerationConfig::default();
        assert!(config.model.is_empty());
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.top_p, 1.0);
        assert_eq!(config.frequency_penalty, 0.0);
        assert!(config.max_tokens.is_none());
        assert!(config.tools.is_empty());
    }

    #[test]
    fn test_generation_config_builders() {
        let config = GenerationConfig::default()
            .with_model("gpt-4o")
            .with_temperature(0.2)
            .with_max_tokens(128)
            .with_seed(7)
            .with_extra("user", json!("abc"));

        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.max_tokens, Some(128));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.extra["user"], "abc");
    }

    #[test]
    fn test_usage_total_is_sum() {
        let usage = Usage::new(12, 30);
        assert_eq!(usage.total_tokens, 42);
    }

    #[test]
    fn test_response_has_tool_calls() {
        let mut resp = LlmResponse::default();
        assert!(!resp.has_tool_calls());
        resp.tool_calls.push(ToolCall::new("1", "f", "{}"));
        assert!(resp.has_tool_calls());
    }
}
