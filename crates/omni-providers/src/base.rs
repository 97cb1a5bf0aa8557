//! Shared adapter plumbing: construction options, config merging, message
//! conversion, lazy client creation, and backend error signatures.

use std::time::Duration;

use omni_core::types::{GenerationConfig, Message, Role};
use omni_core::ProviderError;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::client::{BackendError, HttpBackend};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Default transport-level retry bound.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

// ─────────────────────────────────────────────
// ProviderOptions
// ─────────────────────────────────────────────

/// Construction options understood by the built-in adapters.
///
/// Deserializes from the flat key/value mapping the factory accepts
/// (`timeout` in seconds); unknown keys are ignored.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderOptions {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub default_embedding_model: Option<String>,
    #[serde(deserialize_with = "deserialize_secs")]
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    /// OpenAI organization id.
    pub organization: Option<String>,
    /// Local server kind: `lmstudio`, `ollama`, or `llamacpp`.
    pub provider_type: Option<String>,
}

impl ProviderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_default_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.default_embedding_model = Some(model.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_provider_type(mut self, provider_type: impl Into<String>) -> Self {
        self.provider_type = Some(provider_type.into());
        self
    }
}

fn deserialize_secs<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<f64>::deserialize(deserializer)?
        .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
        .transpose()
}

/// Explicit value if non-empty, else the environment variable if non-empty.
pub(crate) fn explicit_or_env(explicit: Option<&str>, env_key: &str) -> Option<String> {
    explicit
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .or_else(|| std::env::var(env_key).ok().filter(|v| !v.is_empty()))
}

// ─────────────────────────────────────────────
// BaseAdapter
// ─────────────────────────────────────────────

/// State and helpers every concrete adapter embeds.
///
/// The HTTP client is created on first use and reused afterwards; concurrent
/// first uses still build exactly one client.
#[derive(Debug)]
pub struct BaseAdapter {
    api_key: Option<String>,
    base_url: String,
    default_model: String,
    default_embedding_model: String,
    timeout: Duration,
    max_retries: u32,
    client: OnceCell<HttpBackend>,
}

impl BaseAdapter {
    /// Resolve adapter state from options and the adapter's own defaults.
    ///
    /// `api_key` and `base_url` are passed already resolved (explicit value,
    /// environment, or adapter default).
    pub fn new(
        options: &ProviderOptions,
        api_key: Option<String>,
        base_url: String,
        default_model: &str,
        default_embedding_model: &str,
    ) -> Self {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());

        BaseAdapter {
            api_key,
            base_url,
            default_model: non_empty(&options.default_model)
                .unwrap_or_else(|| default_model.to_string()),
            default_embedding_model: non_empty(&options.default_embedding_model)
                .unwrap_or_else(|| default_embedding_model.to_string()),
            timeout: options.timeout.unwrap_or(DEFAULT_TIMEOUT),
            max_retries: options.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            client: OnceCell::new(),
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn default_embedding_model(&self) -> &str {
        &self.default_embedding_model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// The adapter's HTTP client, built on first call with `headers()`.
    pub async fn client<H>(&self, headers: H) -> Result<&HttpBackend, BackendError>
    where
        H: FnOnce() -> HeaderMap,
    {
        self.client
            .get_or_try_init(|| async move {
                debug!(base_url = %self.base_url, "Creating HTTP client");
                HttpBackend::new(&self.base_url, headers(), self.timeout, self.max_retries)
            })
            .await
    }

    /// The caller's config (or defaults) with an empty model resolved to the
    /// adapter default. The caller's config is never modified.
    pub fn merge_config(&self, config: Option<&GenerationConfig>) -> GenerationConfig {
        let mut merged = config.cloned().unwrap_or_default();
        if merged.model.is_empty() {
            merged.model = self.default_model.clone();
        }
        merged
    }

    /// Resolve an optional embedding model to the adapter default.
    pub fn embedding_model<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        model
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.default_embedding_model)
    }

    /// Convert contract messages to the generic chat shape, in order.
    pub fn convert_messages(&self, messages: &[Message]) -> Vec<ChatMessage> {
        messages.iter().map(ChatMessage::from).collect()
    }

    /// Wrap an arbitrary failure as a generic provider error.
    pub fn wrap_error<E>(&self, provider: &str, context: &str, err: E) -> ProviderError
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ProviderError::new(provider, format!("{context}: {err}")).with_source(err)
    }
}

// ─────────────────────────────────────────────
// Generic chat message shape
// ─────────────────────────────────────────────

/// Role/content message in the OpenAI-style chat shape.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: &'static str,
    /// `None` only for assistant turns that carry tool calls and no text.
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ChatToolCall>>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ChatToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: &'static str,
    pub function: ChatFunctionCall,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct ChatFunctionCall {
    pub name: String,
    pub arguments: String,
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        let tool_calls = msg
            .tool_calls
            .as_ref()
            .filter(|calls| !calls.is_empty() && msg.role == Role::Assistant)
            .map(|calls| {
                calls
                    .iter()
                    .map(|call| ChatToolCall {
                        id: call.id.clone(),
                        call_type: "function",
                        function: ChatFunctionCall {
                            name: call.name.clone(),
                            arguments: call.arguments.clone(),
                        },
                    })
                    .collect::<Vec<_>>()
            });

        let content = if tool_calls.is_some() && msg.content.is_empty() {
            None
        } else {
            Some(msg.content.clone())
        };

        ChatMessage {
            role: msg.role.as_str(),
            content,
            name: msg.name.clone(),
            tool_call_id: msg.tool_call_id.clone(),
            tool_calls,
        }
    }
}

// ─────────────────────────────────────────────
// Backend error signatures
// ─────────────────────────────────────────────
//
// A known HTTP status wins; free-text patterns cover failures that carry no
// status (stream error events, gateways that rewrite bodies). Bare status
// digits are only matched when no status is known, since token counts in
// error bodies routinely contain them.

fn text_of(err: &BackendError) -> String {
    err.to_string().to_lowercase()
}

pub(crate) fn is_rate_limit(err: &BackendError) -> bool {
    let text = text_of(err);
    match err.status() {
        Some(status) => status == 429 || text.contains("rate_limit") || text.contains("rate limit"),
        None => text.contains("rate_limit") || text.contains("rate limit") || text.contains("429"),
    }
}

pub(crate) fn is_authentication(err: &BackendError) -> bool {
    let text = text_of(err);
    match err.status() {
        Some(status) => status == 401 || text.contains("authentication"),
        None => text.contains("authentication") || text.contains("401"),
    }
}

pub(crate) fn is_context_length(err: &BackendError) -> bool {
    let text = text_of(err);
    text.contains("context_length") || text.contains("maximum context")
}

pub(crate) fn is_connection_failure(err: &BackendError) -> bool {
    if err.is_connect() {
        return true;
    }
    let text = text_of(err);
    err.status().is_none() && (text.contains("connection") || text.contains("refused"))
}

/// Generic provider error carrying the backend status, if any.
pub(crate) fn generic_error(provider: &str, err: BackendError) -> ProviderError {
    let mut mapped = ProviderError::new(provider, err.to_string());
    if let Some(status) = err.status() {
        mapped = mapped.with_status(status);
    }
    mapped.with_source(err)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use omni_core::types::ToolCall;

    fn adapter(options: &ProviderOptions) -> BaseAdapter {
        BaseAdapter::new(options, None, "http://localhost".into(), "model-a", "embed-a")
    }

    fn status(code: u16, body: &str) -> BackendError {
        BackendError::Status { status: code, body: body.to_string() }
    }

    #[test]
    fn test_defaults_and_overrides() {
        let base = adapter(&ProviderOptions::new());
        assert_eq!(base.default_model(), "model-a");
        assert_eq!(base.default_embedding_model(), "embed-a");
        assert_eq!(base.timeout(), DEFAULT_TIMEOUT);
        assert_eq!(base.max_retries(), DEFAULT_MAX_RETRIES);

        let base = adapter(
            &ProviderOptions::new()
                .with_default_model("model-b")
                .with_timeout(Duration::from_secs(5))
                .with_max_retries(0),
        );
        assert_eq!(base.default_model(), "model-b");
        assert_eq!(base.timeout(), Duration::from_secs(5));
        assert_eq!(base.max_retries(), 0);
    }

    #[test]
    fn test_merge_config_fills_model_without_mutating_input() {
        let base = adapter(&ProviderOptions::new());
        assert_eq!(base.merge_config(None).model, "model-a");

        let config = GenerationConfig::default().with_temperature(0.2);
        let merged = base.merge_config(Some(&config));
        assert_eq!(merged.model, "model-a");
        assert_eq!(merged.temperature, 0.2);
        assert!(config.model.is_empty());

        let explicit = GenerationConfig::default().with_model("other");
        assert_eq!(base.merge_config(Some(&explicit)).model, "other");
    }

    #[test]
    fn test_embedding_model_resolution() {
        let base = adapter(&ProviderOptions::new());
        assert_eq!(base.embedding_model(None), "embed-a");
        assert_eq!(base.embedding_model(Some("")), "embed-a");
        assert_eq!(base.embedding_model(Some("custom")), "custom");
    }

    #[test]
    fn test_convert_messages_preserves_order_and_fields() {
        let base = adapter(&ProviderOptions::new());
        let messages = vec![
            Message::system("be brief"),
            Message::user("hi").with_name("alice"),
            Message::assistant_tool_calls("", vec![ToolCall::new("c1", "lookup", "{\"q\":1}")]),
            Message::tool_result("c1", "42"),
        ];

        let converted = base.convert_messages(&messages);
        let roles: Vec<_> = converted.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "tool"]);
        assert_eq!(converted[1].name.as_deref(), Some("alice"));
        assert_eq!(converted[2].content, None);
        let calls = converted[2].tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "lookup");
        assert_eq!(calls[0].call_type, "function");
        assert_eq!(converted[3].tool_call_id.as_deref(), Some("c1"));
        assert_eq!(converted[3].content.as_deref(), Some("42"));
    }

    #[test]
    fn test_options_from_mapping() {
        let options: ProviderOptions = serde_json::from_value(serde_json::json!({
            "api_key": "sk-1",
            "timeout": 2.5,
            "max_retries": 1,
            "unknown_key": true
        }))
        .unwrap();

        assert_eq!(options.api_key.as_deref(), Some("sk-1"));
        assert_eq!(options.timeout, Some(Duration::from_millis(2500)));
        assert_eq!(options.max_retries, Some(1));
    }

    #[test]
    fn test_options_reject_negative_timeout() {
        let result: Result<ProviderOptions, _> =
            serde_json::from_value(serde_json::json!({ "timeout": -1.0 }));
        assert!(result.is_err());
    }

    #[test]
    fn test_signatures() {
        assert!(is_rate_limit(&status(429, "")));
        assert!(is_rate_limit(&status(400, "{\"type\":\"rate_limit_error\"}")));
        assert!(is_rate_limit(&BackendError::Stream("got 429 from upstream".into())));
        assert!(!is_rate_limit(&status(400, "you requested 14290 tokens")));

        assert!(is_authentication(&status(401, "")));
        assert!(is_authentication(&BackendError::Stream("authentication_error".into())));
        assert!(!is_authentication(&status(400, "4010 tokens")));

        assert!(is_context_length(&status(400, "maximum context length is 8192")));
        assert!(is_context_length(&status(400, "context_length_exceeded")));
        assert!(!is_context_length(&status(400, "bad request")));

        assert!(is_connection_failure(&BackendError::Stream("Connection refused".into())));
        assert!(!is_connection_failure(&status(500, "connection reset by peer")));
    }

    #[test]
    fn test_generic_error_keeps_status() {
        let err = generic_error("openai", status(503, "overloaded"));
        assert_eq!(err.status(), Some(503));
        assert!(err.message().contains("overloaded"));
        assert!(err.is_retryable());
    }
}
