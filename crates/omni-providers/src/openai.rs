//! OpenAI adapter (also serves any OpenAI-compatible hosted endpoint via
//! `base_url`).

use async_trait::async_trait;
use omni_core::types::{GenerationConfig, LlmResponse, Message};
use omni_core::ProviderError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::{debug, warn};

use crate::base::{
    explicit_or_env, generic_error, is_authentication, is_context_length, is_rate_limit,
    BaseAdapter, ProviderOptions,
};
use crate::client::{sse_text_stream, BackendError, HttpBackend};
use crate::traits::{LlmProvider, TextStream};
use crate::wire::{self, ChatCompletionRequest, EmbeddingRequest};

pub const PROVIDER_NAME: &str = "openai";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Adapter for the OpenAI chat-completions and embeddings APIs.
#[derive(Debug)]
pub struct OpenAiProvider {
    base: BaseAdapter,
    organization: Option<String>,
}

impl OpenAiProvider {
    /// Explicit options win over `OPENAI_API_KEY`, `OPENAI_BASE_URL` and
    /// `OPENAI_ORGANIZATION`.
    pub fn new(options: ProviderOptions) -> Self {
        let api_key = explicit_or_env(options.api_key.as_deref(), "OPENAI_API_KEY");
        let base_url = explicit_or_env(options.base_url.as_deref(), "OPENAI_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let organization = explicit_or_env(options.organization.as_deref(), "OPENAI_ORGANIZATION");

        OpenAiProvider {
            base: BaseAdapter::new(
                &options,
                api_key,
                base_url,
                DEFAULT_MODEL,
                DEFAULT_EMBEDDING_MODEL,
            ),
            organization,
        }
    }

    pub fn base_url(&self) -> &str {
        self.base.base_url()
    }

    pub fn organization(&self) -> Option<&str> {
        self.organization.as_deref()
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = self.base.api_key() {
            match HeaderValue::from_str(&format!("Bearer {key}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(_) => warn!(provider = PROVIDER_NAME, "API key is not a valid header value"),
            }
        }
        if let Some(org) = &self.organization {
            match HeaderValue::from_str(org) {
                Ok(value) => {
                    headers.insert("OpenAI-Organization", value);
                }
                Err(_) => warn!(provider = PROVIDER_NAME, "Invalid organization header: {}", org),
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

    fn request_body(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        stream: bool,
    ) -> Result<serde_json::Value, ProviderError> {
        let mut request =
            ChatCompletionRequest::build(self.base.convert_messages(messages), config, true);
        if stream {
            request = request.streaming();
        }
        request
            .into_body()
            .map_err(|e| self.base.wrap_error(PROVIDER_NAME, "failed to encode request", e))
    }
}

/// Classify an OpenAI backend failure.
fn map_error(err: BackendError) -> ProviderError {
    if is_rate_limit(&err) {
        warn!(provider = PROVIDER_NAME, error = %err, "Rate limit exceeded");
        return ProviderError::rate_limited(PROVIDER_NAME).with_source(err);
    }
    if is_authentication(&err) {
        return ProviderError::authentication(PROVIDER_NAME).with_source(err);
    }
    if is_context_length(&err) {
        return ProviderError::context_length(PROVIDER_NAME).with_source(err);
    }
    generic_error(PROVIDER_NAME, err)
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(
        &self,
        messages: &[Message],
        config: Option<&GenerationConfig>,
    ) -> Result<LlmResponse, ProviderError> {
        let config = self.base.merge_config(config);
        let body = self.request_body(messages, &config, false)?;

        debug!(
            provider = PROVIDER_NAME,
            model = %config.model,
            messages = messages.len(),
            tools = config.tools.len(),
            "Calling LLM"
        );

        let raw = self
            .backend()
            .await?
            .post_json("chat/completions", &body)
            .await
            .map_err(map_error)?;
        let response = wire::parse_chat_response(raw, &config.model).map_err(map_error)?;

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
        let body = self.request_body(messages, &config, true)?;

        debug!(provider = PROVIDER_NAME, model = %config.model, "Opening completion stream");

        let response = self
            .backend()
            .await?
            .post_stream("chat/completions", &body)
            .await
            .map_err(map_error)?;
        Ok(sse_text_stream(response, wire::parse_stream_chunk, map_error))
    }

    async fn embed(
        &self,
        texts: &[String],
        model: Option<&str>,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = self.base.embedding_model(model);
        debug!(provider = PROVIDER_NAME, model, inputs = texts.len(), "Requesting embeddings");

        let raw = self
            .backend()
            .await?
            .post_json("embeddings", &EmbeddingRequest { model, input: texts })
            .await
            .map_err(map_error)?;
        wire::parse_embeddings(raw, texts.len()).map_err(map_error)
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

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use omni_core::types::{ToolChoice, ToolDefinition};
    use omni_core::ErrorKind;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    fn provider(uri: &str) -> OpenAiProvider {
        OpenAiProvider::new(
            ProviderOptions::new()
                .with_api_key("test-key-123")
                .with_base_url(uri)
                .with_max_retries(0),
        )
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
        })
    }

    #[test]
    fn test_defaults() {
        let p = OpenAiProvider::new(ProviderOptions::new().with_api_key("k"));
        assert_eq!(p.provider_name(), "openai");
        assert_eq!(p.default_model(), DEFAULT_MODEL);
        assert_eq!(p.default_embedding_model(), DEFAULT_EMBEDDING_MODEL);
        assert!(p.is_available());
    }

    #[test]
    fn test_explicit_options_win() {
        let p = OpenAiProvider::new(
            ProviderOptions::new()
                .with_api_key("k")
                .with_base_url("https://proxy.example/v1")
                .with_organization("org-1")
                .with_default_model("gpt-4o"),
        );
        assert_eq!(p.base_url(), "https://proxy.example/v1");
        assert_eq!(p.organization(), Some("org-1"));
        assert_eq!(p.default_model(), "gpt-4o");
    }

    #[tokio::test]
    async fn test_complete_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer test-key-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hello!")))
            .expect(1)
            .mount(&server)
            .await;

        let resp = provider(&server.uri())
            .complete(&[Message::user("Hi")], None)
            .await
            .unwrap();

        assert_eq!(resp.content.as_deref(), Some("Hello!"));
        assert_eq!(resp.model, "gpt-4o-mini");
        assert_eq!(resp.finish_reason.as_deref(), Some("stop"));
        let usage = resp.usage.unwrap();
        assert_eq!(usage.total_tokens, usage.prompt_tokens + usage.completion_tokens);
        assert_eq!(resp.raw["id"], "chatcmpl-1");
    }

    #[tokio::test]
    async fn test_complete_sends_default_model_and_omits_default_sampling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"model": DEFAULT_MODEL})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
            .mount(&server)
            .await;

        provider(&server.uri())
            .complete(&[Message::user("Hi")], None)
            .await
            .unwrap();

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert!(body.get("temperature").is_none());
        assert!(body.get("top_p").is_none());
        assert!(body.get("stream").is_none());
    }

    #[tokio::test]
    async fn test_complete_sends_tools_and_extra() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "tools": [{"type": "function", "function": {"name": "get_weather"}}],
                "tool_choice": {"type": "function", "function": {"name": "get_weather"}},
                "user": "u-42"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "get_weather", "arguments": "{\"city\":\"Paris\"}"}
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let config = GenerationConfig::default()
            .with_tools(vec![ToolDefinition::new(
                "get_weather",
                "Weather",
                json!({"type": "object"}),
            )])
            .with_tool_choice(ToolChoice::function("get_weather"))
            .with_extra("user", json!("u-42"));

        let resp = provider(&server.uri())
            .complete(&[Message::user("Weather?")], Some(&config))
            .await
            .unwrap();

        assert!(resp.content.is_none());
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].id, "call_1");
        assert_eq!(resp.tool_calls[0].parsed_arguments().unwrap()["city"], "Paris");
        assert!(resp.usage.is_none());
        assert_eq!(resp.model, DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn test_rate_limit_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"message": "Rate limit reached", "type": "requests"}
            })))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .complete(&[Message::user("Hi")], None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RateLimit);
        assert_eq!(err.provider(), "openai");
        assert_eq!(err.status(), Some(429));
        assert_eq!(err.to_string(), "[openai] Rate limit exceeded");
    }

    #[tokio::test]
    async fn test_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Incorrect API key"))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .complete(&[Message::user("Hi")], None)
            .await
            .unwrap_err();

        assert!(err.is_authentication());
        assert_eq!(err.message(), "Authentication failed - check your API key");
    }

    #[tokio::test]
    async fn test_context_length_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {
                    "message": "This model's maximum context length is 8192 tokens. However, you requested 14290 tokens.",
                    "code": "context_length_exceeded"
                }
            })))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .complete(&[Message::user("Hi")], None)
            .await
            .unwrap_err();

        assert!(err.is_context_length());
        assert_eq!(err.message(), "Context length exceeded");
    }

    #[tokio::test]
    async fn test_other_error_is_generic() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal server error"))
            .mount(&server)
            .await;

        let err = provider(&server.uri())
            .complete(&[Message::user("Hi")], None)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(err.status(), Some(500));
        assert!(err.message().contains("Internal server error"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_stream_yields_fragments_in_order() {
        let server = MockServer::start().await;
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse),
            )
            .expect(1)
            .mount(&server)
            .await;

        let stream = provider(&server.uri())
            .stream(&[Message::user("Hi")], None)
            .await
            .unwrap();
        let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;

        assert_eq!(chunks.concat(), "Hello");
        assert!(chunks.iter().all(|c| !c.is_empty()));
    }

    #[tokio::test]
    async fn test_stream_open_failure_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = provider(&server.uri()).stream(&[Message::user("Hi")], None).await;
        assert!(result.err().unwrap().is_authentication());
    }

    #[tokio::test]
    async fn test_embed_orders_vectors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(body_partial_json(json!({"model": DEFAULT_EMBEDDING_MODEL})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {"index": 1, "embedding": [0.0, 1.0]},
                    {"index": 0, "embedding": [1.0, 0.0]}
                ]
            })))
            .mount(&server)
            .await;

        let vectors = provider(&server.uri())
            .embed(&["a".to_string(), "b".to_string()], None)
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_embed_uses_explicit_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(|req: &Request| {
                let body: serde_json::Value = serde_json::from_slice(&req.body).unwrap();
                assert_eq!(body["model"], "text-embedding-3-large");
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": [{"index": 0, "embedding": [0.1]}]}))
            })
            .mount(&server)
            .await;

        let vectors = provider(&server.uri())
            .embed(&["a".to_string()], Some("text-embedding-3-large"))
            .await
            .unwrap();
        assert_eq!(vectors.len(), 1);
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({"max_tokens": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("pong")))
            .mount(&server)
            .await;

        assert!(provider(&server.uri()).health_check().await);
        assert!(!provider("http://127.0.0.1:1").health_check().await);
    }
}
