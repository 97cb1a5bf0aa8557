//! Adapter for local OpenAI-compatible servers: LM Studio, Ollama, llama.cpp.
//!
//! Speaks the same chat-completions wire format as the OpenAI adapter, with a
//! per-server default URL, no real API key, and tool support only where the
//! server implements it.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use omni_core::types::{GenerationConfig, LlmResponse, Message};
use omni_core::ProviderError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::{debug, info};

use crate::base::{
    explicit_or_env, generic_error, is_connection_failure, BaseAdapter, ProviderOptions,
};
use crate::client::{sse_text_stream, BackendError, HttpBackend};
use crate::traits::{ping_health_check, LlmProvider, TextStream};
use crate::wire::{self, ChatCompletionRequest, EmbeddingRequest};

/// Placeholder credential; local servers ignore it.
pub const PLACEHOLDER_API_KEY: &str = "not-needed";
pub const DEFAULT_MODEL: &str = "local-model";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-nomic-embed-text-v1.5";

// ─────────────────────────────────────────────
// LocalServerKind
// ─────────────────────────────────────────────

/// Which local server implementation is on the other end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocalServerKind {
    LmStudio,
    Ollama,
    LlamaCpp,
}

impl LocalServerKind {
    pub const ALL: [LocalServerKind; 3] = [
        LocalServerKind::LmStudio,
        LocalServerKind::Ollama,
        LocalServerKind::LlamaCpp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LocalServerKind::LmStudio => "lmstudio",
            LocalServerKind::Ollama => "ollama",
            LocalServerKind::LlamaCpp => "llamacpp",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            LocalServerKind::LmStudio => "http://localhost:1234/v1",
            LocalServerKind::Ollama => "http://localhost:11434/v1",
            LocalServerKind::LlamaCpp => "http://localhost:8080/v1",
        }
    }

    /// llama.cpp's server rejects or ignores function calling.
    pub fn supports_tools(&self) -> bool {
        !matches!(self, LocalServerKind::LlamaCpp)
    }
}

impl fmt::Display for LocalServerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LocalServerKind {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        LocalServerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| {
                let valid: Vec<&str> = LocalServerKind::ALL.iter().map(|k| k.as_str()).collect();
                ProviderError::new(
                    "local",
                    format!("Unknown local provider type: {s}. Valid types: {}", valid.join(", ")),
                )
            })
    }
}

// ─────────────────────────────────────────────
// LocalProvider
// ─────────────────────────────────────────────

/// Adapter for a local OpenAI-compatible inference server.
#[derive(Debug)]
pub struct LocalProvider {
    base: BaseAdapter,
    kind: LocalServerKind,
    name: String,
}

impl LocalProvider {
    /// `provider_type` defaults to LM Studio; the URL falls back to
    /// `LOCAL_LLM_BASE_URL`, then the server kind's default.
    pub fn new(options: ProviderOptions) -> Result<Self, ProviderError> {
        let kind = match options.provider_type.as_deref() {
            Some(t) if !t.is_empty() => t.parse()?,
            _ => LocalServerKind::LmStudio,
        };
        let base_url = explicit_or_env(options.base_url.as_deref(), "LOCAL_LLM_BASE_URL")
            .unwrap_or_else(|| kind.default_base_url().to_string());
        let api_key = options
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| PLACEHOLDER_API_KEY.to_string());

        Ok(LocalProvider {
            base: BaseAdapter::new(
                &options,
                Some(api_key),
                base_url,
                DEFAULT_MODEL,
                DEFAULT_EMBEDDING_MODEL,
            ),
            kind,
            name: format!("local-{kind}"),
        })
    }

    pub fn kind(&self) -> LocalServerKind {
        self.kind
    }

    pub fn base_url(&self) -> &str {
        self.base.base_url()
    }

    /// Model ids the server reports; empty when the listing fails.
    pub async fn list_models(&self) -> Vec<String> {
        match self.fetch_models().await {
            Ok(models) => models,
            Err(e) => {
                debug!(provider = %self.name, error = %e, "Failed to list models");
                Vec::new()
            }
        }
    }

    async fn fetch_models(&self) -> Result<Vec<String>, ProviderError> {
        let raw = self
            .backend()
            .await?
            .get_json("models")
            .await
            .map_err(|e| self.map_error(e))?;
        wire::parse_model_ids(raw).map_err(|e| self.map_error(e))
    }

    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(key) = self.base.api_key() {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        headers
    }

    async fn backend(&self) -> Result<&HttpBackend, ProviderError> {
        self.base
            .client(|| self.headers())
            .await
            .map_err(|e| self.base.wrap_error(&self.name, "failed to initialise HTTP client", e))
    }

    fn request_body(
        &self,
        messages: &[Message],
        config: &GenerationConfig,
        stream: bool,
    ) -> Result<serde_json::Value, ProviderError> {
        let mut request = ChatCompletionRequest::build(
            self.base.convert_messages(messages),
            config,
            self.kind.supports_tools(),
        );
        if stream {
            request = request.streaming();
        }
        request
            .into_body()
            .map_err(|e| self.base.wrap_error(&self.name, "failed to encode request", e))
    }

    fn map_error(&self, err: BackendError) -> ProviderError {
        classify(&self.name, self.base.base_url(), err)
    }
}

/// Unreachable servers get an actionable message; everything else is generic.
fn classify(name: &str, base_url: &str, err: BackendError) -> ProviderError {
    if is_connection_failure(&err) {
        info!(provider = name, base_url, "Local LLM server is not reachable");
        return ProviderError::new(
            name,
            format!("Cannot connect to local LLM at {base_url}. Is the server running?"),
        )
        .with_source(err);
    }
    generic_error(name, err)
}

#[async_trait]
impl LlmProvider for LocalProvider {
    async fn complete(
        &self,
        messages: &[Message],
        config: Option<&GenerationConfig>,
    ) -> Result<LlmResponse, ProviderError> {
        let config = self.base.merge_config(config);
        let body = self.request_body(messages, &config, false)?;

        debug!(
            provider = %self.name,
            model = %config.model,
            messages = messages.len(),
            tools_supported = self.kind.supports_tools(),
            "Calling LLM"
        );

        let raw = self
            .backend()
            .await?
            .post_json("chat/completions", &body)
            .await
            .map_err(|e| self.map_error(e))?;
        wire::parse_chat_response(raw, &config.model).map_err(|e| self.map_error(e))
    }

    async fn stream(
        &self,
        messages: &[Message],
        config: Option<&GenerationConfig>,
    ) -> Result<TextStream, ProviderError> {
        let config = self.base.merge_config(config);
        let body = self.request_body(messages, &config, true)?;

        debug!(provider = %self.name, model = %config.model, "Opening completion stream");

        let response = self
            .backend()
            .await?
            .post_stream("chat/completions", &body)
            .await
            .map_err(|e| self.map_error(e))?;

        let name = self.name.clone();
        let base_url = self.base.base_url().to_string();
        Ok(sse_text_stream(response, wire::parse_stream_chunk, move |e| {
            classify(&name, &base_url, e)
        }))
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
        debug!(provider = %self.name, model, inputs = texts.len(), "Requesting embeddings");

        let result = self
            .backend()
            .await?
            .post_json("embeddings", &EmbeddingRequest { model, input: texts })
            .await
            .and_then(|raw| wire::parse_embeddings(raw, texts.len()));

        result.map_err(|e| {
            ProviderError::new(
                &self.name,
                format!("Embeddings not supported by {}: {e}", self.name),
            )
            .with_source(e)
        })
    }

    /// Reachable means the model listing answers; otherwise fall back to a ping.
    async fn health_check(&self) -> bool {
        match self.fetch_models().await {
            Ok(_) => true,
            Err(e) => {
                debug!(provider = %self.name, error = %e, "Model listing failed, trying ping");
                ping_health_check(self).await
            }
        }
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        !self.base.base_url().is_empty()
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
