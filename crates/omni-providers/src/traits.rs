//! The provider contract every LLM backend adapter implements.
//!
//! Callers hold an `Arc<dyn LlmProvider>` and never learn which backend sits
//! behind it. All failures come back as [`ProviderError`].

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use omni_core::types::{GenerationConfig, LlmResponse, Message};
use omni_core::ProviderError;
use tracing::debug;

/// Lazy, finite, ordered sequence of generated text fragments.
///
/// The backend request is already open when this is handed out; fragments are
/// produced as they arrive and the connection is released on drop.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Token budget for the default health-check ping.
const PING_MAX_TOKENS: u32 = 5;

/// Trait that all LLM providers must implement.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Produce one complete response.
    ///
    /// `config = None` means "all defaults"; an empty `config.model` resolves
    /// to [`default_model`](LlmProvider::default_model).
    async fn complete(
        &self,
        messages: &[Message],
        config: Option<&GenerationConfig>,
    ) -> Result<LlmResponse, ProviderError>;

    /// Produce the response incrementally as text fragments.
    ///
    /// Errors raised while opening the request surface here; errors raised
    /// mid-stream surface as an `Err` item.
    async fn stream(
        &self,
        messages: &[Message],
        config: Option<&GenerationConfig>,
    ) -> Result<TextStream, ProviderError>;

    /// One vector per input text, in input order.
    async fn embed(
        &self,
        texts: &[String],
        model: Option<&str>,
    ) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Whether the backend can currently serve requests. Never fails.
    async fn health_check(&self) -> bool {
        ping_health_check(self).await
    }

    /// Stable identifier, e.g. `"openai"` or `"local-ollama"`.
    fn provider_name(&self) -> &str;

    /// Whether the adapter has enough configuration to attempt calls.
    fn is_available(&self) -> bool;

    fn default_model(&self) -> &str;

    fn default_embedding_model(&self) -> &str;
}

/// Minimal completion probe: one user `"ping"` on the default model.
///
/// Healthy means the call succeeded and produced text content.
pub async fn ping_health_check<P>(provider: &P) -> bool
where
    P: LlmProvider + ?Sized,
{
    let config = GenerationConfig::default()
        .with_model(provider.default_model())
        .with_max_tokens(PING_MAX_TOKENS);

    match provider.complete(&[Message::user("ping")], Some(&config)).await {
        Ok(response) => response.content.is_some(),
        Err(e) => {
            debug!(provider = provider.provider_name(), error = %e, "Health check failed");
            false
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted provider recording the config of every call.
    struct Scripted {
        reply: Result<Option<String>, ()>,
        seen: Mutex<Vec<GenerationConfig>>,
    }

    impl Scripted {
        fn new(reply: Result<Option<String>, ()>) -> Self {
            Scripted { reply, seen: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        async fn complete(
            &self,
            _messages: &[Message],
            config: Option<&GenerationConfig>,
        ) -> Result<LlmResponse, ProviderError> {
            self.seen.lock().unwrap().push(config.cloned().unwrap_or_default());
            match &self.reply {
                Ok(content) => Ok(LlmResponse { content: content.clone(), ..Default::default() }),
                Err(()) => Err(ProviderError::new("scripted", "boom")),
            }
        }

        async fn stream(
            &self,
            _messages: &[Message],
            _config: Option<&GenerationConfig>,
        ) -> Result<TextStream, ProviderError> {
            Err(ProviderError::new("scripted", "no streaming"))
        }

        async fn embed(
            &self,
            _texts: &[String],
            _model: Option<&str>,
        ) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(Vec::new())
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }

        fn default_embedding_model(&self) -> &str {
            "scripted-embed"
        }
    }

    #[tokio::test]
    async fn test_health_check_pings_default_model() {
        let provider = Scripted::new(Ok(Some("pong".into())));
        assert!(provider.health_check().await);

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].model, "scripted-model");
        assert_eq!(seen[0].max_tokens, Some(PING_MAX_TOKENS));
    }

    #[tokio::test]
    async fn test_health_check_false_without_content() {
        let provider = Scripted::new(Ok(None));
        assert!(!provider.health_check().await);
    }

    #[tokio::test]
    async fn test_health_check_swallows_errors() {
        let provider = Scripted::new(Err(()));
        assert!(!provider.health_check().await);
    }

    #[tokio::test]
    async fn test_health_check_through_trait_object() {
        let provider: Box<dyn LlmProvider> = Box::new(Scripted::new(Ok(Some("ok".into()))));
        assert!(provider.health_check().await);
    }
}
