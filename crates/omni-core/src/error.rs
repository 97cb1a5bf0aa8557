//! Provider error taxonomy.
//!
//! Every adapter reports failures as a [`ProviderError`]; backend-native
//! errors only ever appear as its `source`.

use thiserror::Error;

/// Boxed error kept as the diagnostic cause of a [`ProviderError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of a provider failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unclassified backend failure, unknown provider, or unsupported capability.
    Provider,
    /// Backend throttled the request (429).
    RateLimit,
    /// Missing or invalid credentials (401).
    Authentication,
    /// Input exceeded the model's context window.
    ContextLength,
}

/// The one error type that crosses the provider contract boundary.
#[derive(Debug, Error)]
#[error("[{provider}] {message}")]
pub struct ProviderError {
    kind: ErrorKind,
    message: String,
    provider: String,
    status: Option<u16>,
    #[source]
    source: Option<BoxError>,
}

impl ProviderError {
    /// Generic provider error.
    pub fn new(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError {
            kind: ErrorKind::Provider,
            message: message.into(),
            provider: provider.into(),
            status: None,
            source: None,
        }
    }

    pub fn rate_limited(provider: impl Into<String>) -> Self {
        ProviderError {
            kind: ErrorKind::RateLimit,
            status: Some(429),
            ..Self::new(provider, "Rate limit exceeded")
        }
    }

    pub fn authentication(provider: impl Into<String>) -> Self {
        ProviderError {
            kind: ErrorKind::Authentication,
            status: Some(401),
            ..Self::new(provider, "Authentication failed - check your API key")
        }
    }

    pub fn context_length(provider: impl Into<String>) -> Self {
        ProviderError {
            kind: ErrorKind::ContextLength,
            ..Self::new(provider, "Context length exceeded")
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Name of the provider that produced the error.
    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn is_rate_limit(&self) -> bool {
        self.kind == ErrorKind::RateLimit
    }

    pub fn is_authentication(&self) -> bool {
        self.kind == ErrorKind::Authentication
    }

    pub fn is_context_length(&self) -> bool {
        self.kind == ErrorKind::ContextLength
    }

    /// Whether the caller may reasonably try again later.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ErrorKind::RateLimit => true,
            ErrorKind::Provider => self.status.is_some_and(|s| s >= 500),
            ErrorKind::Authentication | ErrorKind::ContextLength => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_generic_error() {
        let err = ProviderError::new("openai", "boom");
        assert_eq!(err.kind(), ErrorKind::Provider);
        assert_eq!(err.provider(), "openai");
        assert_eq!(err.message(), "boom");
        assert!(err.status().is_none());
        assert_eq!(err.to_string(), "[openai] boom");
    }

    #[test]
    fn test_rate_limited_carries_429() {
        let err = ProviderError::rate_limited("anthropic");
        assert!(err.is_rate_limit());
        assert_eq!(err.status(), Some(429));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_authentication_carries_401() {
        let err = ProviderError::authentication("openai");
        assert!(err.is_authentication());
        assert_eq!(err.status(), Some(401));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_context_length_has_no_status() {
        let err = ProviderError::context_length("openai");
        assert!(err.is_context_length());
        assert!(err.status().is_none());
    }

    #[test]
    fn test_source_is_preserved() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = ProviderError::new("local-ollama", "cannot connect").with_source(io);
        let source = err.source().expect("source kept");
        assert!(source.to_string().contains("refused"));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        assert!(ProviderError::new("openai", "bad gateway").with_status(502).is_retryable());
        assert!(!ProviderError::new("openai", "bad request").with_status(400).is_retryable());
        assert!(!ProviderError::new("openai", "unknown").is_retryable());
    }
}
