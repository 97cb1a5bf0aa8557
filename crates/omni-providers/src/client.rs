//! Backend HTTP transport shared by every adapter.
//!
//! [`HttpBackend`] owns timeout and retry policy for one backend endpoint and
//! reports failures as a structured [`BackendError`] (status, connect/timeout,
//! decoding) so adapters classify on data rather than on free text alone.
//! `BackendError` never crosses the provider contract; adapters map it into a
//! `ProviderError`.

use std::future;
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use omni_core::ProviderError;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::traits::TextStream;

/// First retry delay; doubles per attempt.
const BASE_BACKOFF: Duration = Duration::from_millis(500);
/// Upper bound for a single retry delay.
const MAX_BACKOFF: Duration = Duration::from_secs(8);

// ─────────────────────────────────────────────
// BackendError
// ─────────────────────────────────────────────

/// A failure talking to a backend, before classification.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("connection error: {0}")]
    Connect(#[source] reqwest::Error),

    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("unexpected response: {0}")]
    Invalid(String),

    #[error("stream error: {0}")]
    Stream(String),
}

impl BackendError {
    /// HTTP status, when the backend answered with one.
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The server could not be reached at all.
    pub fn is_connect(&self) -> bool {
        matches!(self, BackendError::Connect(_))
    }

    /// Worth retrying at the transport level.
    fn is_transient(&self) -> bool {
        match self {
            BackendError::Connect(_) | BackendError::Timeout(_) => true,
            BackendError::Status { status, .. } => {
                matches!(status, 408 | 409 | 429) || *status >= 500
            }
            _ => false,
        }
    }

    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            BackendError::Connect(err)
        } else if err.is_timeout() {
            BackendError::Timeout(err)
        } else {
            BackendError::Transport(err)
        }
    }
}

// ─────────────────────────────────────────────
// HttpBackend
// ─────────────────────────────────────────────

/// HTTP client bound to one backend base URL.
///
/// Built once per adapter and reused (connection-pooled).
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
}

impl std::fmt::Debug for HttpBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackend")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

impl HttpBackend {
    /// Build a client sending `headers` on every request.
    pub fn new(
        base_url: &str,
        headers: HeaderMap,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(BackendError::Build)?;

        Ok(HttpBackend {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Join the base URL and a relative endpoint path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// POST a JSON body and decode a JSON reply.
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<serde_json::Value, BackendError> {
        let url = self.url(path);
        let response = self.send(|| self.client.post(&url).json(body)).await?;
        response.json().await.map_err(BackendError::Decode)
    }

    /// POST a JSON body and hand back the open response for streaming.
    pub async fn post_stream<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, BackendError> {
        let url = self.url(path);
        self.send(|| self.client.post(&url).json(body)).await
    }

    /// GET a JSON document.
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value, BackendError> {
        let url = self.url(path);
        let response = self.send(|| self.client.get(&url)).await?;
        response.json().await.map_err(BackendError::Decode)
    }

    /// Send a request, retrying transient failures with exponential backoff.
    async fn send<F>(&self, build: F) -> Result<Response, BackendError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let err = match build().send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "Failed to read error body".to_string());
                    BackendError::Status { status, body }
                }
                Err(e) => BackendError::from_reqwest(e),
            };

            if attempt >= self.max_retries || !err.is_transient() {
                return Err(err);
            }

            let delay = backoff(attempt);
            warn!(
                base_url = %self.base_url,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient backend failure, retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

fn backoff(attempt: u32) -> Duration {
    BASE_BACKOFF
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_BACKOFF)
}

// ─────────────────────────────────────────────
// Server-sent events → text stream
// ─────────────────────────────────────────────

/// What one SSE event contributes to a text stream.
#[derive(Debug)]
pub enum SseChunk {
    Text(String),
    Skip,
    Done,
    Error(BackendError),
}

/// Turn an SSE response into a lazy stream of text fragments.
///
/// `parse` receives each event's name and data. The stream ends at the first
/// [`SseChunk::Done`] or when the body ends; dropping it closes the connection.
pub fn sse_text_stream<P, M>(response: Response, mut parse: P, map_err: M) -> TextStream
where
    P: FnMut(&str, &str) -> SseChunk + Send + 'static,
    M: Fn(BackendError) -> ProviderError + Send + Sync + 'static,
{
    let stream = response
        .bytes_stream()
        .eventsource()
        .map(move |event| match event {
            Ok(event) => parse(&event.event, &event.data),
            Err(e) => SseChunk::Error(BackendError::Stream(e.to_string())),
        })
        .take_while(|chunk| future::ready(!matches!(chunk, SseChunk::Done)))
        .filter_map(move |chunk| {
            future::ready(match chunk {
                SseChunk::Text(text) => Some(Ok(text)),
                SseChunk::Skip | SseChunk::Done => None,
                SseChunk::Error(e) => {
                    debug!(error = %e, "Stream event reported an error");
                    Some(Err(map_err(e)))
                }
            })
        });

    Box::pin(stream)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
