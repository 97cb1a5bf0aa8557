//! LLM provider layer for OMNI.
//!
//! One contract, several backends. Callers depend on [`LlmProvider`] and get
//! concrete adapters from the [`factory`].
//!
//! # Architecture
//!
//! - [`traits::LlmProvider`]: contract every adapter implements
//! - [`base::BaseAdapter`]: shared construction state, config merging, message conversion
//! - [`client::HttpBackend`]: pooled HTTP transport with retries and SSE streaming
//! - [`openai`], [`anthropic`], [`local`]: concrete adapters (cargo features of the same name)
//! - [`factory`]: name → constructor registry

pub mod base;
pub mod client;
pub mod factory;
pub mod traits;

#[cfg(feature = "anthropic")]
pub mod anthropic;
#[cfg(feature = "local")]
pub mod local;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "openai")]
pub mod wire;

// Re-export main types for convenience
pub use base::{BaseAdapter, ProviderOptions};
pub use factory::{ProviderConstructor, ProviderRegistry};
pub use traits::{LlmProvider, TextStream};

#[cfg(feature = "anthropic")]
pub use anthropic::AnthropicProvider;
#[cfg(feature = "local")]
pub use local::{LocalProvider, LocalServerKind};
#[cfg(feature = "openai")]
pub use openai::OpenAiProvider;
