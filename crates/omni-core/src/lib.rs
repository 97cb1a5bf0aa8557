//! Core types for the OMNI LLM layer.
//!
//! - [`types`]: the provider contract's value types (messages, config, responses)
//! - [`error`]: the single error taxonomy every adapter reports through
//! - [`config`]: on-disk settings + environment overrides
//! - [`utils`]: path helpers

pub mod config;
pub mod error;
pub mod types;
pub mod utils;

pub use error::{ErrorKind, ProviderError};
pub use types::{
    GenerationConfig, LlmResponse, Message, Role, ToolCall, ToolChoice, ToolDefinition, Usage,
};
