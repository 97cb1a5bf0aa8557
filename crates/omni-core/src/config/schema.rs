//! Configuration schema for the LLM layer.
//!
//! Hierarchy: `Config` → `LlmConfig` → `OpenAiSettings`, `AnthropicSettings`,
//! `LocalSettings`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::types::GenerationConfig;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration: loaded from `~/.omni/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub llm: LlmConfig,
}

// ─────────────────────────────────────────────
// LLM
// ─────────────────────────────────────────────

/// Which provider is active, plus per-provider settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LlmConfig {
    /// Active provider name or alias (`openai`, `anthropic`, `claude`, `local`, `ollama`, …).
    pub provider: String,
    /// Request timeout in seconds, passed to the HTTP transport.
    pub timeout: f64,
    /// Transport-level retries for transient failures.
    pub max_retries: u32,
    pub openai: OpenAiSettings,
    pub anthropic: AnthropicSettings,
    pub local: LocalSettings,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            timeout: 60.0,
            max_retries: 3,
            openai: OpenAiSettings::default(),
            anthropic: AnthropicSettings::default(),
            local: LocalSettings::default(),
        }
    }
}

/// OpenAI settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenAiSettings {
    /// API key; empty means "fall back to `OPENAI_API_KEY`".
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            organization: None,
            model: "gpt-4-turbo-preview".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Anthropic settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnthropicSettings {
    /// API key; empty means "fall back to `ANTHROPIC_API_KEY`".
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for AnthropicSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: None,
            model: "claude-3-sonnet-20240229".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Local OpenAI-compatible server settings (LM Studio, Ollama, llama.cpp).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalSettings {
    /// `lmstudio`, `ollama` or `llamacpp`.
    pub provider_type: String,
    /// Server URL; unset means the family's default local address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    pub temperature: f64,
}

impl Default for LocalSettings {
    fn default() -> Self {
        Self {
            provider_type: "lmstudio".to_string(),
            api_base: None,
            model: "local-model".to_string(),
            embedding_model: None,
            temperature: 0.7,
        }
    }
}

/// Coarse backend family a provider name belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Family {
    OpenAi,
    Anthropic,
    Local,
    Unknown,
}

fn family_of(provider: &str) -> Family {
    match provider {
        "openai" => Family::OpenAi,
        "anthropic" | "claude" => Family::Anthropic,
        "local" | "lmstudio" | "ollama" | "llamacpp" => Family::Local,
        _ => Family::Unknown,
    }
}

impl LlmConfig {
    /// Build the factory mapping for the active provider.
    ///
    /// Keys match `ProviderOptions` plus `provider`. Unknown provider names are
    /// passed through untouched so the factory can report what is registered.
    pub fn provider_options(&self) -> Map<String, Value> {
        let provider = self.provider.to_lowercase();
        let mut map = Map::new();
        map.insert("provider".into(), json!(provider));

        let family = family_of(&provider);
        if family == Family::Unknown {
            return map;
        }
        map.insert("timeout".into(), json!(self.timeout));
        map.insert("max_retries".into(), json!(self.max_retries));

        match family {
            Family::OpenAi => {
                let s = &self.openai;
                insert_non_empty(&mut map, "api_key", &s.api_key);
                insert_opt(&mut map, "base_url", s.api_base.as_deref());
                insert_opt(&mut map, "organization", s.organization.as_deref());
                map.insert("default_model".into(), json!(s.model));
                map.insert("default_embedding_model".into(), json!(s.embedding_model));
            }
            Family::Anthropic => {
                let s = &self.anthropic;
                insert_non_empty(&mut map, "api_key", &s.api_key);
                insert_opt(&mut map, "base_url", s.api_base.as_deref());
                map.insert("default_model".into(), json!(s.model));
            }
            Family::Local => {
                let s = &self.local;
                // An alias like "ollama" already names the family.
                if provider == "local" {
                    map.insert("provider_type".into(), json!(s.provider_type.to_lowercase()));
                }
                insert_opt(&mut map, "base_url", s.api_base.as_deref());
                insert_opt(&mut map, "default_embedding_model", s.embedding_model.as_deref());
                map.insert("default_model".into(), json!(s.model));
            }
            Family::Unknown => {}
        }

        map
    }

    /// Generation defaults (temperature, max tokens) of the active provider.
    pub fn generation_defaults(&self) -> GenerationConfig {
        let base = GenerationConfig::default();
        match family_of(&self.provider.to_lowercase()) {
            Family::OpenAi => base
                .with_temperature(self.openai.temperature)
                .with_max_tokens(self.openai.max_tokens),
            Family::Anthropic => base
                .with_temperature(self.anthropic.temperature)
                .with_max_tokens(self.anthropic.max_tokens),
            Family::Local => base.with_temperature(self.local.temperature),
            Family::Unknown => base,
        }
    }
}

fn insert_non_empty(map: &mut Map<String, Value>, key: &str, value: &str) {
    if !value.is_empty() {
        map.insert(key.into(), json!(value));
    }
}

fn insert_opt(map: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(v) = value.filter(|v| !v.is_empty()) {
        map.insert(key.into(), json!(v));
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
