//! Config loader: reads `~/.omni/config.json`, merges env vars, and
//! applies legacy migrations.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.omni/config.json`
//! 3. Environment variables `OMNI_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    migrate_config(&mut raw);

    let config: Config = match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply legacy config migrations.
///
/// - `llm.<section>.baseUrl` → `llm.<section>.apiBase`
/// - `llm.local.type` → `llm.local.providerType`
///
/// Existing new-style keys are never overwritten.
fn migrate_config(raw: &mut serde_json::Value) {
    let Some(llm) = raw.get_mut("llm") else {
        return;
    };

    for section in ["openai", "anthropic", "local"] {
        if let Some(obj) = llm.get_mut(section).and_then(|s| s.as_object_mut()) {
            if let Some(url) = obj.remove("baseUrl") {
                if !obj.contains_key("apiBase") {
                    obj.insert("apiBase".to_string(), url);
                    debug!("Migrated llm.{section}.baseUrl → llm.{section}.apiBase");
                }
            }
        }
    }

    if let Some(local) = llm.get_mut("local").and_then(|s| s.as_object_mut()) {
        if let Some(kind) = local.remove("type") {
            if !local.contains_key("providerType") {
                local.insert("providerType".to_string(), kind);
                debug!("Migrated llm.local.type → llm.local.providerType");
            }
        }
    }
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `OMNI_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `OMNI_LLM__PROVIDER` → `llm.provider`
/// - `OMNI_LLM__TIMEOUT` → `llm.timeout`
/// - `OMNI_LLM__MAX_RETRIES` → `llm.max_retries`
/// - `OMNI_LLM__<OPENAI|ANTHROPIC|LOCAL>__API_KEY` / `__API_BASE` / `__MODEL`
/// - `OMNI_LLM__LOCAL__PROVIDER_TYPE` → `llm.local.provider_type`
fn apply_env_overrides(mut config: Config) -> Config {
    let llm = &mut config.llm;

    if let Ok(val) = std::env::var("OMNI_LLM__PROVIDER") {
        llm.provider = val;
    }
    if let Ok(val) = std::env::var("OMNI_LLM__TIMEOUT") {
        if let Ok(t) = val.parse::<f64>() {
            llm.timeout = t;
        }
    }
    if let Ok(val) = std::env::var("OMNI_LLM__MAX_RETRIES") {
        if let Ok(n) = val.parse::<u32>() {
            llm.max_retries = n;
        }
    }

    // OpenAI
    if let Ok(val) = std::env::var("OMNI_LLM__OPENAI__API_KEY") {
        llm.openai.api_key = val;
    }
    if let Ok(val) = std::env::var("OMNI_LLM__OPENAI__API_BASE") {
        llm.openai.api_base = Some(val);
    }
    if let Ok(val) = std::env::var("OMNI_LLM__OPENAI__MODEL") {
        llm.openai.model = val;
    }

    // Anthropic
    if let Ok(val) = std::env::var("OMNI_LLM__ANTHROPIC__API_KEY") {
        llm.anthropic.api_key = val;
    }
    if let Ok(val) = std::env::var("OMNI_LLM__ANTHROPIC__API_BASE") {
        llm.anthropic.api_base = Some(val);
    }
    if let Ok(val) = std::env::var("OMNI_LLM__ANTHROPIC__MODEL") {
        llm.anthropic.model = val;
    }

    // Local
    if let Ok(val) = std::env::var("OMNI_LLM__LOCAL__PROVIDER_TYPE") {
        llm.local.provider_type = val;
    }
    if let Ok(val) = std::env::var("OMNI_LLM__LOCAL__API_BASE") {
        llm.local.api_base = Some(val);
    }
    if let Ok(val) = std::env::var("OMNI_LLM__LOCAL__MODEL") {
        llm.local.model = val;
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
