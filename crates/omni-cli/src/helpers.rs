//! Shared CLI helpers: path expansion, provider construction, output.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use colored::Colorize;
use serde_json::{Map, Value};

use omni_core::config::{Config, LlmConfig};
use omni_core::LlmResponse;
use omni_providers::{factory, LlmProvider};

use crate::ProviderArgs;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some("") => dirs_next::home_dir().unwrap_or_else(|| PathBuf::from(path)),
        Some(rest) if rest.starts_with('/') => match dirs_next::home_dir() {
            Some(home) => home.join(rest.trim_start_matches('/')),
            None => PathBuf::from(path),
        },
        _ => PathBuf::from(path),
    }
}

/// LLM settings with the selected provider: `--provider` wins over
/// `llm.provider`.
pub fn selected_llm(config: &Config, args: &ProviderArgs) -> LlmConfig {
    let mut llm = config.llm.clone();
    if let Some(name) = args.provider.as_deref().filter(|p| !p.is_empty()) {
        llm.provider = name.to_string();
    }
    llm
}

/// Factory mapping for the selected provider.
pub fn provider_mapping(config: &Config, args: &ProviderArgs) -> Map<String, Value> {
    selected_llm(config, args).provider_options()
}

/// Construct the selected provider through the factory.
pub fn build_provider(config: &Config, args: &ProviderArgs) -> Result<Arc<dyn LlmProvider>> {
    let mapping = provider_mapping(config, args);
    let name = mapping
        .get("provider")
        .and_then(Value::as_str)
        .unwrap_or(factory::DEFAULT_PROVIDER)
        .to_string();

    factory::from_config(&mapping).with_context(|| format!("failed to create provider '{name}'"))
}

/// ✓ / ✗ marker.
pub fn mark(ok: bool) -> String {
    if ok {
        "✓".green().to_string()
    } else {
        "✗".red().to_string()
    }
}

/// Print a completion to stdout, tool calls and usage included.
pub fn print_response(provider: &str, response: &LlmResponse) {
    println!();
    println!("{} {}", provider.cyan().bold(), response.model.dimmed());

    match &response.content {
        Some(text) if !text.is_empty() => println!("{text}"),
        _ if response.has_tool_calls() => {}
        _ => println!("{}", "(no response)".dimmed()),
    }

    for call in &response.tool_calls {
        println!("{} {}({})", "→".yellow(), call.name.bold(), call.arguments);
    }

    if let Some(usage) = response.usage {
        println!(
            "{}",
            format!(
                "tokens: {} prompt + {} completion = {}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            )
            .dimmed()
        );
    }
    println!();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_tilde_home() {
        let result = expand_tilde("~/foo/bar");
        assert!(result.ends_with("foo/bar"));
        assert!(!result.starts_with("~"));
    }

    #[test]
    fn expand_tilde_leaves_other_paths() {
        assert_eq!(expand_tilde("/absolute/path"), PathBuf::from("/absolute/path"));
        assert_eq!(expand_tilde("relative/path"), PathBuf::from("relative/path"));
        assert_eq!(expand_tilde("~user/x"), PathBuf::from("~user/x"));
    }

    #[test]
    fn provider_flag_overrides_config() {
        let config = Config::default();
        let args = ProviderArgs { provider: Some("Ollama".into()) };

        let mapping = provider_mapping(&config, &args);
        assert_eq!(mapping["provider"], "ollama");
        assert_eq!(mapping["default_model"], "local-model");
        assert!(mapping.get("provider_type").is_none());
    }

    #[test]
    fn config_provider_used_without_flag() {
        let mut config = Config::default();
        config.llm.provider = "anthropic".into();

        let mapping = provider_mapping(&config, &ProviderArgs::default());
        assert_eq!(mapping["provider"], "anthropic");
    }

    #[test]
    fn build_provider_reports_unknown_names() {
        let args = ProviderArgs { provider: Some("gemini".into()) };
        let err = build_provider(&Config::default(), &args)
            .err()
            .expect("unknown provider should be rejected");
        let chain = format!("{err:#}");
        assert!(chain.contains("failed to create provider 'gemini'"));
        assert!(chain.contains("Unknown provider: gemini"));
    }

    #[test]
    fn build_provider_local_alias() {
        let args = ProviderArgs { provider: Some("llamacpp".into()) };
        let provider = build_provider(&Config::default(), &args).unwrap();
        assert_eq!(provider.provider_name(), "local-llamacpp");
    }
}
