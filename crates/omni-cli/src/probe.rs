//! `omni providers`, `omni health`, `omni models`.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::Value;

use omni_core::config::Config;
use omni_providers::{factory, LocalProvider, ProviderOptions};

use crate::helpers;
use crate::ProviderArgs;

/// Print every registered provider name.
pub fn list_providers() {
    println!();
    println!("{}", "Registered providers:".bold());
    for name in factory::list_providers() {
        println!("  {name}");
    }
    println!();
}

/// Construct the provider, check readiness, and report.
pub async fn health(config: &Config, args: &ProviderArgs) -> Result<()> {
    let provider = helpers::build_provider(config, args)?;
    let name = provider.provider_name().to_string();

    let available = provider.is_available();
    let healthy = available && provider.health_check().await;

    println!();
    println!("  {:<14} {}", "Provider:".bold(), name);
    println!("  {:<14} {}", "Configured:".bold(), helpers::mark(available));
    println!("  {:<14} {}", "Healthy:".bold(), helpers::mark(healthy));
    println!();

    if !healthy {
        bail!("provider {name} is not ready");
    }
    Ok(())
}

/// List the models a local server reports.
pub async fn models(config: &Config, args: &ProviderArgs) -> Result<()> {
    let mapping = helpers::provider_mapping(config, args);
    let provider_name = mapping.get("provider").and_then(Value::as_str).unwrap_or_default();

    let mut options: ProviderOptions = serde_json::from_value(Value::Object(mapping.clone()))
        .context("invalid provider options")?;
    if factory::LOCAL_ALIASES.contains(&provider_name) {
        options.provider_type = Some(provider_name.to_string());
    } else if provider_name != "local" {
        bail!("model listing is only available for local servers (got '{provider_name}')");
    }

    let provider = LocalProvider::new(options)?;
    let models = provider.list_models().await;

    println!();
    println!("{} {}", provider.base_url().cyan().bold(), format!("({})", provider.kind()).dimmed());
    if models.is_empty() {
        println!("  {}", "(no models reported; is the server running?)".dimmed());
    }
    for model in models {
        println!("  {model}");
    }
    println!();

    Ok(())
}
