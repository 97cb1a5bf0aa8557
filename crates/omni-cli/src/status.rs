//! `omni status`: show configuration and provider status.

use anyhow::Result;
use colored::Colorize;

use omni_core::config::{get_config_path, Config};
use omni_providers::factory;

use crate::helpers;
use crate::ProviderArgs;

/// Run the status command.
pub fn run(config: &Config) -> Result<()> {
    let config_path = get_config_path();
    let llm = &config.llm;

    println!();
    println!("{}", "OMNI Status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".dimmed().to_string()
        }
    );
    println!("  {:<18} {}", "Active provider:".bold(), llm.provider);
    println!(
        "  {:<18} {}",
        "Transport:".bold(),
        format!("timeout {}s | retries {}", llm.timeout, llm.max_retries).dimmed()
    );

    // Providers
    println!();
    println!("  {}", "Providers:".bold());
    for (label, name, model, key_set) in [
        ("OpenAI", "openai", &llm.openai.model, !llm.openai.api_key.is_empty()),
        ("Anthropic", "anthropic", &llm.anthropic.model, !llm.anthropic.api_key.is_empty()),
        ("Local", "local", &llm.local.model, true),
    ] {
        let args = ProviderArgs { provider: Some(name.to_string()) };
        let detail = match helpers::build_provider(config, &args) {
            Ok(provider) if provider.is_available() => {
                format!("{} {}", helpers::mark(true), provider.provider_name())
            }
            Ok(_) if !key_set => format!("{}", "· no API key".dimmed()),
            Ok(_) => format!("{}", "· not configured".dimmed()),
            Err(e) => format!("{} {}", helpers::mark(false), format!("{e:#}").red()),
        };
        println!("    {:<12} {:<28} {}", label, model.dimmed(), detail);
    }

    println!();
    println!(
        "  {:<18} {}",
        "Registered:".bold(),
        factory::list_providers().into_iter().collect::<Vec<_>>().join(", ").dimmed()
    );
    println!();

    Ok(())
}
