//! `omni complete` and `omni embed`.

use std::io::Write;

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use futures_util::StreamExt;
use tracing::info;

use omni_core::config::Config;
use omni_core::{GenerationConfig, Message};

use crate::helpers;
use crate::ProviderArgs;

#[derive(Args, Debug)]
pub struct CompleteArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// User prompt
    pub prompt: String,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Model (defaults to the provider's default model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Sampling temperature
    #[arg(short, long)]
    pub temperature: Option<f64>,

    /// Maximum output tokens
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// Print fragments as they arrive
    #[arg(long, default_value_t = false)]
    pub stream: bool,
}

#[derive(Args, Debug)]
pub struct EmbedArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Texts to embed
    #[arg(required = true)]
    pub texts: Vec<String>,

    /// Embedding model (defaults to the provider's embedding model)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Print full vectors as JSON instead of a summary
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Conversation and generation options from the command line, on top of the
/// configured defaults.
fn request_from(config: &Config, args: &CompleteArgs) -> (Vec<Message>, GenerationConfig) {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = args.system.as_deref().filter(|s| !s.is_empty()) {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(args.prompt.as_str()));

    let mut generation = helpers::selected_llm(config, &args.provider).generation_defaults();
    if let Some(model) = &args.model {
        generation = generation.with_model(model.as_str());
    }
    if let Some(temperature) = args.temperature {
        generation = generation.with_temperature(temperature);
    }
    if let Some(max_tokens) = args.max_tokens {
        generation = generation.with_max_tokens(max_tokens);
    }

    (messages, generation)
}

/// Run a completion, streamed or whole.
pub async fn complete(config: &Config, args: CompleteArgs) -> Result<()> {
    let provider = helpers::build_provider(config, &args.provider)?;
    let (messages, generation) = request_from(config, &args);

    info!(provider = provider.provider_name(), stream = args.stream, "Running completion");

    if !args.stream {
        let response = provider
            .complete(&messages, Some(&generation))
            .await
            .context("completion failed")?;
        helpers::print_response(provider.provider_name(), &response);
        return Ok(());
    }

    let mut stream = provider
        .stream(&messages, Some(&generation))
        .await
        .context("failed to open stream")?;

    println!();
    let mut stdout = std::io::stdout();
    while let Some(fragment) = stream.next().await {
        let text = fragment.context("stream interrupted")?;
        write!(stdout, "{text}")?;
        stdout.flush()?;
    }
    println!();
    println!();

    Ok(())
}

/// Embed texts and print the vectors.
pub async fn embed(config: &Config, args: EmbedArgs) -> Result<()> {
    let provider = helpers::build_provider(config, &args.provider)?;

    let vectors = provider
        .embed(&args.texts, args.model.as_deref())
        .await
        .context("embedding failed")?;

    if vectors.len() != args.texts.len() {
        bail!(
            "provider returned {} vectors for {} inputs",
            vectors.len(),
            args.texts.len()
        );
    }

    if args.json {
        println!("{}", serde_json::to_string(&vectors)?);
        return Ok(());
    }

    let model = args.model.as_deref().unwrap_or(provider.default_embedding_model());
    println!();
    println!("{} {}", provider.provider_name().cyan().bold(), model.dimmed());
    for (text, vector) in args.texts.iter().zip(&vectors) {
        let preview: Vec<String> = vector.iter().take(4).map(|v| format!("{v:.4}")).collect();
        println!(
            "  {:<32} dim={} [{}, …]",
            truncate(text, 32),
            vector.len(),
            preview.join(", ")
        );
    }
    println!();

    Ok(())
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn args(prompt: &str) -> CompleteArgs {
        CompleteArgs {
            provider: ProviderArgs::default(),
            prompt: prompt.to_string(),
            system: None,
            model: None,
            temperature: None,
            max_tokens: None,
            stream: false,
        }
    }

    #[test]
    fn request_uses_configured_defaults() {
        let (messages, generation) = request_from(&Config::default(), &args("hi"));

        assert_eq!(messages, vec![Message::user("hi")]);
        assert!(generation.model.is_empty());
        assert_eq!(generation.max_tokens, Some(4096));
    }

    #[test]
    fn request_flags_override_defaults() {
        let mut a = args("hi");
        a.system = Some("be brief".into());
        a.model = Some("gpt-4o".into());
        a.temperature = Some(0.1);
        a.max_tokens = Some(32);

        let (messages, generation) = request_from(&Config::default(), &a);
        assert_eq!(messages[0], Message::system("be brief"));
        assert_eq!(generation.model, "gpt-4o");
        assert_eq!(generation.temperature, 0.1);
        assert_eq!(generation.max_tokens, Some(32));
    }

    #[test]
    fn request_defaults_follow_provider_flag() {
        let mut config = Config::default();
        config.llm.provider = "openai".into();
        config.llm.openai.temperature = 0.2;
        config.llm.local.temperature = 0.9;

        let mut a = args("hi");
        a.provider.provider = Some("ollama".into());

        let (_, generation) = request_from(&config, &a);
        assert_eq!(generation.temperature, 0.9);
        assert_eq!(generation.max_tokens, None);
    }

    #[test]
    fn truncate_long_text() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }
}
