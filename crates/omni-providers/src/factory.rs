//! Provider factory: maps provider names to adapter constructors.
//!
//! A [`ProviderRegistry`] can be owned directly; the free functions operate on
//! a process-wide registry seeded with the built-in adapters. Names are
//! case-insensitive and stored lowercased.
//!
//! ```no_run
//! use omni_providers::factory;
//! use omni_providers::ProviderOptions;
//!
//! let provider = factory::create("ollama", ProviderOptions::new()).unwrap();
//! assert_eq!(provider.provider_name(), "local-ollama");
//! ```

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use omni_core::ProviderError;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::base::ProviderOptions;
use crate::traits::LlmProvider;

/// Provider used by [`ProviderRegistry::from_config`] when none is named.
pub const DEFAULT_PROVIDER: &str = "openai";

/// Names that construct the local adapter with a fixed server kind.
pub const LOCAL_ALIASES: [&str; 3] = ["lmstudio", "ollama", "llamacpp"];

/// Older option keys accepted by `from_config`, with their replacements.
const LEGACY_KEYS: [(&str, &str); 2] = [
    ("model", "default_model"),
    ("embedding_model", "default_embedding_model"),
];

/// Builds a provider from construction options.
pub type ProviderConstructor =
    Arc<dyn Fn(ProviderOptions) -> Result<Arc<dyn LlmProvider>, ProviderError> + Send + Sync>;

// ─────────────────────────────────────────────
// ProviderRegistry
// ─────────────────────────────────────────────

/// Name → constructor table.
#[derive(Clone)]
pub struct ProviderRegistry {
    constructors: HashMap<String, ProviderConstructor>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list_providers())
            .finish()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl ProviderRegistry {
    /// A registry with no providers.
    pub fn empty() -> Self {
        ProviderRegistry { constructors: HashMap::new() }
    }

    /// A registry with every built-in name: `openai`, `anthropic`, `claude`,
    /// `local`, `lmstudio`, `ollama`, `llamacpp`.
    ///
    /// Names whose adapter was compiled out stay registered and fail at
    /// construction, naming the missing cargo feature.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();

        #[cfg(feature = "openai")]
        registry.register("openai", |options| {
            Ok(shared(crate::openai::OpenAiProvider::new(options)))
        });
        #[cfg(not(feature = "openai"))]
        registry.register("openai", missing_feature("openai", "openai"));

        for name in ["anthropic", "claude"] {
            #[cfg(feature = "anthropic")]
            registry.register(name, |options| {
                Ok(shared(crate::anthropic::AnthropicProvider::new(options)))
            });
            #[cfg(not(feature = "anthropic"))]
            registry.register(name, missing_feature(name, "anthropic"));
        }

        for name in std::iter::once("local").chain(LOCAL_ALIASES) {
            #[cfg(feature = "local")]
            registry.register(name, |options| {
                Ok(shared(crate::local::LocalProvider::new(options)?))
            });
            #[cfg(not(feature = "local"))]
            registry.register(name, missing_feature(name, "local"));
        }

        registry
    }

    /// Register (or replace) a constructor under `name`.
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn(ProviderOptions) -> Result<Arc<dyn LlmProvider>, ProviderError>
            + Send
            + Sync
            + 'static,
    {
        let key = name.to_lowercase();
        if self.constructors.insert(key.clone(), Arc::new(constructor)).is_some() {
            debug!(provider = %key, "Replaced provider constructor");
        }
    }

    /// Registered names, sorted.
    pub fn list_providers(&self) -> BTreeSet<String> {
        self.constructors.keys().cloned().collect()
    }

    /// Construct the provider registered under `name`.
    ///
    /// For the local-server aliases the name itself is the server kind and
    /// overrides any `provider_type` in `options`.
    pub fn create(
        &self,
        name: &str,
        mut options: ProviderOptions,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let key = name.to_lowercase();
        let constructor = self.constructors.get(&key).ok_or_else(|| {
            let available: Vec<String> = self.list_providers().into_iter().collect();
            ProviderError::new(
                "factory",
                format!("Unknown provider: {name}. Available: {}", available.join(", ")),
            )
        })?;

        if LOCAL_ALIASES.contains(&key.as_str()) {
            options.provider_type = Some(key.clone());
        }

        debug!(provider = %key, "Creating LLM provider");
        constructor(options)
    }

    /// Construct a provider from a flat configuration mapping.
    ///
    /// `provider` selects the adapter (default `openai`); the remaining keys
    /// become [`ProviderOptions`]. Legacy `model` / `embedding_model` keys are
    /// honoured when the new key is absent.
    pub fn from_config(
        &self,
        config: &Map<String, Value>,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let (name, options) = split_config(config)?;
        self.create(&name, options)
    }

    /// Construct a provider and verify it can serve requests.
    pub async fn create_with_health_check(
        &self,
        name: &str,
        options: ProviderOptions,
    ) -> Result<Arc<dyn LlmProvider>, ProviderError> {
        let provider = self.create(name, options)?;
        verify_ready(name, provider).await
    }
}

fn shared<P: LlmProvider + 'static>(provider: P) -> Arc<dyn LlmProvider> {
    Arc::new(provider)
}

#[cfg(not(all(feature = "openai", feature = "anthropic", feature = "local")))]
fn missing_feature(
    name: &'static str,
    feature: &'static str,
) -> impl Fn(ProviderOptions) -> Result<Arc<dyn LlmProvider>, ProviderError> + Send + Sync + 'static
{
    move |_| {
        Err(ProviderError::new(
            name,
            format!(
                "Provider {name} is not compiled in; enable the `{feature}` feature of omni-providers"
            ),
        ))
    }
}

fn split_config(config: &Map<String, Value>) -> Result<(String, ProviderOptions), ProviderError> {
    let mut config = config.clone();

    let name = match config.remove("provider") {
        Some(Value::String(name)) if !name.is_empty() => name,
        Some(Value::String(_)) | Some(Value::Null) | None => DEFAULT_PROVIDER.to_string(),
        Some(other) => {
            return Err(ProviderError::new(
                "factory",
                format!("provider must be a string, got {other}"),
            ))
        }
    };

    for (old, new) in LEGACY_KEYS {
        if config.contains_key(old) && !config.contains_key(new) {
            if let Some(value) = config.remove(old) {
                config.insert(new.to_string(), value);
            }
        }
    }

    let options = serde_json::from_value(Value::Object(config)).map_err(|e| {
        ProviderError::new(name.as_str(), format!("Invalid provider options: {e}")).with_source(e)
    })?;
    Ok((name, options))
}

async fn verify_ready(
    name: &str,
    provider: Arc<dyn LlmProvider>,
) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    if !provider.is_available() {
        warn!(provider = name, "Provider is missing configuration");
        return Err(ProviderError::new(
            name,
            format!("Provider {name} is not available (missing configuration)"),
        ));
    }
    if !provider.health_check().await {
        warn!(provider = name, "Provider failed its health check");
        return Err(ProviderError::new(name, format!("Provider {name} health check failed")));
    }
    info!(provider = %provider.provider_name(), "Provider ready");
    Ok(provider)
}

// ─────────────────────────────────────────────
// Process-wide registry
// ─────────────────────────────────────────────

static REGISTRY: LazyLock<RwLock<ProviderRegistry>> =
    LazyLock::new(|| RwLock::new(ProviderRegistry::with_builtins()));

/// Register (or replace) a constructor in the process-wide registry.
pub fn register<F>(name: &str, constructor: F)
where
    F: Fn(ProviderOptions) -> Result<Arc<dyn LlmProvider>, ProviderError> + Send + Sync + 'static,
{
    REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(name, constructor);
}

/// Construct a provider from the process-wide registry.
pub fn create(name: &str, options: ProviderOptions) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .create(name, options)
}

/// Construct a provider from a flat configuration mapping.
pub fn from_config(config: &Map<String, Value>) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .from_config(config)
}

/// Names in the process-wide registry, sorted.
pub fn list_providers() -> BTreeSet<String> {
    REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .list_providers()
}

/// Construct from the process-wide registry and verify readiness.
pub async fn create_with_health_check(
    name: &str,
    options: ProviderOptions,
) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    // The lock guard must not live across the health-check await.
    let provider = create(name, options)?;
    verify_ready(name, provider).await
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
