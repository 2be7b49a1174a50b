//! Model registry
//!
//! Maps logical model ids to a provider and provider-model pair, plus
//! pricing and capability metadata. Static mappings come from config and
//! are immutable for the life of the process; discovery mode unions them
//! with whatever the registered providers report, cached for a short TTL
//! under the shared slots `models:all` and `models:<id>`.


use crate::core::cache::CacheService;
use crate::core::providers::{LlmProvider, ProviderRegistry};
use crate::utils::error::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Capability flags on a model mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ModelCapabilities {
    /// Unary and streaming chat completion
    pub completion: bool,
    /// Text embeddings
    pub embedding: bool,
    /// Streaming delivery
    pub streaming: bool,
    /// Tool / function calling
    pub function_calling: bool,
    /// Image understanding
    pub vision: bool,
}

impl ModelCapabilities {
    /// Capabilities of a typical chat model
    pub fn chat() -> Self {
        Self {
            completion: true,
            streaming: true,
            function_calling: true,
            ..Default::default()
        }
    }

    /// Capabilities of an embedding-only model
    pub fn embedding_only() -> Self {
        Self {
            embedding: true,
            ..Default::default()
        }
    }
}

/// Registry entry linking a logical model id to a concrete backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMapping {
    /// Stable logical id exposed to clients
    pub model_id: String,
    /// Human-readable name
    pub display_name: String,
    /// Provider name, resolvable through the provider registry
    pub provider: String,
    /// Model id passed to the provider
    pub provider_model_id: String,
    /// Maximum context window in tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    /// Input price in USD per 1,000 tokens
    pub input_price_per_1k_tokens: f64,
    /// Output price in USD per 1,000 tokens
    pub output_price_per_1k_tokens: f64,
    /// Capability flags
    pub supports: ModelCapabilities,
    /// Free-form properties
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub properties: HashMap<String, String>,
}

impl ModelMapping {
    /// Minimal chat mapping with zero pricing (the cost engine falls back
    /// to configured defaults for unpriced models)
    pub fn chat(model_id: &str, provider: &str, provider_model_id: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            display_name: model_id.to_string(),
            provider: provider.to_string(),
            provider_model_id: provider_model_id.to_string(),
            context_window: None,
            input_price_per_1k_tokens: 0.0,
            output_price_per_1k_tokens: 0.0,
            supports: ModelCapabilities::chat(),
            properties: HashMap::new(),
        }
    }

    /// Set pricing per 1,000 tokens
    pub fn with_pricing(mut self, input: f64, output: f64) -> Self {
        self.input_price_per_1k_tokens = input;
        self.output_price_per_1k_tokens = output;
        self
    }

    /// Replace the capability flags
    pub fn with_capabilities(mut self, supports: ModelCapabilities) -> Self {
        self.supports = supports;
        self
    }
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Also consult providers for models missing from the static mappings
    pub discovery: bool,
    /// TTL for the discovery cache slots
    pub cache_ttl: Duration,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            discovery: false,
            cache_ttl: Duration::from_secs(30 * 60),
        }
    }
}

/// Process-wide model registry
pub struct ModelRegistry {
    mappings: HashMap<String, ModelMapping>,
    providers: Arc<ProviderRegistry>,
    cache: Arc<dyn CacheService>,
    config: RegistryConfig,
}

impl ModelRegistry {
    /// Build a registry from static mappings
    pub fn new(
        mappings: Vec<ModelMapping>,
        providers: Arc<ProviderRegistry>,
        cache: Arc<dyn CacheService>,
        config: RegistryConfig,
    ) -> Self {
        let mappings = mappings
            .into_iter()
            .map(|m| (m.model_id.clone(), m))
            .collect();
        Self {
            mappings,
            providers,
            cache,
            config,
        }
    }

    /// The provider registry backing discovery
    pub fn providers(&self) -> &Arc<ProviderRegistry> {
        &self.providers
    }

    /// Resolve a logical model id.
    ///
    /// Static mappings win; with discovery enabled, providers are consulted
    /// in registration order and the first match is cached.
    pub async fn get_model(&self, model_id: &str) -> Result<ModelMapping> {
        if let Some(mapping) = self.mappings.get(model_id) {
            return Ok(mapping.clone());
        }

        if !self.config.discovery {
            return Err(GatewayError::ModelNotFound(model_id.to_string()));
        }

        let key = format!("models:{}", model_id);
        if let Ok(Some(value)) = self.cache.get(&key).await {
            if let Ok(mapping) = serde_json::from_value::<ModelMapping>(value) {
                return Ok(mapping);
            }
        }

        for provider in self.providers.iter() {
            match provider.get_model(model_id).await {
                Ok(info) => {
                    let mapping = Self::discovered_mapping(provider.as_ref(), model_id, &info);
                    self.cache_mapping(&key, &mapping).await;
                    debug!(model = model_id, provider = provider.name(), "model discovered");
                    return Ok(mapping);
                }
                Err(_) => continue,
            }
        }

        Err(GatewayError::ModelNotFound(model_id.to_string()))
    }

    /// List every known model: static mappings unioned with discovered ones
    pub async fn list_models(&self) -> Result<Vec<ModelMapping>> {
        let mut models: Vec<ModelMapping> = self.mappings.values().cloned().collect();

        if self.config.discovery {
            if let Ok(Some(value)) = self.cache.get("models:all").await {
                if let Ok(discovered) = serde_json::from_value::<Vec<ModelMapping>>(value) {
                    models.extend(discovered);
                    models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
                    return Ok(models);
                }
            }

            let mut discovered = Vec::new();
            for provider in self.providers.iter() {
                match provider.list_models().await {
                    Ok(infos) => {
                        for info in infos {
                            let known_static = self.mappings.contains_key(&info.id);
                            let known_discovered =
                                discovered.iter().any(|m: &ModelMapping| m.model_id == info.id);
                            if !known_static && !known_discovered {
                                discovered.push(Self::discovered_mapping(
                                    provider.as_ref(),
                                    &info.id,
                                    &info,
                                ));
                            }
                        }
                    }
                    Err(err) => {
                        warn!(provider = provider.name(), %err, "model discovery failed");
                    }
                }
            }

            if let Ok(value) = serde_json::to_value(&discovered) {
                if let Err(err) = self
                    .cache
                    .set("models:all", value, self.config.cache_ttl)
                    .await
                {
                    warn!(%err, "failed to cache discovered models");
                }
            }
            models.extend(discovered);
        }

        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    async fn cache_mapping(&self, key: &str, mapping: &ModelMapping) {
        if let Ok(value) = serde_json::to_value(mapping) {
            if let Err(err) = self.cache.set(key, value, self.config.cache_ttl).await {
                warn!(key, %err, "failed to cache model mapping");
            }
        }
    }

    fn discovered_mapping(
        provider: &dyn LlmProvider,
        model_id: &str,
        info: &crate::core::providers::ModelInfo,
    ) -> ModelMapping {
        ModelMapping {
            model_id: model_id.to_string(),
            display_name: info.display_name.clone().unwrap_or_else(|| model_id.to_string()),
            provider: provider.name().to_string(),
            provider_model_id: info.id.clone(),
            context_window: info.context_window,
            // Discovered models carry no pricing; the cost engine's
            // fallback chain supplies it.
            input_price_per_1k_tokens: 0.0,
            output_price_per_1k_tokens: 0.0,
            supports: ModelCapabilities {
                completion: provider.supports_completion(),
                embedding: provider.supports_embedding(),
                streaming: provider.supports_streaming(),
                function_calling: provider.supports_function_calling(),
                vision: provider.supports_vision(),
            },
            properties: HashMap::new(),
        }
    }
}
