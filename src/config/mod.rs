//! Gateway configuration
//!
//! Aggregates the per-component config sections into one serde-loadable
//! document. Every section has workable defaults; a YAML file only needs
//! to override what it cares about.

use crate::core::cache::ResponseCacheConfig;
use crate::core::cost::CostConfig;
use crate::core::filter::FilterConfig;
use crate::core::registry::{ModelMapping, RegistryConfig};
use crate::core::router::{FallbackPolicy, FallbackRoutes};
use crate::core::types::ErrorCode;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Serde-friendly form of the fallback route tables
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FallbackRoutesConfig {
    /// (error code, model) -> fallback model ids
    #[serde(default)]
    pub by_code: HashMap<ErrorCode, HashMap<String, Vec<String>>>,
    /// model -> fallback model ids for any error code
    #[serde(default)]
    pub general: HashMap<String, Vec<String>>,
    /// Last-resort chain
    #[serde(default)]
    pub default_chain: Vec<String>,
}

impl FallbackRoutesConfig {
    /// Build the runtime route tables
    pub fn into_routes(self) -> FallbackRoutes {
        let mut routes = FallbackRoutes::new().with_default_chain(self.default_chain);
        for (code, models) in self.by_code {
            for (model, fallbacks) in models {
                routes = routes.add_for_code(code, &model, fallbacks);
            }
        }
        for (model, fallbacks) in self.general {
            routes = routes.add_general(&model, fallbacks);
        }
        routes
    }
}

/// Usage ledger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageConfig {
    /// Records older than this are eligible for purge
    pub retention: Duration,
    /// Cadence of the retention sweep; run at least daily
    pub sweep_interval: Duration,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(90 * 24 * 3600),
            sweep_interval: Duration::from_secs(24 * 3600),
        }
    }
}

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Static model mappings
    #[serde(default)]
    pub models: Vec<ModelMapping>,
    /// Model registry behavior
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Response cache
    #[serde(default)]
    pub cache: ResponseCacheConfig,
    /// Content filter
    #[serde(default)]
    pub filter: FilterConfig,
    /// Fallback retry policy
    #[serde(default)]
    pub fallback: FallbackPolicy,
    /// Fallback route tables
    #[serde(default)]
    pub fallback_routes: FallbackRoutesConfig,
    /// Cost and budgets
    #[serde(default)]
    pub cost: CostConfig,
    /// Usage ledger retention
    #[serde(default)]
    pub usage: UsageConfig,
    /// Per-provider-call timeout
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout: Duration,
}

fn default_provider_timeout() -> Duration {
    Duration::from_secs(60)
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            models: Vec::new(),
            registry: RegistryConfig::default(),
            cache: ResponseCacheConfig::default(),
            filter: FilterConfig::default(),
            fallback: FallbackPolicy::default(),
            fallback_routes: FallbackRoutesConfig::default(),
            cost: CostConfig::default(),
            usage: UsageConfig::default(),
            provider_timeout: default_provider_timeout(),
        }
    }
}

impl GatewayConfig {
    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }
}
