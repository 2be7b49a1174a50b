//! Fallback route configuration and retry policy
//!
//! Fallback lists are resolved in priority order:
//! 1. the list configured for the exact (model, error code) pair
//! 2. the model's general fallback list
//! 3. the global default chain
//! 4. empty — the error surfaces as-is

use crate::core::types::ErrorCode;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Fallback route tables
///
/// Uses `RwLock` to allow concurrent reads and exclusive writes during
/// configuration.
#[derive(Debug, Default)]
pub struct FallbackRoutes {
    /// (error code, model) -> fallback model ids
    by_code: RwLock<HashMap<ErrorCode, HashMap<String, Vec<String>>>>,
    /// model -> fallback model ids, any error code
    general: RwLock<HashMap<String, Vec<String>>>,
    /// Last-resort chain for models with no configured fallbacks
    default_chain: RwLock<Vec<String>>,
}

impl FallbackRoutes {
    /// Create an empty route table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add fallbacks for a model under a specific error code (builder pattern)
    pub fn add_for_code(self, code: ErrorCode, model: &str, fallbacks: Vec<String>) -> Self {
        self.by_code
            .write()
            .entry(code)
            .or_default()
            .insert(model.to_string(), fallbacks);
        self
    }

    /// Add general fallbacks for a model (builder pattern)
    pub fn add_general(self, model: &str, fallbacks: Vec<String>) -> Self {
        self.general.write().insert(model.to_string(), fallbacks);
        self
    }

    /// Set the global default chain (builder pattern)
    pub fn with_default_chain(self, fallbacks: Vec<String>) -> Self {
        *self.default_chain.write() = fallbacks;
        self
    }

    /// Resolve the fallback list for a (model, error code) pair.
    ///
    /// Ordering is deterministic: lists are returned exactly as configured.
    pub fn resolve(&self, model: &str, code: ErrorCode) -> Vec<String> {
        if let Some(list) = self
            .by_code
            .read()
            .get(&code)
            .and_then(|models| models.get(model))
        {
            return list.clone();
        }
        if let Some(list) = self.general.read().get(model) {
            return list.clone();
        }
        self.default_chain.read().clone()
    }
}

/// Bounded-retry policy for the fallback loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackPolicy {
    /// Maximum fallback attempts after the primary call fails
    pub max_attempts: u32,
    /// Exponential backoff base
    pub backoff_base: Duration,
    /// Backoff ceiling
    pub backoff_cap: Duration,
}

impl Default for FallbackPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(30),
        }
    }
}

impl FallbackPolicy {
    /// Delay before the given attempt: `base * 2^(attempt - 1)`, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self.backoff_base.saturating_mul(2u32.pow(exp));
        delay.min(self.backoff_cap)
    }
}
