//! Provider registry
//!
//! Name-keyed store of provider instances. Iteration order is the order of
//! registration: model discovery consults providers first-registered-first,
//! so registration order is part of the routing contract.

use super::LlmProvider;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of provider instances
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn LlmProvider>>,
    by_name: HashMap<String, usize>,
}

impl ProviderRegistry {
    /// Create new provider registry
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register a provider. Re-registering a name replaces the instance
    /// but keeps its original position in the iteration order.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        let name = provider.name().to_string();
        match self.by_name.get(&name) {
            Some(&index) => self.providers[index] = provider,
            None => {
                self.by_name.insert(name, self.providers.len());
                self.providers.push(provider);
            }
        }
    }

    /// Get provider by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn LlmProvider>> {
        self.by_name.get(name).map(|&i| self.providers[i].clone())
    }

    /// Iterate providers in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn LlmProvider>> {
        self.providers.iter()
    }

    /// Registered provider names, in registration order
    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Check if provider is registered
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Get provider count
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("provider_count", &self.providers.len())
            .field("providers", &self.names())
            .finish()
    }
}
