//! Response cache
//!
//! Maps a request fingerprint to a previously computed response for a
//! bounded time. Completions are cacheable only when they are unary and
//! near-deterministic (`stream == false` and temperature below the
//! configured threshold); embeddings are always cacheable. Responses
//! served by a fallback model are never stored, so a degraded answer
//! cannot be pinned past the incident.

mod service;

pub use service::{CacheService, InMemoryCache};

use crate::core::types::{
    CompletionRequest, CompletionResponse, EmbeddingRequest, EmbeddingResponse,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseCacheConfig {
    /// Master switch
    pub enabled: bool,
    /// Uniform entry TTL
    pub ttl: Duration,
    /// Completions with temperature below this are considered deterministic
    pub temperature_threshold: f32,
}

impl Default for ResponseCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl: Duration::from_secs(300),
            temperature_threshold: 0.1,
        }
    }
}

/// Fingerprint-keyed response cache over a [`CacheService`]
pub struct ResponseCache {
    service: Arc<dyn CacheService>,
    config: ResponseCacheConfig,
}

impl ResponseCache {
    /// Create a cache over the given storage port
    pub fn new(service: Arc<dyn CacheService>, config: ResponseCacheConfig) -> Self {
        Self { service, config }
    }

    /// The active configuration
    pub fn config(&self) -> &ResponseCacheConfig {
        &self.config
    }

    /// Whether a completion request qualifies for caching
    pub fn is_cacheable(&self, request: &CompletionRequest) -> bool {
        self.config.enabled
            && !request.stream
            && request.temperature.unwrap_or(1.0) < self.config.temperature_threshold
    }

    /// Fingerprint of the request-defining completion fields
    pub fn completion_fingerprint(&self, request: &CompletionRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.model.as_bytes());
        hasher.update([0u8]);
        if let Ok(messages) = serde_json::to_vec(&request.messages) {
            hasher.update(&messages);
        }
        hasher.update(request.temperature.unwrap_or(0.0).to_bits().to_le_bytes());
        hasher.update(request.max_tokens.unwrap_or(0).to_le_bytes());
        if let Some(tools) = &request.tools {
            if let Ok(tools) = serde_json::to_vec(tools) {
                hasher.update(&tools);
            }
        }
        format!("cmpl:{}", hex::encode(hasher.finalize()))
    }

    /// Fingerprint of the request-defining embedding fields
    pub fn embedding_fingerprint(&self, request: &EmbeddingRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.model.as_bytes());
        hasher.update([0u8]);
        if let Ok(input) = serde_json::to_vec(&request.input) {
            hasher.update(&input);
        }
        hasher.update(request.dimensions.unwrap_or(0).to_le_bytes());
        format!("embd:{}", hex::encode(hasher.finalize()))
    }

    /// Look up a cached completion. Cache failures degrade to a miss.
    pub async fn get_completion(&self, request: &CompletionRequest) -> Option<CompletionResponse> {
        if !self.is_cacheable(request) {
            return None;
        }
        let key = self.completion_fingerprint(request);
        self.lookup(&key).await
    }

    /// Store a completion.
    ///
    /// Skipped for uncacheable requests and for responses served by a
    /// fallback model.
    pub async fn store_completion(
        &self,
        request: &CompletionRequest,
        response: &CompletionResponse,
        used_fallback: bool,
    ) {
        if !self.is_cacheable(request) || used_fallback {
            return;
        }
        let key = self.completion_fingerprint(request);
        self.store(&key, response).await;
    }

    /// Look up a cached embedding response
    pub async fn get_embedding(&self, request: &EmbeddingRequest) -> Option<EmbeddingResponse> {
        if !self.config.enabled {
            return None;
        }
        let key = self.embedding_fingerprint(request);
        self.lookup(&key).await
    }

    /// Store an embedding response, unless it was served by a fallback
    pub async fn store_embedding(
        &self,
        request: &EmbeddingRequest,
        response: &EmbeddingResponse,
        used_fallback: bool,
    ) {
        if !self.config.enabled || used_fallback {
            return;
        }
        let key = self.embedding_fingerprint(request);
        self.store(&key, response).await;
    }

    async fn lookup<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.service.get(key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(response) => {
                    debug!(key, "response cache hit");
                    Some(response)
                }
                Err(err) => {
                    warn!(key, %err, "cached value failed to deserialize");
                    None
                }
            },
            Ok(None) => None,
            Err(err) => {
                warn!(key, %err, "cache lookup failed");
                None
            }
        }
    }

    async fn store<T: Serialize>(&self, key: &str, response: &T) {
        let value = match serde_json::to_value(response) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, %err, "response failed to serialize for caching");
                return;
            }
        };
        if let Err(err) = self.service.set(key, value, self.config.ttl).await {
            warn!(key, %err, "cache store failed");
        } else {
            debug!(key, "response cached");
        }
    }
}
