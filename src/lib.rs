//! # modelgate
//!
//! Provider-agnostic LLM gateway core. Routes a uniform chat, streaming,
//! and embedding interface across multiple model back-ends with policy
//! enforcement along the way:
//!
//! - **Routing**: logical model ids resolve to a provider + provider
//!   model, with sticky A/B experiment overrides per user
//! - **Resilience**: retryable provider failures walk a bounded fallback
//!   chain; responses always report the originally requested model and
//!   the provider that actually served it
//! - **Policy**: content filtering on prompts and completions, and
//!   period-windowed budget enforcement with a deliberate fail-open bias
//! - **Accounting**: an append-only usage ledger and a cost engine with a
//!   pricing fallback chain
//! - **Caching**: fingerprint-keyed responses for near-deterministic
//!   completions and all embeddings
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use modelgate::{Gateway, GatewayConfig};
//! use modelgate::core::providers::MockProvider;
//! use modelgate::core::registry::ModelMapping;
//! use modelgate::core::types::{CompletionRequest, RequestContext};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> modelgate::Result<()> {
//!     let gateway = Gateway::builder(GatewayConfig::default())
//!         .register_provider(Arc::new(MockProvider::new("mock")))
//!         .add_model(ModelMapping::chat("gpt-x", "mock", "mock-model"))
//!         .build()?;
//!
//!     let request = CompletionRequest::new("gpt-x").add_user_message("hello");
//!     let response = gateway.completion(request, RequestContext::default()).await?;
//!     println!("{}", response.text().unwrap_or_default());
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod utils;

pub use config::GatewayConfig;
pub use utils::error::{GatewayError, Result};

pub use crate::core::orchestrator::{GatewayStream, Orchestrator};
pub use crate::core::types::{
    ChatChunk, ChatMessage, CompletionRequest, CompletionResponse, EmbeddingRequest,
    EmbeddingResponse, ErrorCode, MessageContent, MessageRole, ProviderError, RequestContext,
    Usage,
};

use crate::core::cache::{CacheService, InMemoryCache, ResponseCache};
use crate::core::cost::{CostEngine, CostRepo, InMemoryCostRepo};
use crate::core::experiments::{AbTestRepo, ExperimentEngine, InMemoryAbRepo};
use crate::core::filter::{ContentClassifier, ContentFilter, KeywordClassifier};
use crate::core::providers::{FineTuningJob, LlmProvider, ProviderRegistry};
use crate::core::registry::{ModelMapping, ModelRegistry};
use crate::core::router::Router;
use crate::core::usage::{InMemoryUsageRepo, UsageRepo, UsageTracker, spawn_retention_sweep};
use std::sync::Arc;
use tracing::info;

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Name of the crate
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Assembled gateway: the orchestrator plus its collaborators, wired from
/// a [`GatewayConfig`]
pub struct Gateway {
    orchestrator: Arc<Orchestrator>,
    experiments: Arc<ExperimentEngine>,
    usage_repo: Arc<dyn UsageRepo>,
    config: GatewayConfig,
}

impl Gateway {
    /// Start building a gateway
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    /// Execute a unary completion
    pub async fn completion(
        &self,
        request: CompletionRequest,
        ctx: RequestContext,
    ) -> Result<CompletionResponse> {
        self.orchestrator.complete(request, self.with_timeout(ctx)).await
    }

    /// Execute a streaming completion
    pub async fn completion_stream(
        &self,
        request: CompletionRequest,
        ctx: RequestContext,
    ) -> Result<GatewayStream> {
        self.orchestrator
            .complete_stream(request, self.with_timeout(ctx))
            .await
    }

    /// Execute an embedding request
    pub async fn embedding(
        &self,
        request: EmbeddingRequest,
        ctx: RequestContext,
    ) -> Result<EmbeddingResponse> {
        self.orchestrator.embed(request, self.with_timeout(ctx)).await
    }

    /// Run a fine-tuning job on the named provider, metering training
    /// tokens on completion
    pub async fn fine_tuning(
        &self,
        provider: &str,
        base_model: &str,
        file_name: &str,
        training_data: &[u8],
        ctx: RequestContext,
    ) -> Result<FineTuningJob> {
        self.orchestrator
            .run_fine_tuning(
                provider,
                base_model,
                file_name,
                training_data,
                self.with_timeout(ctx),
            )
            .await
    }

    /// Health probe; bypasses the pipeline
    pub fn ping(&self) -> &'static str {
        self.orchestrator.ping()
    }

    /// The orchestrator, for embedding into larger services
    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    /// The experiment engine, for experiment management
    pub fn experiments(&self) -> &Arc<ExperimentEngine> {
        &self.experiments
    }

    /// Spawn the usage retention sweep configured in `usage`
    pub fn start_retention_sweep(&self) -> tokio::task::JoinHandle<()> {
        spawn_retention_sweep(
            self.usage_repo.clone(),
            self.config.usage.retention,
            self.config.usage.sweep_interval,
        )
    }

    fn with_timeout(&self, mut ctx: RequestContext) -> RequestContext {
        ctx.timeout = self.config.provider_timeout;
        ctx
    }
}

/// Builder wiring configuration, providers, and storage ports into a
/// [`Gateway`]. Every port has an in-memory default.
pub struct GatewayBuilder {
    config: GatewayConfig,
    providers: ProviderRegistry,
    extra_models: Vec<ModelMapping>,
    cache_service: Option<Arc<dyn CacheService>>,
    usage_repo: Option<Arc<dyn UsageRepo>>,
    cost_repo: Option<Arc<dyn CostRepo>>,
    ab_repo: Option<Arc<dyn AbTestRepo>>,
    classifier: Option<Arc<dyn ContentClassifier>>,
}

impl GatewayBuilder {
    fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            providers: ProviderRegistry::new(),
            extra_models: Vec::new(),
            cache_service: None,
            usage_repo: None,
            cost_repo: None,
            ab_repo: None,
            classifier: None,
        }
    }

    /// Register a provider; registration order drives model discovery
    pub fn register_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.providers.register(provider);
        self
    }

    /// Add a model mapping on top of the configured ones
    pub fn add_model(mut self, mapping: ModelMapping) -> Self {
        self.extra_models.push(mapping);
        self
    }

    /// Substitute the cache storage port
    pub fn with_cache_service(mut self, service: Arc<dyn CacheService>) -> Self {
        self.cache_service = Some(service);
        self
    }

    /// Substitute the usage ledger storage port
    pub fn with_usage_repo(mut self, repo: Arc<dyn UsageRepo>) -> Self {
        self.usage_repo = Some(repo);
        self
    }

    /// Substitute the cost/budget storage port
    pub fn with_cost_repo(mut self, repo: Arc<dyn CostRepo>) -> Self {
        self.cost_repo = Some(repo);
        self
    }

    /// Substitute the experiment storage port
    pub fn with_ab_repo(mut self, repo: Arc<dyn AbTestRepo>) -> Self {
        self.ab_repo = Some(repo);
        self
    }

    /// Substitute the content classifier
    pub fn with_classifier(mut self, classifier: Arc<dyn ContentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Wire everything together
    pub fn build(self) -> Result<Gateway> {
        let config = self.config;
        let providers = Arc::new(self.providers);

        let cache_service = self
            .cache_service
            .unwrap_or_else(|| Arc::new(InMemoryCache::new()));
        let usage_repo = self
            .usage_repo
            .unwrap_or_else(|| Arc::new(InMemoryUsageRepo::new()));
        let cost_repo = self
            .cost_repo
            .unwrap_or_else(|| Arc::new(InMemoryCostRepo::new()));
        let ab_repo = self.ab_repo.unwrap_or_else(|| Arc::new(InMemoryAbRepo::new()));
        let classifier = self
            .classifier
            .unwrap_or_else(|| Arc::new(KeywordClassifier::new()));

        let mut mappings = config.models.clone();
        mappings.extend(self.extra_models);

        let registry = Arc::new(ModelRegistry::new(
            mappings,
            providers.clone(),
            cache_service.clone(),
            config.registry.clone(),
        ));

        let experiments = Arc::new(ExperimentEngine::new(ab_repo));
        let router = Arc::new(Router::new(
            registry.clone(),
            experiments.clone(),
            config.fallback_routes.clone().into_routes(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            router,
            providers,
            Arc::new(ResponseCache::new(cache_service, config.cache.clone())),
            Arc::new(ContentFilter::new(config.filter.clone(), classifier)?),
            Arc::new(UsageTracker::new(usage_repo.clone())),
            Arc::new(CostEngine::new(
                registry,
                cost_repo,
                config.cost.clone(),
            )),
            Arc::new(crate::utils::tokenizer::TokenCounter::new()),
            config.fallback.clone(),
        ));

        info!(version = VERSION, "gateway assembled");
        Ok(Gateway {
            orchestrator,
            experiments,
            usage_repo,
            config,
        })
    }
}
