//! Retrieval-augmented generation helper
//!
//! The vector database is an external port; this module wires it to the
//! embedding and completion orchestrators: embed the query, search,
//! concatenate the top hits as context, and complete.

use crate::core::orchestrator::Orchestrator;
use crate::core::types::{
    CompletionRequest, CompletionResponse, EmbeddingRequest, RequestContext,
};
use crate::utils::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// One search hit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    /// Stored document id
    pub id: String,
    /// Document text
    pub text: String,
    /// Similarity score, higher is closer
    pub score: f32,
    /// Stored metadata
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Vector database port
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Nearest-neighbor search within a namespace; results are ordered by
    /// descending score and filtered to `score >= min_score`.
    async fn search(
        &self,
        namespace: &str,
        query_vector: &[f32],
        top_k: usize,
        min_score: f32,
        filter: Option<&HashMap<String, String>>,
    ) -> Result<Vec<VectorMatch>>;
}

/// RAG parameters
#[derive(Debug, Clone)]
pub struct RagOptions {
    /// Vector namespace to search
    pub namespace: String,
    /// Model used to embed the query
    pub embedding_model: String,
    /// Model used for the final completion
    pub completion_model: String,
    /// System prompt framing the answer
    pub system_prompt: String,
    /// Number of hits to include as context
    pub top_k: usize,
    /// Minimum similarity for a hit to count
    pub min_score: f32,
}

/// RAG service over the orchestrators and a vector store
pub struct RagService {
    store: Arc<dyn VectorStore>,
    orchestrator: Arc<Orchestrator>,
}

impl RagService {
    /// Create a RAG service
    pub fn new(store: Arc<dyn VectorStore>, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            store,
            orchestrator,
        }
    }

    /// Embed a query and search the vector store with the result
    pub async fn search_by_text(
        &self,
        namespace: &str,
        text: &str,
        embedding_model: &str,
        top_k: usize,
        min_score: f32,
        ctx: &RequestContext,
    ) -> Result<Vec<VectorMatch>> {
        let embedding = self
            .orchestrator
            .embed(EmbeddingRequest::new(embedding_model, text), ctx.clone())
            .await?;
        let vector = embedding
            .data
            .first()
            .map(|d| d.embedding.clone())
            .ok_or_else(|| {
                GatewayError::Internal("embedding response carried no vector".to_string())
            })?;
        self.store
            .search(namespace, &vector, top_k, min_score, None)
            .await
    }

    /// Answer a question grounded in retrieved context
    pub async fn perform_rag(
        &self,
        query: &str,
        options: &RagOptions,
        ctx: RequestContext,
    ) -> Result<CompletionResponse> {
        let matches = self
            .search_by_text(
                &options.namespace,
                query,
                &options.embedding_model,
                options.top_k,
                options.min_score,
                &ctx,
            )
            .await?;
        debug!(hits = matches.len(), namespace = %options.namespace, "retrieved context");

        let contexts: Vec<&str> = matches.iter().map(|m| m.text.as_str()).collect();
        let user_prompt = format!(
            "Context:\n{}\n\nQuestion: {}",
            contexts.join("\n"),
            query
        );

        let request = CompletionRequest::new(&options.completion_model)
            .add_system_message(&options.system_prompt)
            .add_user_message(user_prompt);
        self.orchestrator.complete(request, ctx).await
    }
}
