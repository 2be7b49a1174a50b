//! Optional fine-tuning facet for providers

use crate::core::types::ProviderError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fine-tuning job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FineTuningJobStatus {
    /// Queued, not yet started
    Queued,
    /// Currently training
    Running,
    /// Finished successfully
    Succeeded,
    /// Failed permanently
    Failed,
    /// Cancelled by the caller
    Cancelled,
}

/// A fine-tuning job as reported by a provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FineTuningJob {
    /// Provider-side job id
    pub id: String,
    /// Base model being tuned
    pub base_model: String,
    /// Resulting model id, present once training succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fine_tuned_model: Option<String>,
    /// Current status
    pub status: FineTuningJobStatus,
    /// Uploaded training file id
    pub training_file: String,
    /// Tokens consumed by training, once known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_tokens: Option<u64>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Fine-tuning operations, implemented by providers that support them
#[async_trait]
pub trait FineTuningProvider: Send + Sync {
    /// Start a fine-tuning job on an uploaded training file
    async fn create_job(
        &self,
        base_model: &str,
        training_file: &str,
    ) -> Result<FineTuningJob, ProviderError>;

    /// Cancel a running job
    async fn cancel_job(&self, job_id: &str) -> Result<FineTuningJob, ProviderError>;

    /// Fetch job state
    async fn get_job(&self, job_id: &str) -> Result<FineTuningJob, ProviderError>;

    /// Upload a training file; returns the provider-side file id
    async fn upload_file(&self, name: &str, content: &[u8]) -> Result<String, ProviderError>;

    /// Base models eligible for tuning on this provider
    async fn supported_base_models(&self) -> Result<Vec<String>, ProviderError>;

    /// Delete a previously produced fine-tuned model
    async fn delete_fine_tuned_model(&self, model_id: &str) -> Result<(), ProviderError>;
}
