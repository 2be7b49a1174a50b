//! Usage repository port and in-memory implementation

use super::{OperationType, UsageRecord};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

/// Append-only storage port for usage records
///
/// Implementations must order an `append` for a request id before any
/// subsequent read that covers it, and must be safe under concurrent
/// appends.
#[async_trait]
pub trait UsageRepo: Send + Sync {
    /// Append a record
    async fn append(&self, record: UsageRecord) -> Result<()>;

    /// Records for a user within `[start, end)`
    async fn records_for_user(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>>;

    /// Records for an API key within `[start, end)`
    async fn records_for_api_key(
        &self,
        api_key_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>>;

    /// Records for a logical model within `[start, end)`
    async fn records_for_model(
        &self,
        model_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>>;

    /// Records for a provider within `[start, end)`
    async fn records_for_provider(
        &self,
        provider: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>>;

    /// All records within `[start, end)`
    async fn records_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>>;

    /// Remove records older than the cutoff; returns how many were purged
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

/// In-memory ledger
///
/// Appends serialize behind a write lock; queries clone matching records
/// out of a read-locked snapshot.
#[derive(Default)]
pub struct InMemoryUsageRepo {
    records: RwLock<Vec<UsageRecord>>,
}

impl InMemoryUsageRepo {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored records
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the ledger is empty
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    fn filter<F>(&self, start: DateTime<Utc>, end: DateTime<Utc>, predicate: F) -> Vec<UsageRecord>
    where
        F: Fn(&UsageRecord) -> bool,
    {
        self.records
            .read()
            .iter()
            .filter(|r| r.timestamp >= start && r.timestamp < end && predicate(r))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl UsageRepo for InMemoryUsageRepo {
    async fn append(&self, record: UsageRecord) -> Result<()> {
        debug_assert!(match record.operation {
            OperationType::Completion | OperationType::FineTuning =>
                record.total_tokens == record.prompt_tokens + record.completion_tokens,
            OperationType::Embedding => record.total_tokens == record.prompt_tokens,
        });
        self.records.write().push(record);
        Ok(())
    }

    async fn records_for_user(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>> {
        Ok(self.filter(start, end, |r| r.user_id == user_id))
    }

    async fn records_for_api_key(
        &self,
        api_key_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>> {
        Ok(self.filter(start, end, |r| r.api_key_id.as_deref() == Some(api_key_id)))
    }

    async fn records_for_model(
        &self,
        model_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>> {
        Ok(self.filter(start, end, |r| r.model_id == model_id))
    }

    async fn records_for_provider(
        &self,
        provider: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>> {
        Ok(self.filter(start, end, |r| r.provider == provider))
    }

    async fn records_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<UsageRecord>> {
        Ok(self.filter(start, end, |_| true))
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| r.timestamp >= cutoff);
        Ok(before - records.len())
    }
}
