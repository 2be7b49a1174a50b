//! Experiment repository port and in-memory implementation

use super::{Experiment, ExperimentResult, Variant};
use crate::utils::error::{GatewayError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

/// Storage port for experiments, assignments, and results
#[async_trait]
pub trait AbTestRepo: Send + Sync {
    /// Create an experiment
    async fn create_experiment(&self, experiment: Experiment) -> Result<()>;

    /// Replace an experiment
    async fn update_experiment(&self, experiment: Experiment) -> Result<()>;

    /// Delete an experiment
    async fn delete_experiment(&self, id: &str) -> Result<()>;

    /// Fetch one experiment
    async fn get_experiment(&self, id: &str) -> Result<Option<Experiment>>;

    /// All experiments
    async fn list_experiments(&self) -> Result<Vec<Experiment>>;

    /// Active experiments whose control model matches
    async fn active_experiments_for_model(&self, model_id: &str) -> Result<Vec<Experiment>>;

    /// Existing assignment, if any
    async fn assignment(&self, experiment_id: &str, user_id: &str) -> Result<Option<Variant>>;

    /// Atomic read-or-insert: returns the stored variant if one exists,
    /// otherwise persists `variant` and returns it.
    async fn assign_if_absent(
        &self,
        experiment_id: &str,
        user_id: &str,
        variant: Variant,
    ) -> Result<Variant>;

    /// Append an observation
    async fn record_result(&self, result: ExperimentResult) -> Result<()>;

    /// All observations for an experiment
    async fn results(&self, experiment_id: &str) -> Result<Vec<ExperimentResult>>;
}

/// In-memory experiment store
#[derive(Default)]
pub struct InMemoryAbRepo {
    experiments: DashMap<String, Experiment>,
    assignments: DashMap<(String, String), Variant>,
    results: RwLock<Vec<ExperimentResult>>,
}

impl InMemoryAbRepo {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AbTestRepo for InMemoryAbRepo {
    async fn create_experiment(&self, experiment: Experiment) -> Result<()> {
        self.experiments.insert(experiment.id.clone(), experiment);
        Ok(())
    }

    async fn update_experiment(&self, experiment: Experiment) -> Result<()> {
        if !self.experiments.contains_key(&experiment.id) {
            return Err(GatewayError::NotFound(format!(
                "experiment {}",
                experiment.id
            )));
        }
        self.experiments.insert(experiment.id.clone(), experiment);
        Ok(())
    }

    async fn delete_experiment(&self, id: &str) -> Result<()> {
        self.experiments.remove(id);
        Ok(())
    }

    async fn get_experiment(&self, id: &str) -> Result<Option<Experiment>> {
        Ok(self.experiments.get(id).map(|e| e.clone()))
    }

    async fn list_experiments(&self) -> Result<Vec<Experiment>> {
        Ok(self.experiments.iter().map(|e| e.clone()).collect())
    }

    async fn active_experiments_for_model(&self, model_id: &str) -> Result<Vec<Experiment>> {
        Ok(self
            .experiments
            .iter()
            .filter(|e| e.active && e.control_model_id == model_id)
            .map(|e| e.clone())
            .collect())
    }

    async fn assignment(&self, experiment_id: &str, user_id: &str) -> Result<Option<Variant>> {
        Ok(self
            .assignments
            .get(&(experiment_id.to_string(), user_id.to_string()))
            .map(|v| *v))
    }

    async fn assign_if_absent(
        &self,
        experiment_id: &str,
        user_id: &str,
        variant: Variant,
    ) -> Result<Variant> {
        // The entry API holds the shard lock across the read-or-insert,
        // which gives the single-writer-per-(experiment, user) guarantee.
        let stored = *self
            .assignments
            .entry((experiment_id.to_string(), user_id.to_string()))
            .or_insert(variant);
        Ok(stored)
    }

    async fn record_result(&self, result: ExperimentResult) -> Result<()> {
        self.results.write().push(result);
        Ok(())
    }

    async fn results(&self, experiment_id: &str) -> Result<Vec<ExperimentResult>> {
        Ok(self
            .results
            .read()
            .iter()
            .filter(|r| r.experiment_id == experiment_id)
            .cloned()
            .collect())
    }
}
