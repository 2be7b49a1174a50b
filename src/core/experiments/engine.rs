//! Variant assignment engine

use super::{AbTestRepo, Experiment, ExperimentResult, Variant};
use super::stats::{self, ExperimentStatistics};
use crate::utils::error::Result;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use tracing::{debug, warn};

/// Sticky user-to-variant assignment
///
/// Every repository failure degrades to the requested model: the engine
/// must never take traffic down with it.
pub struct ExperimentEngine {
    repo: Arc<dyn AbTestRepo>,
}

impl ExperimentEngine {
    /// Create an engine over the given repository
    pub fn new(repo: Arc<dyn AbTestRepo>) -> Self {
        Self { repo }
    }

    /// The underlying repository
    pub fn repo(&self) -> &Arc<dyn AbTestRepo> {
        &self.repo
    }

    /// Resolve the effective model id for a user's request.
    ///
    /// Returns the requested id unchanged when no live experiment targets
    /// it, when the user falls outside the experiment's segments, or when
    /// the repository fails.
    pub async fn model_for_user(&self, requested_model_id: &str, user_id: &str) -> String {
        match self.resolve(requested_model_id, user_id).await {
            Ok(model) => model,
            Err(err) => {
                warn!(%err, model = requested_model_id, "experiment lookup failed, using requested model");
                requested_model_id.to_string()
            }
        }
    }

    async fn resolve(&self, requested_model_id: &str, user_id: &str) -> Result<String> {
        let now = Utc::now();
        let mut experiments: Vec<Experiment> = self
            .repo
            .active_experiments_for_model(requested_model_id)
            .await?
            .into_iter()
            .filter(|e| e.is_live(now))
            .collect();

        if experiments.is_empty() {
            return Ok(requested_model_id.to_string());
        }

        // Oldest experiment wins; ids break creation-time ties.
        experiments.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        let experiment = &experiments[0];

        let variant = match self.repo.assignment(&experiment.id, user_id).await? {
            Some(existing) => existing,
            None => {
                let drawn = self.draw_variant(experiment, user_id);
                // A concurrent assignment may win the race; the stored
                // value is authoritative either way.
                self.repo
                    .assign_if_absent(&experiment.id, user_id, drawn)
                    .await?
            }
        };

        debug!(
            experiment = %experiment.id,
            user = user_id,
            %variant,
            "experiment assignment resolved"
        );

        Ok(match variant {
            Variant::Control => experiment.control_model_id.clone(),
            Variant::Treatment => experiment.treatment_model_id.clone(),
        })
    }

    fn draw_variant(&self, experiment: &Experiment, user_id: &str) -> Variant {
        if !experiment.user_segments.is_empty()
            && !experiment.user_segments.iter().any(|u| u == user_id)
        {
            return Variant::Control;
        }
        let roll: u8 = rand::thread_rng().gen_range(1..=100);
        if roll <= experiment.traffic_allocation_pct {
            Variant::Treatment
        } else {
            Variant::Control
        }
    }

    /// Record an observation for later comparison
    pub async fn record_result(&self, result: ExperimentResult) -> Result<()> {
        self.repo.record_result(result).await
    }

    /// Compute per-metric comparison between the two variants.
    ///
    /// The returned p-values are heuristic (see [`ExperimentStatistics`])
    /// and must not be used for decisions.
    pub async fn statistics(&self, experiment_id: &str) -> Result<ExperimentStatistics> {
        let experiment = self
            .repo
            .get_experiment(experiment_id)
            .await?
            .ok_or_else(|| {
                crate::utils::error::GatewayError::NotFound(format!("experiment {}", experiment_id))
            })?;
        let results = self.repo.results(experiment_id).await?;
        Ok(stats::compute(&experiment, &results))
    }
}
