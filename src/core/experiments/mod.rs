//! A/B experiment engine
//!
//! Routes a share of a model's traffic to a treatment model and keeps the
//! assignment sticky per user. Assignment is an atomic read-or-insert so
//! concurrent first requests from the same user agree on one variant.

mod engine;
mod repo;
mod stats;
#[cfg(test)]
mod tests;

pub use engine::ExperimentEngine;
pub use repo::{AbTestRepo, InMemoryAbRepo};
pub use stats::{ExperimentStatistics, MetricComparison};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Variant of an experiment a user is assigned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// The requested model
    Control,
    /// The candidate model
    Treatment,
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Control => write!(f, "control"),
            Variant::Treatment => write!(f, "treatment"),
        }
    }
}

/// An A/B experiment over a pair of models
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experiment {
    /// Experiment id
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Whether the experiment is switched on
    pub active: bool,
    /// Start of the experiment
    pub start_date: DateTime<Utc>,
    /// Optional end; expired experiments are ignored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Percentage of eligible users routed to the treatment, `0..=100`
    pub traffic_allocation_pct: u8,
    /// Model whose traffic is experimented on
    pub control_model_id: String,
    /// Candidate model
    pub treatment_model_id: String,
    /// When non-empty, only these users are eligible for treatment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_segments: Vec<String>,
    /// Metric names collected for this experiment
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<String>,
    /// Creator
    pub created_by: String,
    /// Creation timestamp; first tie-break key for overlapping experiments
    pub created_at: DateTime<Utc>,
}

impl Experiment {
    /// Whether the experiment should receive traffic at `now`
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && self.end_date.is_none_or(|end| end > now)
    }
}

/// A recorded observation for one request under an experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResult {
    /// Experiment id
    pub experiment_id: String,
    /// User the observation belongs to
    pub user_id: String,
    /// Request that produced the observation
    pub request_id: String,
    /// Variant the user was assigned
    pub variant: Variant,
    /// Model that served the request
    pub model_id: String,
    /// Metric values, keyed by metric name
    pub metrics: HashMap<String, f64>,
    /// Observation timestamp
    pub timestamp: DateTime<Utc>,
}
