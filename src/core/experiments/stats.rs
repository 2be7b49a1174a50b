//! Experiment result comparison
//!
//! Per-metric means, percentage difference, and a *heuristic* p-value.
//! The p-value is `1 / (1 + exp(0.7·|t|))` over a two-sample t statistic:
//! a monotone squash, not a real significance test. It exists to sort
//! experiments by how far apart their variants look. Do not make launch
//! decisions on it.

use super::{Experiment, ExperimentResult, Variant};
use serde::{Deserialize, Serialize};

/// Comparison for a single metric
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricComparison {
    /// Metric name
    pub metric: String,
    /// Mean over control observations
    pub control_mean: f64,
    /// Mean over treatment observations
    pub treatment_mean: f64,
    /// Control sample size
    pub control_count: usize,
    /// Treatment sample size
    pub treatment_count: usize,
    /// Percentage difference of treatment vs control
    pub pct_difference: f64,
    /// Heuristic p-value; illustrative only, never a significance test
    pub p_value: f64,
}

/// Aggregated comparison over all declared metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentStatistics {
    /// Experiment id
    pub experiment_id: String,
    /// Observations counted per variant
    pub control_results: usize,
    /// Observations counted per variant
    pub treatment_results: usize,
    /// Per-metric comparisons
    pub metrics: Vec<MetricComparison>,
}

/// Compute statistics for an experiment's recorded results
pub(super) fn compute(
    experiment: &Experiment,
    results: &[ExperimentResult],
) -> ExperimentStatistics {
    let control: Vec<&ExperimentResult> = results
        .iter()
        .filter(|r| r.variant == Variant::Control)
        .collect();
    let treatment: Vec<&ExperimentResult> = results
        .iter()
        .filter(|r| r.variant == Variant::Treatment)
        .collect();

    let metrics = experiment
        .metrics
        .iter()
        .map(|metric| {
            let control_values = metric_values(&control, metric);
            let treatment_values = metric_values(&treatment, metric);
            compare(metric, &control_values, &treatment_values)
        })
        .collect();

    ExperimentStatistics {
        experiment_id: experiment.id.clone(),
        control_results: control.len(),
        treatment_results: treatment.len(),
        metrics,
    }
}

fn metric_values(results: &[&ExperimentResult], metric: &str) -> Vec<f64> {
    results
        .iter()
        .filter_map(|r| r.metrics.get(metric).copied())
        .collect()
}

fn compare(metric: &str, control: &[f64], treatment: &[f64]) -> MetricComparison {
    let control_mean = mean(control);
    let treatment_mean = mean(treatment);
    let pct_difference = if control_mean.abs() > f64::EPSILON {
        (treatment_mean - control_mean) / control_mean.abs() * 100.0
    } else {
        0.0
    };

    let t = welch_t(control, treatment);
    let p_value = 1.0 / (1.0 + (0.7 * t.abs()).exp());

    MetricComparison {
        metric: metric.to_string(),
        control_mean,
        treatment_mean,
        control_count: control.len(),
        treatment_count: treatment.len(),
        pct_difference,
        p_value,
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn variance(values: &[f64], mean: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Welch's two-sample t statistic; zero when either sample is degenerate
fn welch_t(a: &[f64], b: &[f64]) -> f64 {
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }
    let mean_a = mean(a);
    let mean_b = mean(b);
    let se = (variance(a, mean_a) / a.len() as f64 + variance(b, mean_b) / b.len() as f64).sqrt();
    if se <= f64::EPSILON {
        return 0.0;
    }
    (mean_b - mean_a) / se
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_samples_give_p_half() {
        let comparison = compare("latency", &[1.0, 1.0, 1.0], &[1.0, 1.0, 1.0]);
        assert!((comparison.p_value - 0.5).abs() < 1e-9);
        assert_eq!(comparison.pct_difference, 0.0);
    }

    #[test]
    fn separated_samples_push_p_toward_zero() {
        let control = [1.0, 1.1, 0.9, 1.0, 1.05];
        let treatment = [5.0, 5.2, 4.9, 5.1, 5.05];
        let comparison = compare("latency", &control, &treatment);
        assert!(comparison.p_value < 0.01);
        assert!(comparison.pct_difference > 300.0);
    }

    #[test]
    fn degenerate_samples_do_not_panic() {
        let comparison = compare("latency", &[], &[1.0]);
        assert_eq!(comparison.control_mean, 0.0);
        assert!((comparison.p_value - 0.5).abs() < 1e-9);
    }
}
