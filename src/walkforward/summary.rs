//! Iteration summaries and run results.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::metrics::{CalibrationReport, HorizonAccuracy};
use crate::training::HorizonModel;

use super::predictor::Prediction;
use super::resolver::Outcome;

/// Why the loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    TargetReached,
    InsufficientImprovement,
    MaxIterations,
    /// No business day between the cutoff and the latest date.
    NoValidationData,
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TargetReached => "target reached",
            Self::InsufficientImprovement => "insufficient improvement",
            Self::MaxIterations => "max iterations",
            Self::NoValidationData => "no validation data",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationCounts {
    /// Symbols that took part in the iteration.
    pub symbols: usize,
    /// Symbols excluded after a load failure or for lack of history.
    pub failed_symbols: usize,
    pub predictions: usize,
    pub resolved: usize,
    pub pending: usize,
    pub training_samples_by_horizon: BTreeMap<u32, usize>,
    /// Horizons without enough training rows to fit a model.
    pub skipped_horizons: Vec<u32>,
}

/// Record of one completed iteration. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSummary {
    pub iteration_index: usize,
    pub cutoff_date: NaiveDate,
    /// Start of the training rows under a sliding window.
    pub window_start: Option<NaiveDate>,
    /// First business day after the cutoff, `None` for an empty window.
    pub validation_start: Option<NaiveDate>,
    pub validation_end: NaiveDate,
    /// Blended accuracy per horizon with at least one resolved prediction.
    pub accuracy_by_horizon: BTreeMap<u32, f64>,
    pub horizon_accuracy: BTreeMap<u32, HorizonAccuracy>,
    pub average_accuracy: Option<f64>,
    pub improvement_vs_previous: Option<f64>,
    pub counts: IterationCounts,
    pub calibration: BTreeMap<u32, CalibrationReport>,
    pub calibration_drift: Vec<u32>,
    /// Set on the iteration that ended the run.
    pub stop_reason: Option<StopReason>,
    pub completed_at: DateTime<Utc>,
}

impl IterationSummary {
    /// Summary of an iteration whose validation window has no business day.
    pub fn no_data(
        iteration_index: usize,
        cutoff_date: NaiveDate,
        window_start: Option<NaiveDate>,
        validation_end: NaiveDate,
    ) -> Self {
        Self {
            iteration_index,
            cutoff_date,
            window_start,
            validation_start: None,
            validation_end,
            accuracy_by_horizon: BTreeMap::new(),
            horizon_accuracy: BTreeMap::new(),
            average_accuracy: None,
            improvement_vs_previous: None,
            counts: IterationCounts::default(),
            calibration: BTreeMap::new(),
            calibration_drift: Vec::new(),
            stop_reason: Some(StopReason::NoValidationData),
            completed_at: Utc::now(),
        }
    }

    /// One-line description for logs and reports.
    pub fn one_line(&self) -> String {
        format!(
            "Iteration {}: cutoff {}, avg {}, improvement {}, {} resolved / {} pending",
            self.iteration_index,
            self.cutoff_date,
            fmt_opt(self.average_accuracy),
            fmt_opt(self.improvement_vs_previous),
            self.counts.resolved,
            self.counts.pending
        )
    }
}

fn fmt_opt(value: Option<f64>) -> String {
    value
        .map(|v| format!("{:.4}", v))
        .unwrap_or_else(|| "n/a".to_string())
}

/// Predictions, outcomes and models of one iteration.
#[derive(Debug, Clone, Default)]
pub struct IterationArtifacts {
    pub iteration_index: usize,
    pub predictions: Vec<Prediction>,
    pub outcomes: Vec<Outcome>,
    pub models: Vec<HorizonModel>,
}

/// Run-level record written when the loop ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub config: EngineConfig,
    pub symbols: Vec<String>,
    pub latest_date: NaiveDate,
    pub initial_cutoff: NaiveDate,
    pub iterations: usize,
    pub stop_reason: StopReason,
    pub registry_version: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Result of [`super::IterationController::run`].
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub summaries: Vec<IterationSummary>,
    pub stop_reason: StopReason,
    /// Detail of the last completed iteration.
    pub latest: Option<IterationArtifacts>,
}

impl RunOutcome {
    /// Best overall average across iterations.
    pub fn best_average(&self) -> Option<f64> {
        self.summaries
            .iter()
            .filter_map(|s| s.average_accuracy)
            .fold(None, |best, v| Some(best.map_or(v, |b: f64| b.max(v))))
    }

    pub fn summary(&self) -> String {
        render_report(&self.run_id, Some(self.stop_reason), &self.summaries)
    }
}

/// Plain-text table of a run's iterations.
pub fn render_report(run_id: &str, stop_reason: Option<StopReason>, summaries: &[IterationSummary]) -> String {
    let mut report = String::new();

    report.push_str(&format!("=== RUN {} ===\n\n", run_id));
    report.push_str(&format!("Iterations: {}\n", summaries.len()));
    if let Some(reason) = stop_reason {
        report.push_str(&format!("Stop reason: {}\n", reason.as_str()));
    }
    report.push('\n');

    report.push_str("| Iter | Cutoff     | Avg    | Improve | Resolved | Pending | Failed | Drift |\n");
    report.push_str("|------|------------|--------|---------|----------|---------|--------|-------|\n");
    for s in summaries {
        let drift = if s.calibration_drift.is_empty() {
            "-".to_string()
        } else {
            s.calibration_drift
                .iter()
                .map(|h| format!("{}D", h))
                .collect::<Vec<_>>()
                .join(",")
        };
        report.push_str(&format!(
            "| {:>4} | {} | {:>6} | {:>7} | {:>8} | {:>7} | {:>6} | {:>5} |\n",
            s.iteration_index,
            s.cutoff_date,
            fmt_opt(s.average_accuracy),
            fmt_opt(s.improvement_vs_previous),
            s.counts.resolved,
            s.counts.pending,
            s.counts.failed_symbols,
            drift
        ));
    }

    if let Some(last) = summaries.last() {
        report.push_str("\nLast iteration by horizon:\n");
        for (horizon, acc) in &last.horizon_accuracy {
            report.push_str(&format!(
                "  {:>3}D  raw {:.4}  weighted {:.4}  blended {:.4}  ({} resolved)\n",
                horizon,
                acc.raw_accuracy,
                acc.confidence_weighted_accuracy,
                acc.blended_accuracy,
                acc.resolved
            ));
        }
    }

    report
}
