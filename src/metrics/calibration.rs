//! Calibration drift detection.
//!
//! Compares each horizon's mean predicted probability with its realized
//! positive rate, and buckets probabilities to compute the expected
//! calibration error (ECE). Drift is only flagged once a horizon has enough
//! resolved predictions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::walkforward::Outcome;

/// Number of equal-width probability buckets.
const NUM_BUCKETS: usize = 10;

/// Predictions whose probability falls in `[lower, upper)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBucket {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
    pub avg_predicted: f64,
    pub observed_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub horizon: u32,
    pub samples: usize,
    pub mean_probability: f64,
    pub positive_rate: f64,
    /// `|mean_probability - positive_rate|`
    pub gap: f64,
    pub brier_score: f64,
    /// Sample-weighted mean bucket gap.
    pub ece: f64,
    pub buckets: Vec<CalibrationBucket>,
    pub drift: bool,
}

/// Drift thresholds.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationCheck {
    pub tolerance: f64,
    pub min_samples: usize,
}

impl Default for CalibrationCheck {
    fn default() -> Self {
        Self {
            tolerance: 0.15,
            min_samples: 10,
        }
    }
}

impl CalibrationCheck {
    pub fn new(tolerance: f64, min_samples: usize) -> Self {
        Self {
            tolerance,
            min_samples,
        }
    }

    pub fn check<'a>(
        &self,
        horizon: u32,
        outcomes: impl IntoIterator<Item = &'a Outcome>,
    ) -> Option<CalibrationReport> {
        let pairs: Vec<(f64, f64)> = outcomes
            .into_iter()
            .map(|o| (o.prediction.probability, f64::from(o.label)))
            .collect();
        if pairs.is_empty() {
            return None;
        }

        let n = pairs.len() as f64;
        let mean_probability = pairs.iter().map(|(p, _)| p).sum::<f64>() / n;
        let positive_rate = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
        let brier_score = pairs.iter().map(|(p, y)| (p - y).powi(2)).sum::<f64>() / n;
        let gap = (mean_probability - positive_rate).abs();

        let buckets = bucketize(&pairs);
        let ece = buckets
            .iter()
            .map(|b| b.count as f64 * (b.avg_predicted - b.observed_rate).abs())
            .sum::<f64>()
            / n;

        let drift = pairs.len() >= self.min_samples && gap > self.tolerance;

        Some(CalibrationReport {
            horizon,
            samples: pairs.len(),
            mean_probability,
            positive_rate,
            gap,
            brier_score,
            ece,
            buckets,
            drift,
        })
    }

    /// Reports for every horizon with a resolved outcome.
    pub fn check_all(&self, outcomes: &[Outcome]) -> BTreeMap<u32, CalibrationReport> {
        let mut by_horizon: BTreeMap<u32, Vec<&Outcome>> = BTreeMap::new();
        for outcome in outcomes {
            by_horizon
                .entry(outcome.prediction.horizon)
                .or_default()
                .push(outcome);
        }
        by_horizon
            .into_iter()
            .filter_map(|(h, group)| self.check(h, group).map(|r| (h, r)))
            .collect()
    }
}

/// Non-empty buckets; the last bucket includes 1.0.
fn bucketize(pairs: &[(f64, f64)]) -> Vec<CalibrationBucket> {
    let width = 1.0 / NUM_BUCKETS as f64;
    let mut sums = [(0usize, 0.0f64, 0.0f64); NUM_BUCKETS];

    for &(p, y) in pairs {
        let idx = ((p / width) as usize).min(NUM_BUCKETS - 1);
        let slot = &mut sums[idx];
        slot.0 += 1;
        slot.1 += p;
        slot.2 += y;
    }

    sums.iter()
        .enumerate()
        .filter(|(_, (count, _, _))| *count > 0)
        .map(|(i, &(count, p_sum, y_sum))| CalibrationBucket {
            lower: i as f64 * width,
            upper: (i + 1) as f64 * width,
            count,
            avg_predicted: p_sum / count as f64,
            observed_rate: y_sum / count as f64,
        })
        .collect()
}
