//! Accuracy aggregation.
//!
//! Per horizon:
//! - raw accuracy: share of resolved predictions whose class matches the label
//! - confidence-weighted accuracy: correct predictions weighted by `|p - 0.5| * 2`
//! - blended accuracy: `raw * (1 - alpha) + weighted * alpha`
//!
//! Horizons without a resolved prediction have no accuracy at all and are
//! left out of the overall average.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::walkforward::Outcome;

/// Accuracy figures for one horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonAccuracy {
    pub horizon: u32,
    pub resolved: usize,
    pub correct: usize,
    pub raw_accuracy: f64,
    pub confidence_weighted_accuracy: f64,
    pub blended_accuracy: f64,
}

/// Explicit weight for one horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HorizonWeight {
    pub horizon: u32,
    pub weight: f64,
}

/// How per-horizon blended accuracies combine into the overall average.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HorizonWeighting {
    /// Unweighted mean.
    #[default]
    Equal,
    /// Weighted by resolved prediction count.
    SampleCount,
    /// Fixed per-horizon weights.
    Custom { weights: Vec<HorizonWeight> },
}

impl HorizonWeighting {
    /// Check custom weights against the configured horizons.
    pub fn validate(&self, horizons: &[u32]) -> Result<(), String> {
        let Self::Custom { weights } = self else {
            return Ok(());
        };
        if let Some(w) = weights.iter().find(|w| !w.weight.is_finite() || w.weight < 0.0) {
            return Err(format!(
                "horizon_weighting weight for {}D must be >= 0, got {}",
                w.horizon, w.weight
            ));
        }
        for horizon in horizons {
            let positive = weights
                .iter()
                .any(|w| w.horizon == *horizon && w.weight > 0.0);
            if !positive {
                return Err(format!(
                    "horizon_weighting has no positive weight for horizon {}",
                    horizon
                ));
            }
        }
        Ok(())
    }

    fn weight_for(&self, accuracy: &HorizonAccuracy) -> f64 {
        match self {
            Self::Equal => 1.0,
            Self::SampleCount => accuracy.resolved as f64,
            Self::Custom { weights } => weights
                .iter()
                .find(|w| w.horizon == accuracy.horizon)
                .map(|w| w.weight)
                .unwrap_or(0.0),
        }
    }
}

/// Scores resolved outcomes.
#[derive(Debug, Clone)]
pub struct AccuracyAggregator {
    blend_alpha: f64,
    weighting: HorizonWeighting,
}

impl AccuracyAggregator {
    pub fn new(blend_alpha: f64) -> Self {
        Self {
            blend_alpha: blend_alpha.clamp(0.0, 1.0),
            weighting: HorizonWeighting::Equal,
        }
    }

    pub fn with_weighting(mut self, weighting: HorizonWeighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Accuracy of a set of outcomes for one horizon, `None` when empty.
    pub fn aggregate_horizon<'a>(
        &self,
        horizon: u32,
        outcomes: impl IntoIterator<Item = &'a Outcome>,
    ) -> Option<HorizonAccuracy> {
        let mut resolved = 0usize;
        let mut correct = 0usize;
        let mut weight_total = 0.0;
        let mut weight_correct = 0.0;

        for outcome in outcomes {
            let weight = confidence_weight(outcome.prediction.probability);
            resolved += 1;
            weight_total += weight;
            if outcome.correct {
                correct += 1;
                weight_correct += weight;
            }
        }

        if resolved == 0 {
            return None;
        }

        let raw_accuracy = correct as f64 / resolved as f64;
        let confidence_weighted_accuracy = if weight_total > 0.0 {
            weight_correct / weight_total
        } else {
            raw_accuracy
        };
        let blended_accuracy =
            raw_accuracy * (1.0 - self.blend_alpha) + confidence_weighted_accuracy * self.blend_alpha;

        Some(HorizonAccuracy {
            horizon,
            resolved,
            correct,
            raw_accuracy,
            confidence_weighted_accuracy,
            blended_accuracy,
        })
    }

    /// Per-horizon accuracy for every horizon with a resolved outcome.
    pub fn aggregate(&self, outcomes: &[Outcome]) -> BTreeMap<u32, HorizonAccuracy> {
        let mut by_horizon: BTreeMap<u32, Vec<&Outcome>> = BTreeMap::new();
        for outcome in outcomes {
            by_horizon
                .entry(outcome.prediction.horizon)
                .or_default()
                .push(outcome);
        }

        by_horizon
            .into_iter()
            .filter_map(|(horizon, group)| {
                self.aggregate_horizon(horizon, group)
                    .map(|acc| (horizon, acc))
            })
            .collect()
    }

    /// Weighted average of blended accuracies, `None` with no horizons.
    pub fn overall(&self, by_horizon: &BTreeMap<u32, HorizonAccuracy>) -> Option<f64> {
        if by_horizon.is_empty() {
            return None;
        }

        let (sum, total) = by_horizon.values().fold((0.0, 0.0), |(s, t), acc| {
            let w = self.weighting.weight_for(acc);
            (s + w * acc.blended_accuracy, t + w)
        });

        if total > 0.0 {
            Some(sum / total)
        } else {
            let n = by_horizon.len() as f64;
            Some(by_horizon.values().map(|a| a.blended_accuracy).sum::<f64>() / n)
        }
    }
}

/// Confidence weight of a probability: 0 at 0.5, 1 at 0 or 1.
pub fn confidence_weight(probability: f64) -> f64 {
    (probability - 0.5).abs() * 2.0
}
