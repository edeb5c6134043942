//! Engine configuration.
//!
//! Every field has a default, so a TOML file only needs the keys it changes:
//!
//! ```toml
//! initial_lookback_days = 30
//! horizons = [1, 5, 10]
//! learner = "naive_bayes"
//!
//! [window]
//! kind = "sliding"
//! train_days = 250
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::metrics::HorizonWeighting;
use crate::retry::RetryPolicy;
use crate::training::{LearnerKind, MIN_TRAINING_SAMPLES};
use crate::walkforward::WindowKind;

/// Upper bound on `io_retry_attempts`.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;
/// Upper bound on the initial retry backoff.
pub const MAX_RETRY_BACKOFF_MS: u64 = 10_000;

/// Parameters for one walk-forward training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Business days between the first cutoff and the latest available date.
    pub initial_lookback_days: u32,
    /// Prediction horizons in business days.
    pub horizons: Vec<u32>,
    /// Upper bound on iterations.
    pub max_iterations: usize,
    /// Stop once the overall blended accuracy reaches this value.
    pub target_accuracy: f64,
    /// Stop once an iteration improves by less than this.
    pub min_accuracy_improvement: f64,
    /// Return fraction at or above which a label is positive.
    pub label_threshold: f64,
    /// Weight of confidence-weighted accuracy in the blend.
    pub blend_alpha: f64,
    /// Business days the cutoff advances between iterations.
    pub step_days: u32,
    /// Training window policy.
    pub window: WindowKind,
    /// How per-horizon accuracies combine into the overall average.
    pub horizon_weighting: HorizonWeighting,
    /// Classifier family.
    pub learner: LearnerKind,
    /// Floor on pooled training rows per horizon.
    pub min_training_samples: usize,
    /// Largest tolerated gap between mean probability and positive rate.
    pub calibration_tolerance: f64,
    /// Resolved predictions needed before a horizon can be flagged.
    pub min_calibration_samples: usize,
    /// Worker pool size (rayon default when unset).
    pub worker_threads: Option<usize>,
    /// Attempts per I/O operation, including the first.
    pub io_retry_attempts: u32,
    /// Initial backoff between I/O attempts.
    pub io_retry_backoff_ms: u64,
    /// Write each iteration's fitted models next to its summary.
    pub persist_models: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_lookback_days: 30,
            horizons: vec![1, 5, 10],
            max_iterations: 10,
            target_accuracy: 0.70,
            min_accuracy_improvement: 0.01,
            label_threshold: 0.02,
            blend_alpha: 0.40,
            step_days: 5,
            window: WindowKind::Expanding,
            horizon_weighting: HorizonWeighting::Equal,
            learner: LearnerKind::Logistic,
            min_training_samples: MIN_TRAINING_SAMPLES,
            calibration_tolerance: 0.15,
            min_calibration_samples: 10,
            worker_threads: None,
            io_retry_attempts: 3,
            io_retry_backoff_ms: 50,
            persist_models: true,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Set the prediction horizons.
    pub fn with_horizons(mut self, horizons: Vec<u32>) -> Self {
        self.horizons = horizons;
        self
    }

    /// Set the initial lookback.
    pub fn with_lookback(mut self, days: u32) -> Self {
        self.initial_lookback_days = days;
        self
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Horizons in ascending order.
    pub fn sorted_horizons(&self) -> Vec<u32> {
        let mut horizons = self.horizons.clone();
        horizons.sort_unstable();
        horizons.dedup();
        horizons
    }

    /// Retry policy for collaborator I/O.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.io_retry_attempts, self.io_retry_backoff_ms)
    }

    /// Check every parameter, failing on the first invalid one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_lookback_days == 0 {
            return invalid("initial_lookback_days must be greater than 0");
        }
        if self.horizons.is_empty() {
            return invalid("horizons must not be empty");
        }
        if self.horizons.contains(&0) {
            return invalid("horizons must be positive");
        }
        let unique: BTreeSet<u32> = self.horizons.iter().copied().collect();
        if unique.len() != self.horizons.len() {
            return invalid("horizons must not contain duplicates");
        }
        if self.max_iterations == 0 {
            return invalid("max_iterations must be at least 1");
        }
        if !(self.target_accuracy > 0.0 && self.target_accuracy <= 1.0) {
            return invalid(format!(
                "target_accuracy must be in (0, 1], got {}",
                self.target_accuracy
            ));
        }
        if !(self.min_accuracy_improvement.is_finite() && self.min_accuracy_improvement >= 0.0) {
            return invalid(format!(
                "min_accuracy_improvement must be >= 0, got {}",
                self.min_accuracy_improvement
            ));
        }
        if !self.label_threshold.is_finite() || self.label_threshold <= -1.0 {
            return invalid(format!(
                "label_threshold must be a finite return above -1, got {}",
                self.label_threshold
            ));
        }
        if !(0.0..=1.0).contains(&self.blend_alpha) {
            return invalid(format!("blend_alpha must be in [0, 1], got {}", self.blend_alpha));
        }
        if self.step_days == 0 {
            return invalid("step_days must be greater than 0");
        }
        if let WindowKind::Sliding { train_days } = self.window {
            if train_days == 0 {
                return invalid("window.train_days must be greater than 0");
            }
        }
        self.horizon_weighting
            .validate(&self.horizons)
            .map_err(ConfigError::Invalid)?;
        if self.min_training_samples == 0 {
            return invalid("min_training_samples must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.calibration_tolerance) {
            return invalid(format!(
                "calibration_tolerance must be in [0, 1], got {}",
                self.calibration_tolerance
            ));
        }
        if self.worker_threads == Some(0) {
            return invalid("worker_threads must be at least 1 when set");
        }
        if self.io_retry_attempts == 0 || self.io_retry_attempts > MAX_RETRY_ATTEMPTS {
            return invalid(format!(
                "io_retry_attempts must be in [1, {}], got {}",
                MAX_RETRY_ATTEMPTS, self.io_retry_attempts
            ));
        }
        if self.io_retry_backoff_ms > MAX_RETRY_BACKOFF_MS {
            return invalid(format!(
                "io_retry_backoff_ms must be at most {}, got {}",
                MAX_RETRY_BACKOFF_MS, self.io_retry_backoff_ms
            ));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(message.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::HorizonWeight;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.horizons, vec![1, 5, 10]);
        assert_eq!(config.initial_lookback_days, 30);
        assert_eq!(config.target_accuracy, 0.70);
        assert_eq!(config.blend_alpha, 0.40);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = EngineConfig::from_toml_str(include_str!("../config/default.toml")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            horizons = [5]
            label_threshold = -0.01
            learner = "naive_bayes"

            [window]
            kind = "sliding"
            train_days = 120

            [horizon_weighting]
            kind = "sample_count"
            "#,
        )
        .unwrap();

        assert_eq!(config.horizons, vec![5]);
        assert_eq!(config.label_threshold, -0.01);
        assert_eq!(config.learner, LearnerKind::NaiveBayes);
        assert_eq!(config.window, WindowKind::Sliding { train_days: 120 });
        assert_eq!(config.horizon_weighting, HorizonWeighting::SampleCount);
        assert_eq!(config.max_iterations, 10);
    }

    #[test]
    fn test_custom_weighting_from_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            horizons = [1, 5]

            [horizon_weighting]
            kind = "custom"
            weights = [{ horizon = 1, weight = 1.0 }, { horizon = 5, weight = 3.0 }]
            "#,
        )
        .unwrap();
        assert_eq!(
            config.horizon_weighting,
            HorizonWeighting::Custom {
                weights: vec![
                    HorizonWeight { horizon: 1, weight: 1.0 },
                    HorizonWeight { horizon: 5, weight: 3.0 },
                ]
            }
        );
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = EngineConfig::from_toml_str("lookback = 30").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_invalid_values_fail_fast() {
        let cases = vec![
            EngineConfig::default().with_lookback(0),
            EngineConfig::default().with_horizons(vec![]),
            EngineConfig::default().with_horizons(vec![0, 5]),
            EngineConfig::default().with_horizons(vec![5, 5]),
            EngineConfig::default().with_max_iterations(0),
            EngineConfig {
                target_accuracy: 0.0,
                ..Default::default()
            },
            EngineConfig {
                target_accuracy: 1.5,
                ..Default::default()
            },
            EngineConfig {
                min_accuracy_improvement: -0.1,
                ..Default::default()
            },
            EngineConfig {
                blend_alpha: 1.2,
                ..Default::default()
            },
            EngineConfig {
                label_threshold: f64::NAN,
                ..Default::default()
            },
            EngineConfig {
                worker_threads: Some(0),
                ..Default::default()
            },
            EngineConfig {
                window: WindowKind::Sliding { train_days: 0 },
                ..Default::default()
            },
            EngineConfig {
                min_training_samples: 0,
                ..Default::default()
            },
            EngineConfig {
                io_retry_attempts: 0,
                ..Default::default()
            },
            EngineConfig {
                io_retry_attempts: MAX_RETRY_ATTEMPTS + 1,
                ..Default::default()
            },
            EngineConfig {
                io_retry_backoff_ms: MAX_RETRY_BACKOFF_MS + 1,
                ..Default::default()
            },
        ];

        for config in cases {
            assert!(
                matches!(config.validate(), Err(ConfigError::Invalid(_))),
                "expected invalid: {:?}",
                config
            );
        }
    }

    #[test]
    fn test_target_accuracy_of_one_is_allowed() {
        let config = EngineConfig {
            target_accuracy: 1.0,
            blend_alpha: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_retry_bounds_are_inclusive() {
        let config = EngineConfig {
            io_retry_attempts: MAX_RETRY_ATTEMPTS,
            io_retry_backoff_ms: MAX_RETRY_BACKOFF_MS,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = EngineConfig::from_toml_file("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
