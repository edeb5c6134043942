//! Classifier families.
//!
//! A [`Learner`] turns a standardized feature matrix and 0/1 labels into a
//! [`FittedModel`]. Fitted models are plain data so they serialize with the
//! rest of a `HorizonModel`.

use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, Normal};

/// Capability interface for training a binary classifier.
pub trait Learner: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fit on rows of equal length with labels in {0, 1}.
    fn fit(&self, features: &[Vec<f64>], labels: &[u8]) -> FittedModel;
}

/// Configured learner family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearnerKind {
    #[default]
    Logistic,
    NaiveBayes,
}

impl LearnerKind {
    pub fn build(&self) -> Box<dyn Learner> {
        match self {
            Self::Logistic => Box::new(LogisticRegression::default()),
            Self::NaiveBayes => Box::new(GaussianNaiveBayes),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logistic => "logistic",
            Self::NaiveBayes => "naive_bayes",
        }
    }
}

/// Per-class statistics for Gaussian naive Bayes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    pub count: usize,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

/// Trained parameters of one learner family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FittedModel {
    Logistic {
        weights: Vec<f64>,
        bias: f64,
    },
    NaiveBayes {
        negative: ClassStats,
        positive: ClassStats,
    },
}

impl FittedModel {
    /// Probability that the label is 1.
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        match self {
            Self::Logistic { weights, bias } => {
                let z = bias + dot(weights, features);
                sigmoid(z)
            }
            Self::NaiveBayes { negative, positive } => {
                naive_bayes_proba(negative, positive, features)
            }
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// L2-regularized logistic regression fitted by full-batch gradient descent.
///
/// Starts from zero weights and iterates a fixed number of epochs, so the
/// same inputs always produce the same parameters.
#[derive(Debug, Clone, Copy)]
pub struct LogisticRegression {
    pub learning_rate: f64,
    pub epochs: usize,
    pub l2: f64,
}

impl Default for LogisticRegression {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            epochs: 300,
            l2: 1e-3,
        }
    }
}

impl Learner for LogisticRegression {
    fn name(&self) -> &'static str {
        "logistic"
    }

    fn fit(&self, features: &[Vec<f64>], labels: &[u8]) -> FittedModel {
        let dims = features.first().map(|r| r.len()).unwrap_or(0);
        let mut weights = vec![0.0; dims];
        let mut bias = 0.0;

        let n = features.len().min(labels.len());
        if n == 0 {
            return FittedModel::Logistic { weights, bias };
        }
        let inv_n = 1.0 / n as f64;

        for _ in 0..self.epochs {
            let mut grad_w = vec![0.0; dims];
            let mut grad_b = 0.0;

            for (row, &label) in features.iter().zip(labels) {
                let err = sigmoid(bias + dot(&weights, row)) - f64::from(label);
                for (g, x) in grad_w.iter_mut().zip(row) {
                    *g += err * x;
                }
                grad_b += err;
            }

            for (w, g) in weights.iter_mut().zip(&grad_w) {
                *w -= self.learning_rate * (g * inv_n + self.l2 * *w);
            }
            bias -= self.learning_rate * grad_b * inv_n;
        }

        FittedModel::Logistic { weights, bias }
    }
}

/// Gaussian naive Bayes with Laplace-smoothed class priors.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussianNaiveBayes;

/// Variance floor relative to the largest feature variance.
const VAR_SMOOTHING: f64 = 1e-9;

impl Learner for GaussianNaiveBayes {
    fn name(&self) -> &'static str {
        "naive_bayes"
    }

    fn fit(&self, features: &[Vec<f64>], labels: &[u8]) -> FittedModel {
        let dims = features.first().map(|r| r.len()).unwrap_or(0);
        let rows: Vec<(&Vec<f64>, u8)> = features.iter().zip(labels.iter().copied()).collect();

        let max_var = (0..dims)
            .map(|j| variance(rows.iter().map(|(r, _)| r[j])))
            .fold(0.0, f64::max);
        let epsilon = (VAR_SMOOTHING * max_var).max(1e-12);

        let stats_for = |class: u8| {
            let members: Vec<&Vec<f64>> = rows
                .iter()
                .filter(|(_, l)| *l == class)
                .map(|(r, _)| *r)
                .collect();
            let means = (0..dims)
                .map(|j| mean(members.iter().map(|r| r[j])))
                .collect();
            let stds = (0..dims)
                .map(|j| (variance(members.iter().map(|r| r[j])) + epsilon).sqrt())
                .collect();
            ClassStats {
                count: members.len(),
                means,
                stds,
            }
        };

        FittedModel::NaiveBayes {
            negative: stats_for(0),
            positive: stats_for(1),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn variance(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let m = mean(values.clone());
    mean(values.map(|v| (v - m).powi(2)))
}

fn naive_bayes_proba(negative: &ClassStats, positive: &ClassStats, features: &[f64]) -> f64 {
    let total = (negative.count + positive.count) as f64;
    let prior_pos = (positive.count as f64 + 1.0) / (total + 2.0);

    // one class never seen: nothing to compare densities against
    if negative.count == 0 || positive.count == 0 {
        return prior_pos;
    }

    let log_pos = prior_pos.ln() + log_likelihood(positive, features);
    let log_neg = (1.0 - prior_pos).ln() + log_likelihood(negative, features);
    let proba = sigmoid(log_pos - log_neg);
    if proba.is_finite() {
        proba
    } else {
        prior_pos
    }
}

fn log_likelihood(stats: &ClassStats, features: &[f64]) -> f64 {
    stats
        .means
        .iter()
        .zip(&stats.stds)
        .zip(features)
        .filter_map(|((&m, &s), &x)| Normal::new(m, s).ok().map(|n| n.ln_pdf(x)))
        .sum()
}
