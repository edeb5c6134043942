//! Horizon model training.
//!
//! One [`HorizonModel`] is fitted per horizon by pooling the labelled rows of
//! every symbol. Rows are restricted to dates strictly before the cutoff, and
//! so are the future bars their labels come from.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::PriceSeries;
use crate::error::InsufficientDataError;

use super::features::{SeriesView, FEATURE_NAMES};
use super::labels::LabelBuilder;
use super::learner::{FittedModel, LearnerKind};

/// Default floor on pooled training rows per horizon.
pub const MIN_TRAINING_SAMPLES: usize = 30;

/// Feature scaling fitted on training rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Standardizer {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl Standardizer {
    /// Column means and population standard deviations; near-zero spreads
    /// are replaced by 1.
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let dims = rows.first().map(|r| r.len()).unwrap_or(0);
        let n = rows.len().max(1) as f64;

        let means: Vec<f64> = (0..dims)
            .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n)
            .collect();
        let stds = (0..dims)
            .map(|j| {
                let var = rows.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                if std < 1e-12 || !std.is_finite() {
                    1.0
                } else {
                    std
                }
            })
            .collect();

        Self { means, stds }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.means.iter().zip(&self.stds))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }
}

/// A fitted classifier for one horizon and one training cutoff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonModel {
    pub horizon_days: u32,
    /// Every training row and label bar is dated strictly before this.
    pub training_cutoff: NaiveDate,
    pub label_threshold: f64,
    pub learner: LearnerKind,
    pub feature_names: Vec<String>,
    pub standardizer: Standardizer,
    pub fitted: FittedModel,
    pub training_samples: usize,
    /// Share of positive labels in the training rows.
    pub positive_rate: f64,
}

impl HorizonModel {
    /// Probability of a positive label for a raw feature vector.
    pub fn predict_proba(&self, features: &[f64]) -> f64 {
        let scaled = self.standardizer.transform(features);
        let p = self.fitted.predict_proba(&scaled);
        if p.is_finite() {
            p.clamp(0.0, 1.0)
        } else {
            0.5
        }
    }
}

/// Pooled rows for one horizon.
#[derive(Debug, Clone, Default)]
pub struct TrainingSet {
    pub features: Vec<Vec<f64>>,
    pub labels: Vec<u8>,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Append another set's rows.
    pub fn extend(&mut self, other: TrainingSet) {
        self.features.extend(other.features);
        self.labels.extend(other.labels);
    }
}

/// Fits horizon models from price history.
#[derive(Debug, Clone)]
pub struct HorizonTrainer {
    label_threshold: f64,
    learner: LearnerKind,
    min_samples: usize,
    window_start: Option<NaiveDate>,
}

impl HorizonTrainer {
    pub fn new(label_threshold: f64, learner: LearnerKind) -> Self {
        Self {
            label_threshold,
            learner,
            min_samples: MIN_TRAINING_SAMPLES,
            window_start: None,
        }
    }

    /// Override the training row floor.
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples.max(1);
        self
    }

    /// Only use rows dated on or after `start`. Earlier bars still feed the
    /// feature warm-up.
    pub fn with_window_start(mut self, start: Option<NaiveDate>) -> Self {
        self.window_start = start;
        self
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    /// Labelled feature rows of one symbol for `horizon`.
    pub fn symbol_rows(&self, series: &PriceSeries, cutoff: NaiveDate, horizon: u32) -> TrainingSet {
        let visible = series.truncated_before(cutoff);
        let view = SeriesView::new(&visible);
        let labels = LabelBuilder::new(horizon, self.label_threshold).build(&visible, cutoff);

        let mut set = TrainingSet::default();
        for row in labels {
            if self.window_start.is_some_and(|start| row.date < start) {
                continue;
            }
            if let Some(features) = view.features_at(row.index) {
                set.features.push(features.to_vec());
                set.labels.push(row.label);
            }
        }
        set
    }

    /// Fit a model on pooled rows.
    pub fn fit(
        &self,
        set: TrainingSet,
        cutoff: NaiveDate,
        horizon: u32,
    ) -> Result<HorizonModel, InsufficientDataError> {
        if set.len() < self.min_samples {
            return Err(InsufficientDataError {
                symbol: None,
                horizon: Some(horizon),
                available: set.len(),
                required: self.min_samples,
            });
        }

        let standardizer = Standardizer::fit(&set.features);
        let scaled: Vec<Vec<f64>> = set
            .features
            .iter()
            .map(|row| standardizer.transform(row))
            .collect();

        let learner = self.learner.build();
        let fitted = learner.fit(&scaled, &set.labels);

        let positives = set.labels.iter().filter(|&&l| l == 1).count();
        let positive_rate = positives as f64 / set.len() as f64;

        debug!(
            "Trained {} model for {}D on {} rows (positive rate {:.2})",
            learner.name(),
            horizon,
            set.len(),
            positive_rate
        );

        Ok(HorizonModel {
            horizon_days: horizon,
            training_cutoff: cutoff,
            label_threshold: self.label_threshold,
            learner: self.learner,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            standardizer,
            fitted,
            training_samples: set.len(),
            positive_rate,
        })
    }

    /// Train one horizon on every series, using only data before `cutoff`.
    pub fn train(
        &self,
        price_data: &[PriceSeries],
        cutoff: NaiveDate,
        horizon: u32,
    ) -> Result<HorizonModel, InsufficientDataError> {
        let mut pooled = TrainingSet::default();
        for series in price_data {
            pooled.extend(self.symbol_rows(series, cutoff, horizon));
        }
        self.fit(pooled, cutoff, horizon)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{add_business_days, PriceBar};
    use rust_decimal::Decimal;

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    /// Saw-tooth path so both labels occur.
    fn saw_series(symbol: &str, len: usize) -> PriceSeries {
        let bars = (0..len)
            .map(|i| {
                let close = 100 + ((i * 7) % 11) as i64;
                PriceBar::flat(
                    add_business_days(start(), i as u32),
                    Decimal::from(close),
                    1000 + (i as i64 % 5) * 100,
                )
            })
            .collect();
        PriceSeries::from_bars(symbol, bars)
    }

    #[test]
    fn test_standardizer_handles_constant_columns() {
        let rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        let s = Standardizer::fit(&rows);
        assert_eq!(s.means, vec![2.0, 5.0]);
        assert_eq!(s.stds, vec![1.0, 1.0]);
        assert_eq!(s.transform(&[3.0, 5.0]), vec![1.0, 0.0]);
    }

    #[test]
    fn test_insufficient_rows_fail() {
        let trainer = HorizonTrainer::new(0.0, LearnerKind::Logistic);
        let series = saw_series("AAA", 20);
        let cutoff = add_business_days(start(), 20);
        let err = trainer.train(&[series], cutoff, 5).unwrap_err();
        assert_eq!(err.horizon, Some(5));
        assert_eq!(err.required, MIN_TRAINING_SAMPLES);
        assert!(err.available < MIN_TRAINING_SAMPLES);
    }

    #[test]
    fn test_rows_never_reach_cutoff() {
        let trainer = HorizonTrainer::new(0.0, LearnerKind::Logistic);
        let series = saw_series("AAA", 80);
        let cutoff = add_business_days(start(), 60);
        let set = trainer.symbol_rows(&series, cutoff, 5);
        // rows 10..=54 have a label bar before row 60
        assert_eq!(set.len(), 45);
    }

    #[test]
    fn test_planted_future_spike_does_not_change_model() {
        let trainer = HorizonTrainer::new(0.0, LearnerKind::Logistic);
        let cutoff = add_business_days(start(), 60);
        let clean = saw_series("AAA", 80);

        let mut bars = clean.bars().to_vec();
        for bar in bars.iter_mut().filter(|b| b.date >= cutoff) {
            bar.close *= Decimal::from(50);
            bar.volume *= 100;
        }
        let spiked = PriceSeries::from_bars("AAA", bars);

        let a = trainer.train(&[clean], cutoff, 5).unwrap();
        let b = trainer.train(&[spiked], cutoff, 5).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.training_cutoff, cutoff);
    }

    #[test]
    fn test_window_start_limits_rows() {
        let cutoff = add_business_days(start(), 60);
        let series = saw_series("AAA", 80);
        let full = HorizonTrainer::new(0.0, LearnerKind::Logistic).symbol_rows(&series, cutoff, 5);
        let window_start = add_business_days(start(), 30);
        let sliding = HorizonTrainer::new(0.0, LearnerKind::Logistic)
            .with_window_start(Some(window_start))
            .symbol_rows(&series, cutoff, 5);
        assert_eq!(sliding.len(), full.len() - 20);
    }

    #[test]
    fn test_pooling_and_predictions() {
        let trainer = HorizonTrainer::new(0.0, LearnerKind::NaiveBayes).with_min_samples(10);
        let cutoff = add_business_days(start(), 60);
        let model = trainer
            .train(&[saw_series("AAA", 80), saw_series("BBB", 70)], cutoff, 1)
            .unwrap();
        assert_eq!(model.training_samples, 2 * 49);
        assert_eq!(model.feature_names.len(), 7);
        assert!((0.0..=1.0).contains(&model.positive_rate));

        let p = model.predict_proba(&[0.01, 0.02, 0.0, 0.01, 0.0, 0.0, 1.0]);
        assert!((0.0..=1.0).contains(&p));
    }
}
