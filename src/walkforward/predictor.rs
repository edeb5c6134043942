//! Forward predictions over a validation window.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::PriceSeries;
use crate::training::{target_date, HorizonModel, SeriesView};

/// A model's call on one symbol, date and horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub symbol: String,
    pub scan_date: NaiveDate,
    pub horizon: u32,
    /// Probability of a positive label.
    pub probability: f64,
    /// 1 when `probability >= 0.5`.
    pub predicted_class: u8,
    /// Close on `scan_date`.
    pub entry_price: Decimal,
    /// Training cutoff of the model that made the call.
    pub model_cutoff: NaiveDate,
}

impl Prediction {
    pub fn new(
        symbol: impl Into<String>,
        scan_date: NaiveDate,
        horizon: u32,
        probability: f64,
        entry_price: Decimal,
        model_cutoff: NaiveDate,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            scan_date,
            horizon,
            probability,
            predicted_class: u8::from(probability >= 0.5),
            entry_price,
            model_cutoff,
        }
    }

    /// Nominal date the outcome is measured at.
    pub fn target_date(&self) -> NaiveDate {
        target_date(self.scan_date, self.horizon)
    }
}

/// Applies horizon models to price history.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardPredictor;

impl ForwardPredictor {
    /// Probability for the bar dated `date`, using history up to and including
    /// it. `None` when the series has no bar on `date` or it lacks warm-up.
    pub fn predict(&self, model: &HorizonModel, series: &PriceSeries, date: NaiveDate) -> Option<f64> {
        let visible = series.bars_through(date);
        let last = visible.last()?;
        if last.date != date {
            return None;
        }
        let view = SeriesView::new(&PriceSeries::from_bars(series.symbol(), visible.to_vec()));
        let features = view.features_at(visible.len() - 1)?;
        Some(model.predict_proba(&features))
    }

    /// One prediction per trading day in `(cutoff, latest]` and per model,
    /// ordered by scan date then horizon.
    pub fn predict_window(
        &self,
        models: &BTreeMap<u32, Arc<HorizonModel>>,
        series: &PriceSeries,
        cutoff: NaiveDate,
        latest: NaiveDate,
    ) -> Vec<Prediction> {
        let view = SeriesView::new(series);
        let mut predictions = Vec::new();

        for (idx, bar) in series.bars().iter().enumerate() {
            if bar.date <= cutoff || bar.date > latest {
                continue;
            }
            let Some(features) = view.features_at(idx) else {
                continue;
            };
            for (horizon, model) in models {
                predictions.push(Prediction::new(
                    series.symbol(),
                    bar.date,
                    *horizon,
                    model.predict_proba(&features),
                    bar.close,
                    model.training_cutoff,
                ));
            }
        }

        predictions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{add_business_days, PriceBar};
    use crate::training::{HorizonTrainer, LearnerKind};

    fn start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn series() -> PriceSeries {
        let bars = (0..80u32)
            .map(|i| {
                let close = Decimal::from(50 + (i * 5) % 9);
                PriceBar::flat(add_business_days(start(), i), close, 1000 + i as i64)
            })
            .collect();
        PriceSeries::from_bars("PRD", bars)
    }

    fn models(series: &PriceSeries, cutoff: NaiveDate) -> BTreeMap<u32, Arc<HorizonModel>> {
        let trainer = HorizonTrainer::new(0.0, LearnerKind::Logistic);
        [1u32, 5]
            .into_iter()
            .map(|h| {
                let model = trainer.train(std::slice::from_ref(series), cutoff, h).unwrap();
                (h, Arc::new(model))
            })
            .collect()
    }

    #[test]
    fn test_window_covers_each_trading_day_and_horizon() {
        let series = series();
        let cutoff = add_business_days(start(), 60);
        let latest = add_business_days(start(), 79);
        let models = models(&series, cutoff);

        let predictions = ForwardPredictor.predict_window(&models, &series, cutoff, latest);
        // days 61..=79, two horizons each
        assert_eq!(predictions.len(), 19 * 2);
        assert!(predictions.iter().all(|p| p.scan_date > cutoff && p.scan_date <= latest));
        assert!(predictions.iter().all(|p| p.model_cutoff == cutoff));
        assert_eq!(predictions[0].horizon, 1);
        assert_eq!(predictions[1].horizon, 5);
    }

    #[test]
    fn test_window_matches_single_date_predictions() {
        let series = series();
        let cutoff = add_business_days(start(), 60);
        let latest = add_business_days(start(), 79);
        let models = models(&series, cutoff);

        for p in ForwardPredictor.predict_window(&models, &series, cutoff, latest) {
            let single = ForwardPredictor
                .predict(&models[&p.horizon], &series, p.scan_date)
                .unwrap();
            assert_eq!(single.to_bits(), p.probability.to_bits());
            assert_eq!(p.predicted_class, u8::from(p.probability >= 0.5));
        }
    }

    #[test]
    fn test_never_predicts_past_latest() {
        let series = series();
        let cutoff = add_business_days(start(), 60);
        let latest = add_business_days(start(), 70);
        let predictions = ForwardPredictor.predict_window(&models(&series, cutoff), &series, cutoff, latest);
        assert!(predictions.iter().all(|p| p.scan_date <= latest));
        assert_eq!(predictions.len(), 10 * 2);
    }

    #[test]
    fn test_predict_needs_a_bar_on_the_date() {
        let series = series();
        let cutoff = add_business_days(start(), 60);
        let models = models(&series, cutoff);
        let saturday = NaiveDate::from_ymd_opt(2024, 3, 30).unwrap();
        assert!(ForwardPredictor.predict(&models[&1], &series, saturday).is_none());
        // warm-up rows have no features
        assert!(ForwardPredictor.predict(&models[&1], &series, start()).is_none());
    }

    #[test]
    fn test_prediction_class_threshold() {
        let date = start();
        assert_eq!(Prediction::new("X", date, 1, 0.5, Decimal::ONE, date).predicted_class, 1);
        assert_eq!(Prediction::new("X", date, 1, 0.4999, Decimal::ONE, date).predicted_class, 0);
        assert_eq!(
            Prediction::new("X", date, 5, 0.7, Decimal::ONE, date).target_date(),
            add_business_days(date, 5)
        );
    }
}
