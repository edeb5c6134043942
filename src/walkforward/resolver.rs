//! Outcome resolution.
//!
//! A prediction resolves against the close of the first trading day on or
//! after its target date, provided that day is no later than the latest
//! available date. Otherwise it stays pending for this iteration.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::data::{to_f64, PriceSeries};
use crate::training::{label_for_return, realized_return};

use super::predictor::Prediction;

/// Realized result of a prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub prediction: Prediction,
    /// `scan_date + horizon` business days.
    pub target_date: NaiveDate,
    /// Trading day the price was taken from (on or after `target_date`).
    pub actual_date: NaiveDate,
    pub actual_price: Decimal,
    pub realized_return: f64,
    pub label: u8,
    pub correct: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(Outcome),
    /// The target trading day is not available yet.
    Pending,
}

impl Resolution {
    pub fn outcome(self) -> Option<Outcome> {
        match self {
            Self::Resolved(outcome) => Some(outcome),
            Self::Pending => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OutcomeResolver {
    label_threshold: f64,
}

impl OutcomeResolver {
    /// `label_threshold` must match the one the models were trained with.
    pub fn new(label_threshold: f64) -> Self {
        Self { label_threshold }
    }

    pub fn resolve(&self, prediction: &Prediction, series: &PriceSeries, latest: NaiveDate) -> Resolution {
        let target_date = prediction.target_date();
        if target_date > latest {
            return Resolution::Pending;
        }

        let Some(bar) = series
            .first_index_on_or_after(target_date)
            .and_then(|idx| series.bar(idx))
            .filter(|bar| bar.date <= latest)
        else {
            return Resolution::Pending;
        };

        let entry = to_f64(prediction.entry_price);
        if entry <= 0.0 {
            return Resolution::Pending;
        }
        let ret = realized_return(entry, bar.close_f64());
        let label = label_for_return(ret, self.label_threshold);

        Resolution::Resolved(Outcome {
            prediction: prediction.clone(),
            target_date,
            actual_date: bar.date,
            actual_price: bar.close,
            realized_return: ret,
            label,
            correct: prediction.predicted_class == label,
        })
    }

    /// Resolve a batch, returning outcomes and the predictions left pending.
    pub fn resolve_all(
        &self,
        predictions: &[Prediction],
        series: &PriceSeries,
        latest: NaiveDate,
    ) -> (Vec<Outcome>, Vec<Prediction>) {
        let mut outcomes = Vec::new();
        let mut pending = Vec::new();
        for prediction in predictions {
            match self.resolve(prediction, series, latest) {
                Resolution::Resolved(outcome) => outcomes.push(outcome),
                Resolution::Pending => pending.push(prediction.clone()),
            }
        }
        (outcomes, pending)
    }
}
