//! Per-row feature extraction.
//!
//! Every feature at row `i` is computed from bars `0..=i` only, so a feature
//! vector never sees prices after its own date.

use chrono::NaiveDate;

use crate::data::PriceSeries;

/// Rows of history needed before the first feature vector.
pub const FEATURE_WARMUP: usize = 10;

/// Feature names in vector order.
pub const FEATURE_NAMES: [&str; 7] = [
    "ret_1",
    "ret_5",
    "ret_10",
    "volatility_10",
    "sma_10_rel",
    "range_pct",
    "volume_ratio_10",
];

pub const FEATURE_COUNT: usize = FEATURE_NAMES.len();

/// Column-oriented `f64` copy of a series for fast feature computation.
#[derive(Debug, Clone)]
pub struct SeriesView {
    dates: Vec<NaiveDate>,
    close: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    volume: Vec<f64>,
}

impl SeriesView {
    pub fn new(series: &PriceSeries) -> Self {
        let bars = series.bars();
        Self {
            dates: bars.iter().map(|b| b.date).collect(),
            close: bars.iter().map(|b| b.close_f64()).collect(),
            high: bars.iter().map(|b| b.high_f64()).collect(),
            low: bars.iter().map(|b| b.low_f64()).collect(),
            volume: bars.iter().map(|b| b.volume as f64).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn date(&self, idx: usize) -> Option<NaiveDate> {
        self.dates.get(idx).copied()
    }

    pub fn close(&self, idx: usize) -> Option<f64> {
        self.close.get(idx).copied()
    }

    /// Feature vector for row `idx`, or `None` during warm-up or when the
    /// window holds a non-positive close or a non-finite value.
    pub fn features_at(&self, idx: usize) -> Option<[f64; FEATURE_COUNT]> {
        if idx < FEATURE_WARMUP || idx >= self.len() {
            return None;
        }

        let closes = &self.close[idx - FEATURE_WARMUP..=idx];
        if closes.iter().any(|c| !c.is_finite() || *c <= 0.0) {
            return None;
        }

        let close = self.close[idx];
        let ret_1 = close / self.close[idx - 1] - 1.0;
        let ret_5 = close / self.close[idx - 5] - 1.0;
        let ret_10 = close / self.close[idx - 10] - 1.0;

        let daily: Vec<f64> = closes.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
        let volatility_10 = std_dev(&daily);

        let sma_10 = mean(&self.close[idx + 1 - FEATURE_WARMUP..=idx]);
        let sma_10_rel = close / sma_10 - 1.0;

        let range_pct = (self.high[idx] - self.low[idx]) / close;

        let avg_volume = mean(&self.volume[idx + 1 - FEATURE_WARMUP..=idx]);
        let volume_ratio_10 = if avg_volume > 0.0 {
            self.volume[idx] / avg_volume
        } else {
            1.0
        };

        let features = [
            ret_1,
            ret_5,
            ret_10,
            volatility_10,
            sma_10_rel,
            range_pct,
            volume_ratio_10,
        ];
        features.iter().all(|f| f.is_finite()).then_some(features)
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{add_business_days, PriceBar};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn series(closes: &[Decimal]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = closes
            .iter()
            .enumerate()
            .map(|(i, c)| PriceBar::flat(add_business_days(start, i as u32), *c, 1000))
            .collect();
        PriceSeries::from_bars("TEST", bars)
    }

    #[test]
    fn test_warmup_rows_have_no_features() {
        let view = SeriesView::new(&series(&[dec!(100); 12]));
        for idx in 0..FEATURE_WARMUP {
            assert!(view.features_at(idx).is_none());
        }
        assert!(view.features_at(FEATURE_WARMUP).is_some());
        assert!(view.features_at(12).is_none());
    }

    #[test]
    fn test_flat_series_features() {
        let view = SeriesView::new(&series(&[dec!(50); 11]));
        let f = view.features_at(10).unwrap();
        assert_eq!(f[..6], [0.0; 6]);
        assert_eq!(f[6], 1.0);
    }

    #[test]
    fn test_returns_use_only_past_rows() {
        let mut closes: Vec<Decimal> = (0..11).map(|i| Decimal::from(100 + i)).collect();
        let base = SeriesView::new(&series(&closes)).features_at(10).unwrap();

        // appending a huge future bar leaves row 10 unchanged
        closes.push(dec!(10000));
        let extended = SeriesView::new(&series(&closes)).features_at(10).unwrap();
        assert_eq!(base, extended);

        assert!((base[0] - (110.0 / 109.0 - 1.0)).abs() < 1e-12);
        assert!((base[1] - (110.0 / 105.0 - 1.0)).abs() < 1e-12);
        assert!((base[2] - (110.0 / 100.0 - 1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_non_positive_close_yields_none() {
        let mut closes = vec![dec!(100); 11];
        closes[3] = dec!(0);
        let view = SeriesView::new(&series(&closes));
        assert!(view.features_at(10).is_none());
    }

    #[test]
    fn test_feature_names_match_vector_length() {
        assert_eq!(FEATURE_COUNT, 7);
    }
}
