//! Binary outcome labels.
//!
//! A row dated `d` is labelled from the close at the first trading day on or
//! after `d + horizon` business days. Training and outcome resolution share
//! these functions so both sides apply the same rule.

use chrono::NaiveDate;

use crate::data::{add_business_days, PriceSeries};

/// Nominal target date of a prediction made on `scan_date`.
pub fn target_date(scan_date: NaiveDate, horizon: u32) -> NaiveDate {
    add_business_days(scan_date, horizon)
}

/// Index of the first bar on or after the target date of `scan_date`.
pub fn future_index(series: &PriceSeries, scan_date: NaiveDate, horizon: u32) -> Option<usize> {
    series.first_index_on_or_after(target_date(scan_date, horizon))
}

pub fn realized_return(entry: f64, exit: f64) -> f64 {
    (exit - entry) / entry
}

/// 1 when the return reaches the threshold, else 0.
pub fn label_for_return(ret: f64, threshold: f64) -> u8 {
    u8::from(ret >= threshold)
}

/// A labelled row of a series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledRow {
    /// Row index in the source series.
    pub index: usize,
    pub date: NaiveDate,
    pub realized_return: f64,
    pub label: u8,
}

/// Builds labels for one horizon and threshold.
#[derive(Debug, Clone, Copy)]
pub struct LabelBuilder {
    pub horizon: u32,
    pub threshold: f64,
}

impl LabelBuilder {
    pub fn new(horizon: u32, threshold: f64) -> Self {
        Self { horizon, threshold }
    }

    /// Label every row whose future bar exists and is dated before `cutoff`.
    pub fn build(&self, series: &PriceSeries, cutoff: NaiveDate) -> Vec<LabeledRow> {
        let bars = series.bars();
        bars.iter()
            .enumerate()
            .filter(|(_, bar)| bar.date < cutoff)
            .filter_map(|(index, bar)| {
                let future = bars.get(future_index(series, bar.date, self.horizon)?)?;
                if future.date >= cutoff {
                    return None;
                }
                let entry = bar.close_f64();
                if entry <= 0.0 {
                    return None;
                }
                let ret = realized_return(entry, future.close_f64());
                Some(LabeledRow {
                    index,
                    date: bar.date,
                    realized_return: ret,
                    label: label_for_return(ret, self.threshold),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::PriceBar;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn series() -> PriceSeries {
        // Mon Jan 1 .. Fri Jan 12 with Jan 9 missing
        PriceSeries::from_bars(
            "LBL",
            vec![
                PriceBar::flat(d(2024, 1, 1), dec!(100), 1),
                PriceBar::flat(d(2024, 1, 2), dec!(100), 1),
                PriceBar::flat(d(2024, 1, 3), dec!(100), 1),
                PriceBar::flat(d(2024, 1, 4), dec!(100), 1),
                PriceBar::flat(d(2024, 1, 5), dec!(100), 1),
                PriceBar::flat(d(2024, 1, 8), dec!(103), 1),
                PriceBar::flat(d(2024, 1, 10), dec!(101), 1),
                PriceBar::flat(d(2024, 1, 11), dec!(99), 1),
                PriceBar::flat(d(2024, 1, 12), dec!(99), 1),
            ],
        )
    }

    #[test]
    fn test_label_threshold_is_inclusive() {
        assert_eq!(label_for_return(0.02, 0.02), 1);
        assert_eq!(label_for_return(0.0199, 0.02), 0);
        assert_eq!(label_for_return(-0.01, -0.02), 1);
    }

    #[test]
    fn test_future_index_rolls_over_missing_days() {
        let s = series();
        // Jan 4 + 3 business days = Jan 9 (missing), first bar after is Jan 10
        let idx = future_index(&s, d(2024, 1, 4), 3).unwrap();
        assert_eq!(s.bar(idx).unwrap().date, d(2024, 1, 10));
        assert_eq!(future_index(&s, d(2024, 1, 12), 1), None);
    }

    #[test]
    fn test_build_labels_and_drops_rows_past_cutoff() {
        let s = series();
        let builder = LabelBuilder::new(5, 0.02);
        let rows = builder.build(&s, d(2024, 1, 11));

        // Jan 1 -> Jan 8 (+3%), Jan 2 -> Jan 9 missing -> Jan 10 (+1%);
        // Jan 3 would resolve on Jan 10 too; Jan 4 resolves Jan 11 (>= cutoff)
        let dates: Vec<NaiveDate> = rows.iter().map(|r| r.date).collect();
        assert_eq!(dates, vec![d(2024, 1, 1), d(2024, 1, 2), d(2024, 1, 3)]);
        assert_eq!(rows[0].label, 1);
        assert_eq!(rows[1].label, 0);
        assert!((rows[0].realized_return - 0.03).abs() < 1e-12);
    }
}
