//! Core price data types.
//!
//! A [`PriceSeries`] is the unit handed out by a data accessor: one symbol's
//! daily bars, strictly increasing by date. Missing trading days are simply
//! absent; nothing is zero-filled.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

impl PriceBar {
    /// Bar with open/high/low equal to the close.
    pub fn flat(date: NaiveDate, close: Decimal, volume: i64) -> Self {
        Self {
            date,
            open: close,
            high: close,
            low: close,
            close,
            volume,
        }
    }

    pub fn close_f64(&self) -> f64 {
        to_f64(self.close)
    }

    pub fn high_f64(&self) -> f64 {
        to_f64(self.high)
    }

    pub fn low_f64(&self) -> f64 {
        to_f64(self.low)
    }
}

/// Convert a price to `f64` for numeric work.
pub fn to_f64(value: Decimal) -> f64 {
    value.try_into().unwrap_or(0.0)
}

/// Ordered, deduplicated daily bars for one symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    /// Build a series, sorting by date and keeping the first bar for any
    /// duplicated date.
    pub fn from_bars(symbol: impl Into<String>, mut bars: Vec<PriceBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);
        Self {
            symbol: symbol.into(),
            bars,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    /// Copy of the series holding only bars dated strictly before `cutoff`.
    pub fn truncated_before(&self, cutoff: NaiveDate) -> Self {
        let end = self.bars.partition_point(|b| b.date < cutoff);
        Self {
            symbol: self.symbol.clone(),
            bars: self.bars[..end].to_vec(),
        }
    }

    /// Bars dated on or before `date`.
    pub fn bars_through(&self, date: NaiveDate) -> &[PriceBar] {
        let end = self.bars.partition_point(|b| b.date <= date);
        &self.bars[..end]
    }

    /// Index of the bar dated exactly `date`.
    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.bars.binary_search_by_key(&date, |b| b.date).ok()
    }

    /// Index of the first bar dated on or after `date`.
    pub fn first_index_on_or_after(&self, date: NaiveDate) -> Option<usize> {
        let idx = self.bars.partition_point(|b| b.date < date);
        (idx < self.bars.len()).then_some(idx)
    }

    /// Bar at `idx`.
    pub fn bar(&self, idx: usize) -> Option<&PriceBar> {
        self.bars.get(idx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn sample() -> PriceSeries {
        PriceSeries::from_bars(
            "SPY",
            vec![
                PriceBar::flat(d(2024, 1, 4), dec!(102), 10),
                PriceBar::flat(d(2024, 1, 2), dec!(100), 10),
                PriceBar::flat(d(2024, 1, 3), dec!(101), 10),
                PriceBar::flat(d(2024, 1, 3), dec!(999), 10),
                PriceBar::flat(d(2024, 1, 8), dec!(104), 10),
            ],
        )
    }

    #[test]
    fn test_from_bars_sorts_and_dedups() {
        let series = sample();
        assert_eq!(
            series.dates(),
            vec![d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 4), d(2024, 1, 8)]
        );
        // first occurrence of a duplicated date wins
        assert_eq!(series.bar(1).unwrap().close, dec!(101));
    }

    #[test]
    fn test_truncated_before_is_strict() {
        let series = sample();
        let truncated = series.truncated_before(d(2024, 1, 4));
        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated.last_date(), Some(d(2024, 1, 3)));
        assert_eq!(truncated.symbol(), "SPY");
    }

    #[test]
    fn test_first_index_on_or_after_skips_gaps() {
        let series = sample();
        // Jan 5 is missing, the next bar is Jan 8
        assert_eq!(series.first_index_on_or_after(d(2024, 1, 5)), Some(3));
        assert_eq!(series.first_index_on_or_after(d(2024, 1, 4)), Some(2));
        assert_eq!(series.first_index_on_or_after(d(2024, 1, 9)), None);
    }

    #[test]
    fn test_bars_through_is_inclusive() {
        let series = sample();
        assert_eq!(series.bars_through(d(2024, 1, 3)).len(), 2);
        assert_eq!(series.bars_through(d(2023, 12, 31)).len(), 0);
    }

    #[test]
    fn test_close_conversion() {
        let bar = PriceBar::flat(d(2024, 1, 2), dec!(123.25), 0);
        assert_eq!(bar.close_f64(), 123.25);
    }
}
