//! Historical data accessor interface.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::warn;

use crate::error::DataAccessError;

use super::types::PriceSeries;

/// Source of per-symbol price history.
///
/// Implementations must return bars strictly sorted by date, deduplicated, and
/// never include a bar dated on or after the requested cutoff.
pub trait HistoricalDataAccessor: Send + Sync {
    /// Symbols this accessor can serve.
    fn symbols(&self) -> Result<Vec<String>, DataAccessError>;

    /// Price history for `symbol` with every bar dated strictly before `cutoff`.
    fn load_until(&self, symbol: &str, cutoff: NaiveDate) -> Result<PriceSeries, DataAccessError>;

    /// Latest bar date across `symbols`, or `None` when none have data.
    /// Symbols that fail to load are skipped.
    fn latest_date(&self, symbols: &[String]) -> Result<Option<NaiveDate>, DataAccessError> {
        let mut latest: Option<NaiveDate> = None;
        for symbol in symbols {
            match self.load_until(symbol, NaiveDate::MAX) {
                Ok(series) => latest = latest.max(series.last_date()),
                Err(e) => warn!("Skipping {} in latest date lookup: {}", symbol, e),
            }
        }
        Ok(latest)
    }
}

/// Accessor over series held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccessor {
    series: BTreeMap<String, PriceSeries>,
}

impl InMemoryAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_series(series: impl IntoIterator<Item = PriceSeries>) -> Self {
        let mut accessor = Self::new();
        for s in series {
            accessor.insert(s);
        }
        accessor
    }

    /// Add or replace a symbol's series.
    pub fn insert(&mut self, series: PriceSeries) {
        self.series.insert(series.symbol().to_string(), series);
    }
}

impl HistoricalDataAccessor for InMemoryAccessor {
    fn symbols(&self) -> Result<Vec<String>, DataAccessError> {
        Ok(self.series.keys().cloned().collect())
    }

    fn load_until(&self, symbol: &str, cutoff: NaiveDate) -> Result<PriceSeries, DataAccessError> {
        self.series
            .get(symbol)
            .map(|s| s.truncated_before(cutoff))
            .ok_or_else(|| DataAccessError::NotFound(symbol.to_string()))
    }

    fn latest_date(&self, symbols: &[String]) -> Result<Option<NaiveDate>, DataAccessError> {
        Ok(symbols
            .iter()
            .filter_map(|s| self.series.get(s))
            .filter_map(|s| s.last_date())
            .max())
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

    fn accessor() -> InMemoryAccessor {
        InMemoryAccessor::from_series([
            PriceSeries::from_bars(
                "AAA",
                vec![
                    PriceBar::flat(d(2024, 1, 2), dec!(10), 1),
                    PriceBar::flat(d(2024, 1, 3), dec!(11), 1),
                ],
            ),
            PriceSeries::from_bars(
                "BBB",
                vec![
                    PriceBar::flat(d(2024, 1, 2), dec!(20), 1),
                    PriceBar::flat(d(2024, 1, 5), dec!(21), 1),
                ],
            ),
        ])
    }

    #[test]
    fn test_load_until_never_leaks_cutoff() {
        let acc = accessor();
        let series = acc.load_until("BBB", d(2024, 1, 5)).unwrap();
        assert_eq!(series.len(), 1);
        assert!(series.bars().iter().all(|b| b.date < d(2024, 1, 5)));
    }

    #[test]
    fn test_latest_date_across_symbols() {
        let acc = accessor();
        let symbols = acc.symbols().unwrap();
        assert_eq!(symbols, vec!["AAA".to_string(), "BBB".to_string()]);
        assert_eq!(acc.latest_date(&symbols).unwrap(), Some(d(2024, 1, 5)));
        assert_eq!(acc.latest_date(&["AAA".to_string()]).unwrap(), Some(d(2024, 1, 3)));
        assert_eq!(acc.latest_date(&[]).unwrap(), None);
    }

    /// Serves only `symbols` and `load_until`, keeping the default
    /// `latest_date`.
    struct PlainAccessor(InMemoryAccessor);

    impl HistoricalDataAccessor for PlainAccessor {
        fn symbols(&self) -> Result<Vec<String>, DataAccessError> {
            self.0.symbols()
        }

        fn load_until(&self, symbol: &str, cutoff: NaiveDate) -> Result<PriceSeries, DataAccessError> {
            self.0.load_until(symbol, cutoff)
        }
    }

    #[test]
    fn test_default_latest_date_skips_unloadable_symbols() {
        let acc = PlainAccessor(accessor());
        let symbols = vec!["AAA".to_string(), "MISSING".to_string(), "BBB".to_string()];
        assert_eq!(acc.latest_date(&symbols).unwrap(), Some(d(2024, 1, 5)));
        assert_eq!(acc.latest_date(&["MISSING".to_string()]).unwrap(), None);
    }

    #[test]
    fn test_unknown_symbol_is_not_found() {
        let acc = accessor();
        assert!(matches!(
            acc.load_until("ZZZ", d(2024, 1, 5)),
            Err(DataAccessError::NotFound(_))
        ));
    }
}
