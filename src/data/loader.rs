//! File-backed price data accessor.
//!
//! Reads one file per symbol from a data directory, either
//! `<data_dir>/<SYMBOL>.parquet` or `<data_dir>/<SYMBOL>.csv`, with columns:
//! - date (date, datetime, or `YYYY-MM-DD` string)
//! - open, high, low, close (numeric)
//! - volume (numeric)

use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use polars::prelude::*;
use rust_decimal::Decimal;

use crate::error::DataAccessError;

use super::accessor::HistoricalDataAccessor;
use super::types::{PriceBar, PriceSeries};

/// Expected columns in the price files.
pub const EXPECTED_COLUMNS: &[&str] = &["date", "open", "high", "low", "close", "volume"];

const SUPPORTED_EXTENSIONS: &[&str] = &["parquet", "csv"];

/// Parquet/CSV reader for daily price files.
pub struct FileAccessor {
    data_dir: PathBuf,
}

impl FileAccessor {
    /// Create an accessor over a price data directory.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of a symbol's price file, preferring parquet over CSV.
    fn price_path(&self, symbol: &str) -> Option<PathBuf> {
        SUPPORTED_EXTENSIONS
            .iter()
            .map(|ext| self.data_dir.join(format!("{}.{}", symbol, ext)))
            .find(|p| p.exists())
    }

    /// Lazy scan of a symbol's raw price file.
    pub fn load_lazy(&self, symbol: &str) -> Result<LazyFrame, DataAccessError> {
        let path = self.price_path(symbol).ok_or_else(|| {
            DataAccessError::NotFound(format!("{}/{}", self.data_dir.display(), symbol))
        })?;

        let lf = match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => LazyCsvReader::new(&path).with_has_header(true).finish()?,
            _ => LazyFrame::scan_parquet(&path, ScanArgsParquet::default())?,
        };
        Ok(lf)
    }

    /// Normalized frame with rows dated strictly before `cutoff`.
    ///
    /// Dates are compared as `YYYY-MM-DD` strings, which order the same way as
    /// the dates themselves for four-digit years.
    pub fn load_dataframe(&self, symbol: &str, cutoff: NaiveDate) -> Result<DataFrame, DataAccessError> {
        let mut lf = self.load_lazy(symbol)?.select([
            col("date").cast(DataType::String),
            col("open").cast(DataType::Float64),
            col("high").cast(DataType::Float64),
            col("low").cast(DataType::Float64),
            col("close").cast(DataType::Float64),
            col("volume").cast(DataType::Float64),
        ]);

        if cutoff.year() <= 9999 {
            lf = lf.filter(col("date").lt(lit(cutoff.to_string())));
        }

        Ok(lf.collect()?)
    }
}

impl HistoricalDataAccessor for FileAccessor {
    fn symbols(&self) -> Result<Vec<String>, DataAccessError> {
        if !self.data_dir.exists() {
            return Ok(vec![]);
        }

        let mut symbols = Vec::new();
        for entry in std::fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();
            let is_price_file = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| SUPPORTED_EXTENSIONS.contains(&e))
                .unwrap_or(false);
            if !is_price_file {
                continue;
            }
            if let Some(stem) = path.file_stem() {
                symbols.push(stem.to_string_lossy().to_string());
            }
        }
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }

    fn load_until(&self, symbol: &str, cutoff: NaiveDate) -> Result<PriceSeries, DataAccessError> {
        let df = self.load_dataframe(symbol, cutoff)?;
        let bars = dataframe_to_bars(&df)?;
        // String filtering is not trusted for odd date encodings
        let bars = bars.into_iter().filter(|b| b.date < cutoff).collect();
        Ok(PriceSeries::from_bars(symbol, bars))
    }
}

/// Parse the leading `YYYY-MM-DD` of a date or datetime string.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

fn decimal(value: f64) -> Decimal {
    Decimal::from_f64_retain(value).unwrap_or_default()
}

/// Convert a normalized frame to bars, skipping rows without a date or close.
fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<PriceBar>, DataAccessError> {
    let date_col = df.column("date")?.str()?;
    let open_col = df.column("open")?.f64()?;
    let high_col = df.column("high")?.f64()?;
    let low_col = df.column("low")?.f64()?;
    let close_col = df.column("close")?.f64()?;
    let volume_col = df.column("volume")?.f64()?;

    let mut bars = Vec::with_capacity(df.height());
    let mut skipped = 0usize;

    for idx in 0..df.height() {
        let date = date_col.get(idx).and_then(parse_date);
        let close = close_col.get(idx).filter(|c| c.is_finite() && *c > 0.0);

        let (date, close) = match (date, close) {
            (Some(d), Some(c)) => (d, c),
            _ => {
                skipped += 1;
                continue;
            }
        };

        let open = open_col.get(idx).unwrap_or(close);
        let high = high_col.get(idx).unwrap_or(close);
        let low = low_col.get(idx).unwrap_or(close);
        let volume = volume_col.get(idx).unwrap_or(0.0);

        bars.push(PriceBar {
            date,
            open: decimal(open),
            high: decimal(high),
            low: decimal(low),
            close: decimal(close),
            volume: volume.max(0.0).round() as i64,
        });
    }

    if skipped > 0 {
        tracing::debug!("Skipped {} rows without a usable date or close", skipped);
    }

    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn write_csv(dir: &Path, symbol: &str, body: &str) {
        let content = format!("date,open,high,low,close,volume\n{}", body);
        fs::write(dir.join(format!("{}.csv", symbol)), content).unwrap();
    }

    #[test]
    fn test_parse_date_accepts_datetimes() {
        assert_eq!(parse_date("2024-01-02"), Some(d(2024, 1, 2)));
        assert_eq!(parse_date("2024-01-02 00:00:00.000"), Some(d(2024, 1, 2)));
        assert_eq!(parse_date("garbage"), None);
    }

    #[test]
    fn test_expected_columns() {
        assert_eq!(EXPECTED_COLUMNS.len(), 6);
        assert!(EXPECTED_COLUMNS.contains(&"close"));
    }

    #[test]
    fn test_csv_load_sorts_dedups_and_truncates() {
        let dir = TempDir::new().unwrap();
        write_csv(
            dir.path(),
            "AAPL",
            "2024-01-04,3,3,3,3,300\n\
             2024-01-02,1,1,1,1,100\n\
             2024-01-03,2,2.5,1.5,2,200\n\
             2024-01-03,9,9,9,9,900\n\
             2024-01-05,4,4,4,4,400\n",
        );

        let accessor = FileAccessor::new(dir.path());
        let series = accessor.load_until("AAPL", d(2024, 1, 5)).unwrap();

        assert_eq!(
            series.dates(),
            vec![d(2024, 1, 2), d(2024, 1, 3), d(2024, 1, 4)]
        );
        assert!(series.bars().iter().all(|b| b.date < d(2024, 1, 5)));
        assert_eq!(series.bar(0).unwrap().volume, 100);
    }

    #[test]
    fn test_symbols_and_latest_date() {
        let dir = TempDir::new().unwrap();
        write_csv(dir.path(), "MSFT", "2024-01-02,1,1,1,1,1\n2024-01-03,1,1,1,1,1\n");
        write_csv(dir.path(), "AAPL", "2024-01-02,1,1,1,1,1\n2024-01-08,1,1,1,1,1\n");
        fs::write(dir.path().join("notes.txt"), "ignore me").unwrap();

        let accessor = FileAccessor::new(dir.path());
        let symbols = accessor.symbols().unwrap();
        assert_eq!(symbols, vec!["AAPL".to_string(), "MSFT".to_string()]);
        assert_eq!(accessor.latest_date(&symbols).unwrap(), Some(d(2024, 1, 8)));
    }

    #[test]
    fn test_parquet_load() {
        let dir = TempDir::new().unwrap();
        let mut df = df!(
            "date" => &["2024-01-03", "2024-01-02"],
            "open" => &[11.0, 10.0],
            "high" => &[12.0, 11.0],
            "low" => &[10.5, 9.5],
            "close" => &[11.5, 10.5],
            "volume" => &[2000i64, 1000i64],
        )
        .unwrap();
        let file = fs::File::create(dir.path().join("SPY.parquet")).unwrap();
        ParquetWriter::new(file).finish(&mut df).unwrap();

        let accessor = FileAccessor::new(dir.path());
        let series = accessor.load_until("SPY", NaiveDate::MAX).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.first_date(), Some(d(2024, 1, 2)));
        assert_eq!(series.bar(1).unwrap().close_f64(), 11.5);
        assert_eq!(series.bar(1).unwrap().volume, 2000);
    }

    #[test]
    fn test_missing_symbol_is_not_found() {
        let dir = TempDir::new().unwrap();
        let accessor = FileAccessor::new(dir.path());
        assert!(matches!(
            accessor.load_until("NOPE", d(2024, 1, 1)),
            Err(DataAccessError::NotFound(_))
        ));
        assert!(FileAccessor::new(dir.path().join("missing"))
            .symbols()
            .unwrap()
            .is_empty());
    }
}
