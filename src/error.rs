//! Error taxonomy for the training engine.
//!
//! - [`ConfigError`]: bad parameters, fatal before any iteration runs.
//! - [`InsufficientDataError`]: a symbol or horizon has too few usable rows;
//!   recovered by excluding it from the iteration.
//! - [`DataAccessError`]: collaborator I/O failure; retried, then the symbol is
//!   skipped for the iteration.
//! - [`PersistenceError`]: artifact or model write failure; always fatal.

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Insufficient data{}{}: {available} usable rows, {required} required", symbol_suffix(.symbol), horizon_suffix(.horizon))]
pub struct InsufficientDataError {
    pub symbol: Option<String>,
    pub horizon: Option<u32>,
    pub available: usize,
    pub required: usize,
}

fn symbol_suffix(symbol: &Option<String>) -> String {
    symbol.as_ref().map(|s| format!(" for {}", s)).unwrap_or_default()
}

fn horizon_suffix(horizon: &Option<u32>) -> String {
    horizon.map(|h| format!(" at {}D", h)).unwrap_or_default()
}

#[derive(Error, Debug)]
pub enum DataAccessError {
    #[error("No price data found: {0}")]
    NotFound(String),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Artifact already exists: {0}")]
    AlreadyExists(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Artifact not found: {0}")]
    NotFound(String),
}

/// Top-level error returned by [`crate::walkforward::IterationController::run`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    DataAccess(#[from] DataAccessError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("No data available: {0}")]
    NoData(String),

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors that may succeed when the same operation is attempted again.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for DataAccessError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Polars(_))
    }
}

impl Retryable for PersistenceError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = InsufficientDataError {
            symbol: Some("AAPL".to_string()),
            horizon: Some(5),
            available: 12,
            required: 30,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient data for AAPL at 5D: 12 usable rows, 30 required"
        );

        let pooled = InsufficientDataError {
            symbol: None,
            horizon: Some(10),
            available: 0,
            required: 30,
        };
        assert_eq!(
            pooled.to_string(),
            "Insufficient data at 10D: 0 usable rows, 30 required"
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(!DataAccessError::NotFound("SPY".into()).is_retryable());
        assert!(DataAccessError::Io(std::io::Error::other("disk")).is_retryable());
        assert!(!PersistenceError::AlreadyExists("x".into()).is_retryable());
        assert!(PersistenceError::Io {
            path: "x".into(),
            source: std::io::Error::other("disk"),
        }
        .is_retryable());
    }
}
