//! Scoring of resolved predictions.
//!
//! - Raw, confidence-weighted and blended accuracy per horizon
//! - Overall average with configurable horizon weighting
//! - Calibration drift: mean probability vs positive rate, Brier score, ECE

pub mod accuracy;
pub mod calibration;

pub use accuracy::{confidence_weight, AccuracyAggregator, HorizonAccuracy, HorizonWeight, HorizonWeighting};
pub use calibration::{CalibrationBucket, CalibrationCheck, CalibrationReport};
