//! Append-only storage for run artifacts.
//!
//! Records are keyed by `(run_id, iteration_index)`. Every write targets a
//! single record so a failed write can be retried without touching records
//! that already landed, and no record is ever overwritten.

pub mod atomic;
mod fs;
mod memory;

pub use self::fs::FsArtifactStore;
pub use self::memory::MemoryArtifactStore;

use crate::error::PersistenceError;
use crate::training::HorizonModel;
use crate::walkforward::{IterationSummary, Outcome, Prediction, RunManifest};

/// Destination for per-iteration summaries and their detail records.
pub trait ArtifactStore: Send + Sync {
    fn write_predictions(
        &self,
        run_id: &str,
        iteration: usize,
        predictions: &[Prediction],
    ) -> Result<(), PersistenceError>;

    fn write_outcomes(&self, run_id: &str, iteration: usize, outcomes: &[Outcome]) -> Result<(), PersistenceError>;

    fn write_model(&self, run_id: &str, iteration: usize, model: &HorizonModel) -> Result<(), PersistenceError>;

    /// Publish an iteration. Written after its detail records.
    fn write_summary(&self, run_id: &str, summary: &IterationSummary) -> Result<(), PersistenceError>;

    fn write_manifest(&self, manifest: &RunManifest) -> Result<(), PersistenceError>;

    /// Summaries of a run in iteration order.
    fn read_summaries(&self, run_id: &str) -> Result<Vec<IterationSummary>, PersistenceError>;

    fn read_manifest(&self, run_id: &str) -> Result<RunManifest, PersistenceError>;
}
