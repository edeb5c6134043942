//! Filesystem artifact store.
//!
//! Layout under the store root:
//!
//! ```text
//! <run_id>/run.json
//! <run_id>/iteration_01.json
//! <run_id>/iteration_01_predictions.json
//! <run_id>/iteration_01_outcomes.json
//! <run_id>/models/iteration_01_h5.json
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::PersistenceError;
use crate::training::HorizonModel;
use crate::walkforward::{IterationSummary, Outcome, Prediction, RunManifest};

use super::atomic::{read_json, write_json};
use super::ArtifactStore;

const MANIFEST_FILE: &str = "run.json";

/// Each call makes a single write attempt; retrying is left to the caller.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root.join(run_id)
    }

    fn iteration_path(&self, run_id: &str, iteration: usize, suffix: &str) -> PathBuf {
        self.run_dir(run_id)
            .join(format!("iteration_{:02}{}.json", iteration, suffix))
    }

    pub fn model_path(&self, run_id: &str, iteration: usize, horizon: u32) -> PathBuf {
        self.run_dir(run_id)
            .join("models")
            .join(format!("iteration_{:02}_h{}.json", iteration, horizon))
    }

    /// Run ids with a directory under the root, sorted.
    pub fn runs(&self) -> Result<Vec<String>, PersistenceError> {
        if !self.root.exists() {
            return Ok(vec![]);
        }
        let entries = std::fs::read_dir(&self.root).map_err(|source| PersistenceError::Io {
            path: self.root.display().to_string(),
            source,
        })?;

        let mut runs: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        runs.sort();
        Ok(runs)
    }

    fn write_new<T: serde::Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), PersistenceError> {
        write_json(path, value, false)?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// Iteration index of a summary file name (`iteration_NN.json`).
fn summary_index(name: &str) -> Option<usize> {
    name.strip_prefix("iteration_")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

impl ArtifactStore for FsArtifactStore {
    fn write_predictions(
        &self,
        run_id: &str,
        iteration: usize,
        predictions: &[Prediction],
    ) -> Result<(), PersistenceError> {
        self.write_new(&self.iteration_path(run_id, iteration, "_predictions"), predictions)
    }

    fn write_outcomes(&self, run_id: &str, iteration: usize, outcomes: &[Outcome]) -> Result<(), PersistenceError> {
        self.write_new(&self.iteration_path(run_id, iteration, "_outcomes"), outcomes)
    }

    fn write_model(&self, run_id: &str, iteration: usize, model: &HorizonModel) -> Result<(), PersistenceError> {
        self.write_new(&self.model_path(run_id, iteration, model.horizon_days), model)
    }

    fn write_summary(&self, run_id: &str, summary: &IterationSummary) -> Result<(), PersistenceError> {
        self.write_new(&self.iteration_path(run_id, summary.iteration_index, ""), summary)
    }

    fn write_manifest(&self, manifest: &RunManifest) -> Result<(), PersistenceError> {
        self.write_new(&self.run_dir(&manifest.run_id).join(MANIFEST_FILE), manifest)
    }

    fn read_summaries(&self, run_id: &str) -> Result<Vec<IterationSummary>, PersistenceError> {
        let dir = self.run_dir(run_id);
        if !dir.exists() {
            return Err(PersistenceError::NotFound(dir.display().to_string()));
        }
        let entries = std::fs::read_dir(&dir).map_err(|source| PersistenceError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let mut indexed: Vec<(usize, PathBuf)> = entries
            .filter_map(|e| e.ok())
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().to_string();
                summary_index(&name).map(|idx| (idx, e.path()))
            })
            .collect();
        indexed.sort_by_key(|(idx, _)| *idx);

        indexed.iter().map(|(_, path)| read_json(path)).collect()
    }

    fn read_manifest(&self, run_id: &str) -> Result<RunManifest, PersistenceError> {
        read_json(&self.run_dir(run_id).join(MANIFEST_FILE))
    }
}
