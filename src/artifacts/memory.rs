//! In-memory artifact store.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use crate::error::PersistenceError;
use crate::training::HorizonModel;
use crate::walkforward::{IterationSummary, Outcome, Prediction, RunManifest};

use super::ArtifactStore;

#[derive(Debug, Default)]
struct Records {
    summaries: BTreeMap<(String, usize), IterationSummary>,
    predictions: BTreeMap<(String, usize), Vec<Prediction>>,
    outcomes: BTreeMap<(String, usize), Vec<Outcome>>,
    models: BTreeMap<(String, usize, u32), HorizonModel>,
    manifests: BTreeMap<String, RunManifest>,
}

/// Store that keeps every record in memory with the same append-only rules
/// as the filesystem store.
#[derive(Debug, Default)]
pub struct MemoryArtifactStore {
    records: Mutex<Records>,
}

fn insert_new<K: Ord + std::fmt::Debug, V>(
    map: &mut BTreeMap<K, V>,
    key: K,
    value: V,
) -> Result<(), PersistenceError> {
    if map.contains_key(&key) {
        return Err(PersistenceError::AlreadyExists(format!("{:?}", key)));
    }
    map.insert(key, value);
    Ok(())
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn predictions(&self, run_id: &str, iteration: usize) -> Option<Vec<Prediction>> {
        self.lock().predictions.get(&(run_id.to_string(), iteration)).cloned()
    }

    pub fn outcomes(&self, run_id: &str, iteration: usize) -> Option<Vec<Outcome>> {
        self.lock().outcomes.get(&(run_id.to_string(), iteration)).cloned()
    }

    pub fn model(&self, run_id: &str, iteration: usize, horizon: u32) -> Option<HorizonModel> {
        self.lock()
            .models
            .get(&(run_id.to_string(), iteration, horizon))
            .cloned()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn write_predictions(
        &self,
        run_id: &str,
        iteration: usize,
        predictions: &[Prediction],
    ) -> Result<(), PersistenceError> {
        insert_new(
            &mut self.lock().predictions,
            (run_id.to_string(), iteration),
            predictions.to_vec(),
        )
    }

    fn write_outcomes(&self, run_id: &str, iteration: usize, outcomes: &[Outcome]) -> Result<(), PersistenceError> {
        insert_new(
            &mut self.lock().outcomes,
            (run_id.to_string(), iteration),
            outcomes.to_vec(),
        )
    }

    fn write_model(&self, run_id: &str, iteration: usize, model: &HorizonModel) -> Result<(), PersistenceError> {
        insert_new(
            &mut self.lock().models,
            (run_id.to_string(), iteration, model.horizon_days),
            model.clone(),
        )
    }

    fn write_summary(&self, run_id: &str, summary: &IterationSummary) -> Result<(), PersistenceError> {
        insert_new(
            &mut self.lock().summaries,
            (run_id.to_string(), summary.iteration_index),
            summary.clone(),
        )
    }

    fn write_manifest(&self, manifest: &RunManifest) -> Result<(), PersistenceError> {
        insert_new(
            &mut self.lock().manifests,
            manifest.run_id.clone(),
            manifest.clone(),
        )
    }

    fn read_summaries(&self, run_id: &str) -> Result<Vec<IterationSummary>, PersistenceError> {
        Ok(self
            .lock()
            .summaries
            .iter()
            .filter(|((id, _), _)| id == run_id)
            .map(|(_, s)| s.clone())
            .collect())
    }

    fn read_manifest(&self, run_id: &str) -> Result<RunManifest, PersistenceError> {
        self.lock()
            .manifests
            .get(run_id)
            .cloned()
            .ok_or_else(|| PersistenceError::NotFound(run_id.to_string()))
    }
}
