//! Model save/load.
//!
//! Models are stored as JSON. Floats round-trip exactly, so a loaded model
//! produces the same probabilities as the one that was saved.

use std::path::Path;

use crate::artifacts::atomic;
use crate::error::PersistenceError;

use super::trainer::HorizonModel;

/// Atomically write `model` to `path`, replacing any previous file.
pub fn save_model(model: &HorizonModel, path: &Path) -> Result<(), PersistenceError> {
    atomic::write_json(path, model, true)
}

pub fn load_model(path: &Path) -> Result<HorizonModel, PersistenceError> {
    atomic::read_json(path)
}
