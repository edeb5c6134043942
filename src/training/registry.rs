//! Versioned registry of the latest accepted model per horizon.
//!
//! Readers take an `Arc` to an immutable snapshot; publishing swaps the
//! pointer, so a reader never observes a half-updated set of models.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use super::trainer::HorizonModel;

/// Immutable view of the registry at one version.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    /// 0 before anything is published.
    pub version: u64,
    /// Iteration whose models were last published.
    pub iteration: Option<usize>,
    pub models: BTreeMap<u32, Arc<HorizonModel>>,
}

impl RegistrySnapshot {
    pub fn get(&self, horizon: u32) -> Option<Arc<HorizonModel>> {
        self.models.get(&horizon).cloned()
    }
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }

    pub fn get(&self, horizon: u32) -> Option<Arc<HorizonModel>> {
        self.snapshot().get(horizon)
    }

    /// Publish the models accepted in `iteration` and return the new version.
    ///
    /// Horizons not present in `models` keep their previous entry.
    pub fn publish(&self, iteration: usize, models: impl IntoIterator<Item = HorizonModel>) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);

        let mut next = RegistrySnapshot {
            version: guard.version + 1,
            iteration: Some(iteration),
            models: guard.models.clone(),
        };
        for model in models {
            next.models.insert(model.horizon_days, Arc::new(model));
        }

        info!(
            "Published model registry v{} (iteration {}, {} horizons)",
            next.version,
            iteration,
            next.models.len()
        );

        let version = next.version;
        *guard = Arc::new(next);
        version
    }
}
