//! Progress reporting and cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use serde::{Deserialize, Serialize};

/// Stage of an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Started,
    Training,
    Fitting,
    Predicting,
    Scoring,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub iteration_index: usize,
    /// Share of the current iteration done, in `[0, 1]`.
    pub fraction_complete: f64,
    pub current_symbol: Option<String>,
    pub horizon: Option<u32>,
    pub phase: Phase,
}

impl ProgressEvent {
    pub fn new(iteration_index: usize, fraction_complete: f64, phase: Phase) -> Self {
        Self {
            iteration_index,
            fraction_complete: fraction_complete.clamp(0.0, 1.0),
            current_symbol: None,
            horizon: None,
            phase,
        }
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.current_symbol = Some(symbol.to_string());
        self
    }

    pub fn with_horizon(mut self, horizon: u32) -> Self {
        self.horizon = Some(horizon);
        self
    }
}

/// One-way progress channel. Implementations must not block the engine.
pub trait ProgressSink: Send + Sync {
    fn notify(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn notify(&self, _event: ProgressEvent) {}
}

impl ProgressSink for mpsc::Sender<ProgressEvent> {
    fn notify(&self, event: ProgressEvent) {
        // a dropped receiver only means nobody is listening
        let _ = self.send(event);
    }
}

/// Shared flag checked between symbols and horizons.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
