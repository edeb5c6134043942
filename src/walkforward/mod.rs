//! Walk-forward training and validation loop.
//!
//! - Window: expanding or sliding training window, cutoff advanced each iteration
//! - Predictor: per-day, per-horizon probabilities over the validation span
//! - Resolver: realized outcomes once the target trading day is available
//! - Controller: the iteration loop, stop rules and persistence

pub mod controller;
pub mod predictor;
pub mod progress;
pub mod resolver;
pub mod summary;
pub mod window;

pub use controller::{decide_stop, improvement, IterationController};
pub use predictor::{ForwardPredictor, Prediction};
pub use progress::{CancellationToken, NoopProgress, Phase, ProgressEvent, ProgressSink};
pub use resolver::{Outcome, OutcomeResolver, Resolution};
pub use summary::{
    render_report, IterationArtifacts, IterationCounts, IterationSummary, RunManifest, RunOutcome,
    StopReason,
};
pub use window::{ExpandingWindow, SlidingWindow, TrainingWindow, WindowKind, WindowPolicy};
