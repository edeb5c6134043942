pub mod artifacts;
pub mod config;
pub mod data;
pub mod error;
pub mod metrics;
pub mod retry;
pub mod training;
pub mod walkforward;

// Re-export commonly used types
pub use artifacts::{ArtifactStore, FsArtifactStore, MemoryArtifactStore};
pub use config::EngineConfig;
pub use data::{FileAccessor, HistoricalDataAccessor, InMemoryAccessor, PriceBar, PriceSeries};
pub use error::{ConfigError, DataAccessError, EngineError, InsufficientDataError, PersistenceError};
pub use metrics::{AccuracyAggregator, CalibrationCheck, HorizonAccuracy, HorizonWeighting};
pub use retry::RetryPolicy;
pub use training::{HorizonModel, HorizonTrainer, LearnerKind, ModelRegistry};
pub use walkforward::{
    CancellationToken, IterationController, IterationSummary, ProgressEvent, ProgressSink, RunOutcome,
    StopReason, WindowKind,
};
