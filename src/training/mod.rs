pub mod features;
pub mod labels;
pub mod learner;
pub mod persistence;
pub mod registry;
pub mod trainer;

pub use features::{SeriesView, FEATURE_COUNT, FEATURE_NAMES, FEATURE_WARMUP};
pub use labels::{label_for_return, realized_return, target_date, LabelBuilder, LabeledRow};
pub use learner::{
    FittedModel, GaussianNaiveBayes, Learner, LearnerKind, LogisticRegression,
};
pub use persistence::{load_model, save_model};
pub use registry::{ModelRegistry, RegistrySnapshot};
pub use trainer::{HorizonModel, HorizonTrainer, Standardizer, TrainingSet, MIN_TRAINING_SAMPLES};
