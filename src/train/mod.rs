pub mod epoch_stats;
pub mod loop_fn;
pub mod train_config;

pub use epoch_stats::{EpochStats, Progress, TrainingResult};
pub use loop_fn::{evaluate, run_training, train_and_evaluate, train_step, Evaluation, TrainingOutcome};
pub use train_config::{TrainOptions, TrainingConfiguration, TrainingPlan, ValidationReport};
