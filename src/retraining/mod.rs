// Continuous retraining: dataset preparation, training jobs and the scheduler

pub mod dataset;
pub mod job;
pub mod scheduler;

pub use dataset::{write_dataset, DatasetArtifact};
pub use job::{CommandTrainingJob, TrainingJob};
pub use scheduler::{RetrainingScheduler, SchedulerState, TickOutcome};
