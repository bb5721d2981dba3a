// synthloop - answer synthesis and continuous-learning pipeline
// Library exports

pub mod adapters;
pub mod collector;
pub mod config;
pub mod errors;
pub mod learning;
pub mod pipeline;
pub mod retraining;
pub mod sources;
pub mod synthesis;

pub use adapters::{AdapterManager, AdapterVersion};
pub use collector::SourceCollector;
pub use learning::{LearningRecord, LearningStore};
pub use pipeline::SynthesisPipeline;
pub use retraining::{RetrainingScheduler, TickOutcome};
pub use sources::{AnswerCandidate, AnswerSource};
pub use synthesis::{SynthesizedAnswer, Synthesizer};
