// Project-wide defaults
//
// Centralised here so thresholds and timeouts have one source of truth.
// Import via `use crate::config::constants::*;`.

/// Minimum synthesized confidence for an answer to enter the learning store.
pub const DEFAULT_STORE_THRESHOLD: f64 = 0.7;

/// Minimum record confidence counted toward a retraining batch.
pub const DEFAULT_RETRAIN_THRESHOLD: f64 = 0.8;

/// Qualifying unconsumed records needed before a retrain is triggered.
pub const DEFAULT_MIN_BATCH_SIZE: usize = 100;

/// Scheduler tick interval (hourly).
pub const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 3600;

/// Per-source answer budget.
pub const DEFAULT_PER_SOURCE_TIMEOUT_MS: u64 = 10_000;

/// Overall collection deadline for one query.
pub const DEFAULT_OVERALL_TIMEOUT_MS: u64 = 15_000;

/// Budget for the reviewer's merge step.
pub const DEFAULT_REVIEW_TIMEOUT_MS: u64 = 30_000;

/// Wall-clock cap for one external training run (6 hours).
pub const DEFAULT_TRAINING_TIMEOUT_SECS: u64 = 6 * 3600;

/// Confidence above which a stored answer counts as "high confidence" in stats.
pub const HIGH_CONFIDENCE_MARK: f64 = 0.8;

/// Number of recent entries reported by store statistics.
pub const RECENT_ENTRIES_LIMIT: usize = 5;

/// Fixed answer returned when no source produced anything usable.
pub const INSUFFICIENT_INFORMATION_ANSWER: &str =
    "I don't have enough information to answer that.";

/// Reasoning attached to a deterministic fallback selection.
pub const FALLBACK_REASONING: &str = "fallback: highest individual confidence";

/// Default self-reported confidences per source kind.
pub const LOCAL_MODEL_CONFIDENCE: f64 = 0.75;
pub const RETRIEVAL_CONFIDENCE: f64 = 0.8;
pub const REASONING_CONFIDENCE: f64 = 0.85;
pub const EXTERNAL_CONFIDENCE: f64 = 0.85;

/// Adapter directory layout.
pub const ADAPTER_VERSION_PREFIX: &str = "lora_";
pub const ADAPTER_ARTIFACT_DIR: &str = "adapter";
pub const ADAPTER_METADATA_FILE: &str = "adapter_meta.json";
pub const CHECKPOINT_PREFIX: &str = "checkpoint_";

/// Environment variable naming an explicit settings file.
pub const CONFIG_ENV_VAR: &str = "SYNTHLOOP_CONFIG";
