// Configuration structs

use super::constants::*;
use super::provider::SourceEntry;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".synthloop")
}

/// Source collection budgets
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Budget for each individual source call
    pub per_source_timeout_ms: u64,
    /// Deadline for the whole fan-out; late candidates are dropped
    pub overall_timeout_ms: u64,
}

impl CollectorConfig {
    pub fn per_source_timeout(&self) -> Duration {
        Duration::from_millis(self.per_source_timeout_ms)
    }

    pub fn overall_timeout(&self) -> Duration {
        Duration::from_millis(self.overall_timeout_ms)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            per_source_timeout_ms: DEFAULT_PER_SOURCE_TIMEOUT_MS,
            overall_timeout_ms: DEFAULT_OVERALL_TIMEOUT_MS,
        }
    }
}

/// Reviewer model used to merge multiple candidates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerConfig {
    /// Base URL of an OpenAI-compatible completion endpoint
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_review_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_review_timeout_ms() -> u64 {
    DEFAULT_REVIEW_TIMEOUT_MS
}

impl ReviewerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Learning store location and gate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub db_path: PathBuf,
    /// Answers below this confidence are never persisted
    pub store_threshold: f64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: data_dir().join("learning").join("knowledge.db"),
            store_threshold: DEFAULT_STORE_THRESHOLD,
        }
    }
}

/// Retraining scheduler policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Minimum record confidence counted toward a batch
    pub retrain_threshold: f64,
    pub min_batch_size: usize,
    pub interval_secs: u64,
    /// Where dataset artifacts are written
    pub datasets_dir: PathBuf,
    /// Advisory lock file giving process-wide exclusion for check/train cycles
    pub lock_path: PathBuf,
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            retrain_threshold: DEFAULT_RETRAIN_THRESHOLD,
            min_batch_size: DEFAULT_MIN_BATCH_SIZE,
            interval_secs: DEFAULT_SCHEDULER_INTERVAL_SECS,
            datasets_dir: data_dir().join("datasets"),
            lock_path: data_dir().join("scheduler.lock"),
        }
    }
}

/// External training job invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Program to run (e.g. "python3")
    pub program: String,
    /// Arguments placed before the generated flags (e.g. the script path)
    pub args: Vec<String>,
    pub epochs: u32,
    pub batch_size: u32,
    pub timeout_secs: u64,
}

impl TrainingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["train_lora.py".to_string()],
            epochs: 2,
            batch_size: 4,
            timeout_secs: DEFAULT_TRAINING_TIMEOUT_SECS,
        }
    }
}

/// Adapter version storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Directory holding one sub-directory per version
    pub base_dir: PathBuf,
    /// Symbolic link served in production
    pub active_link: PathBuf,
    /// Version directory prefix (`<prefix><version_id>`)
    pub version_prefix: String,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        let base = data_dir();
        Self {
            base_dir: base.join("adapters"),
            active_link: base.join("active-adapter"),
            version_prefix: ADAPTER_VERSION_PREFIX.to_string(),
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub collector: CollectorConfig,
    pub sources: Vec<SourceEntry>,
    pub reviewer: Option<ReviewerConfig>,
    pub store: StoreConfig,
    pub scheduler: SchedulerConfig,
    pub training: TrainingConfig,
    pub adapters: AdapterConfig,
}

fn check_unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(
            field,
            format!("{} is outside [0, 1]", value),
        ));
    }
    Ok(())
}

impl Settings {
    /// Validate configuration and return helpful errors
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_unit_interval("store.store_threshold", self.store.store_threshold)?;
        check_unit_interval("scheduler.retrain_threshold", self.scheduler.retrain_threshold)?;

        if self.scheduler.min_batch_size == 0 {
            return Err(ConfigError::invalid(
                "scheduler.min_batch_size",
                "must be at least 1",
            ));
        }
        if self.scheduler.interval_secs == 0 {
            return Err(ConfigError::invalid(
                "scheduler.interval_secs",
                "must be at least 1",
            ));
        }
        if self.collector.per_source_timeout_ms == 0 || self.collector.overall_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "collector",
                "timeouts must be non-zero",
            ));
        }
        if self.training.program.trim().is_empty() {
            return Err(ConfigError::invalid("training.program", "must not be empty"));
        }
        if let Some(reviewer) = &self.reviewer {
            if reviewer.timeout_ms == 0 {
                return Err(ConfigError::invalid("reviewer.timeout_ms", "must be non-zero"));
            }
        }

        let mut seen = HashSet::new();
        for source in &self.sources {
            if !seen.insert(source.id()) {
                return Err(ConfigError::DuplicateSource(source.id().to_string()));
            }
            check_unit_interval("sources.confidence", source.confidence())?;
        }

        Ok(())
    }
}
