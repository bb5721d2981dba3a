// Learning store record and statistics types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One persisted, training-eligible answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    /// Monotonically increasing, never reused
    pub id: i64,
    pub query: String,
    pub answer: String,
    pub confidence: f64,
    pub sources_used: BTreeSet<String>,
    pub reasoning: String,
    pub created_at: DateTime<Utc>,
    /// Already used to build a training batch
    pub consumed: bool,
}

/// Recent entry summary for the statistics endpoint
#[derive(Debug, Clone, Serialize)]
pub struct RecentEntry {
    pub id: i64,
    pub query: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

/// Read-only overview of the store
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total: usize,
    pub unconsumed: usize,
    pub consumed: usize,
    pub high_confidence: usize,
    pub average_confidence: f64,
    pub recent: Vec<RecentEntry>,
}

/// The scheduler's view of the store for one threshold/batch policy
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrainingStats {
    pub total_samples: usize,
    /// Unconsumed records of any confidence
    pub new_samples: usize,
    /// Average confidence of unconsumed records
    pub average_confidence: f64,
    /// Unconsumed records at or above the retraining threshold
    pub qualifying_samples: usize,
    pub ready_for_retrain: bool,
}
