// Adapter version records and reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One trained adapter on disk. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterVersion {
    pub version_id: String,
    pub storage_path: PathBuf,
    pub training_params: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub datasets_used: Vec<String>,
}

/// Contents of the JSON sidecar inside each version directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AdapterMetadata {
    pub version_id: String,
    #[serde(default)]
    pub training_params: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub datasets_used: Vec<String>,
}

/// A version directory claimed for an upcoming training run
#[derive(Debug, Clone, PartialEq)]
pub struct AllocatedVersion {
    pub version_id: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdapterListing {
    #[serde(flatten)]
    pub version: AdapterVersion,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdapterInfo {
    pub active: Option<String>,
    pub versions: Vec<AdapterListing>,
    pub total: usize,
}

/// Read-only diff between two versions
#[derive(Debug, Clone, Serialize)]
pub struct AdapterComparison {
    pub first: AdapterVersion,
    pub second: AdapterVersion,
    /// `second.created_at - first.created_at`, in seconds
    pub created_delta_secs: i64,
    pub common_datasets: Vec<String>,
    pub only_in_first: Vec<String>,
    pub only_in_second: Vec<String>,
    /// Top-level training parameter keys whose values differ
    pub changed_params: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AdapterCheckpoint {
    pub name: String,
    pub path: PathBuf,
    pub version_id: String,
    pub created_at: DateTime<Utc>,
}
