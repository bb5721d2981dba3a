// Error types for the synthesis and learning pipeline
//
// Each component owns one error enum. Source and review errors are recovered
// locally (omission / fallback); store, training and adapter errors surface to
// the caller of that component but never to the end user of `answer`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// A single answer source failed to produce a usable answer
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("source '{source_id}' timed out after {timeout:?}")]
    Timeout { source_id: String, timeout: Duration },

    #[error("source '{source_id}' returned an empty answer")]
    EmptyAnswer { source_id: String },

    #[error("source '{source_id}' reported an invalid confidence")]
    InvalidConfidence { source_id: String },

    #[error("source '{source_id}' request failed: {message}")]
    Request { source_id: String, message: String },

    #[error("source '{source_id}' task aborted: {message}")]
    Aborted { source_id: String, message: String },
}

impl SourceError {
    pub fn request(source_id: &str, err: impl std::fmt::Display) -> Self {
        Self::Request {
            source_id: source_id.to_string(),
            message: err.to_string(),
        }
    }
}

/// The review (merge) step could not produce a combined answer
#[derive(Error, Debug)]
pub enum ReviewError {
    #[error("review timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed review output: {0}")]
    Malformed(String),

    #[error("reviewer request failed: {0}")]
    Request(String),
}

/// Learning store failures (surfaced, but never block returning an answer)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("learning store write failed: {0}")]
    Write(#[source] rusqlite::Error),

    #[error("learning store read failed: {0}")]
    Read(#[source] rusqlite::Error),

    #[error("failed to open learning store at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    #[error("failed to prepare store directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown learning record ids: {0:?}")]
    UnknownIds(Vec<i64>),

    #[error("learning records already consumed: {0:?}")]
    AlreadyConsumed(Vec<i64>),

    #[error("corrupt learning record {id}: {message}")]
    Corrupt { id: i64, message: String },
}

/// External training job failures
#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("failed to launch training job '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("training job exited with status {0}")]
    ExitStatus(String),

    #[error("training job timed out after {0:?}")]
    Timeout(Duration),

    #[error("training job finished but produced no adapter at {0}")]
    MissingArtifacts(PathBuf),

    #[error("training dataset error: {0}")]
    Dataset(String),

    #[error("training I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Adapter version management failures
#[derive(Error, Debug)]
pub enum AdapterError {
    /// The target or the pointer is in a state we will not touch; nothing was changed
    #[error("activation refused: {0}")]
    ActivationRefused(String),

    /// Disk-level failure while swapping the pointer
    #[error("activation failed: {0}")]
    ActivationFailed(#[source] std::io::Error),

    #[error("adapter version '{0}' not found")]
    VersionNotFound(String),

    #[error("checkpoint '{0}' already exists")]
    CheckpointExists(PathBuf),

    #[error("invalid checkpoint label '{0}'")]
    InvalidLabel(String),

    #[error("corrupted adapter metadata at {path}: {source}")]
    CorruptedMetadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("adapter I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Settings that cannot be used to build a pipeline
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("duplicate source id '{0}'")]
    DuplicateSource(String),
}

impl ConfigError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
