// Adapter version manager
//
// Layout under `base_dir`:
//   lora_<timestamp>/            one directory per trained version
//     adapter/                   artifacts written by the training job
//     adapter_meta.json          metadata sidecar
//   checkpoint_<label>_<id>/     read-only snapshots
// plus the active pointer, a symlink to one version directory.

mod checkpoint;
mod pointer;
mod types;

pub use types::{
    AdapterCheckpoint, AdapterComparison, AdapterInfo, AdapterListing, AdapterVersion,
    AllocatedVersion,
};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use std::collections::BTreeSet;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::constants::{ADAPTER_ARTIFACT_DIR, ADAPTER_METADATA_FILE, CHECKPOINT_PREFIX};
use crate::config::AdapterConfig;
use crate::errors::AdapterError;
use pointer::PointerState;
use types::AdapterMetadata;

const ACTIVATION_LOCK_FILE: &str = ".activate.lock";
const VERSION_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub struct AdapterManager {
    base_dir: PathBuf,
    active_link: PathBuf,
    version_prefix: String,
    /// In-process half of activation exclusion; the lock file covers other processes
    activation: Mutex<()>,
}

impl AdapterManager {
    pub fn new(config: &AdapterConfig) -> Result<Self, AdapterError> {
        Self::with_layout(&config.base_dir, &config.active_link, &config.version_prefix)
    }

    pub fn with_layout(
        base_dir: &Path,
        active_link: &Path,
        version_prefix: &str,
    ) -> Result<Self, AdapterError> {
        std::fs::create_dir_all(base_dir)?;

        Ok(Self {
            base_dir: base_dir.to_path_buf(),
            active_link: active_link.to_path_buf(),
            version_prefix: version_prefix.to_string(),
            activation: Mutex::new(()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn active_link(&self) -> &Path {
        &self.active_link
    }

    /// All completed versions, newest first
    pub fn list(&self) -> Result<Vec<AdapterListing>, AdapterError> {
        let active = self.current()?.map(|v| v.version_id);

        let mut versions = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.is_version_name(&name) || !entry.file_type()?.is_dir() {
                continue;
            }

            match self.load(&name) {
                Ok(version) => versions.push(version),
                // Allocated but never completed
                Err(AdapterError::VersionNotFound(_)) => {}
                Err(e) => tracing::warn!(version = %name, error = %e, "Skipping unreadable adapter version"),
            }
        }

        versions.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.version_id.cmp(&a.version_id))
        });

        Ok(versions
            .into_iter()
            .map(|version| AdapterListing {
                is_active: active.as_deref() == Some(version.version_id.as_str()),
                version,
            })
            .collect())
    }

    /// Make `version_id` the active adapter.
    ///
    /// Validation happens before any mutation. A pointer path occupied by
    /// anything but a symlink is refused and left untouched.
    pub fn activate(&self, version_id: &str) -> Result<AdapterVersion, AdapterError> {
        let version = self.load(version_id)?;

        let _guard = self
            .activation
            .lock()
            .map_err(|_| AdapterError::ActivationRefused("activation lock poisoned".to_string()))?;
        let lock_file = self.acquire_lock_file()?;

        if pointer::inspect(&self.active_link)? == PointerState::Foreign {
            return Err(AdapterError::ActivationRefused(format!(
                "{} exists and is not a symlink",
                self.active_link.display()
            )));
        }

        let target = version
            .storage_path
            .canonicalize()
            .map_err(AdapterError::ActivationFailed)?;
        pointer::swap(&self.active_link, &target)?;

        let _ = lock_file.unlock();

        tracing::info!(version = %version_id, link = %self.active_link.display(), "Activated adapter");

        Ok(version)
    }

    /// The version the pointer names, if it names a known one
    pub fn current(&self) -> Result<Option<AdapterVersion>, AdapterError> {
        let Some(target) = pointer::resolve(&self.active_link)? else {
            return Ok(None);
        };

        let base = self.base_dir.canonicalize()?;
        let known = target.parent() == Some(base.as_path());
        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|name| known && self.is_version_name(name));

        match name {
            Some(name) => match self.load(&name) {
                Ok(version) => Ok(Some(version)),
                Err(AdapterError::VersionNotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
            None => {
                tracing::warn!(target = %target.display(), "Active pointer names an unknown version");
                Ok(None)
            }
        }
    }

    pub fn compare(&self, first: &str, second: &str) -> Result<AdapterComparison, AdapterError> {
        let first = self.load(first)?;
        let second = self.load(second)?;

        let a: BTreeSet<&String> = first.datasets_used.iter().collect();
        let b: BTreeSet<&String> = second.datasets_used.iter().collect();

        let changed_params = match (&first.training_params, &second.training_params) {
            (serde_json::Value::Object(pa), serde_json::Value::Object(pb)) => {
                let keys: BTreeSet<&String> = pa.keys().chain(pb.keys()).collect();
                keys.into_iter()
                    .filter(|k| pa.get(*k) != pb.get(*k))
                    .cloned()
                    .collect()
            }
            (pa, pb) if pa != pb => vec!["*".to_string()],
            _ => Vec::new(),
        };

        Ok(AdapterComparison {
            created_delta_secs: (second.created_at - first.created_at).num_seconds(),
            common_datasets: a.intersection(&b).map(|s| (*s).clone()).collect(),
            only_in_first: a.difference(&b).map(|s| (*s).clone()).collect(),
            only_in_second: b.difference(&a).map(|s| (*s).clone()).collect(),
            changed_params,
            first,
            second,
        })
    }

    /// Copy a version into `checkpoint_<label>_<version_id>`. Never overwrites.
    pub fn checkpoint(&self, version_id: &str, label: &str) -> Result<AdapterCheckpoint, AdapterError> {
        checkpoint::validate_label(label)?;
        let version = self.load(version_id)?;

        let name = format!("{}{}_{}", CHECKPOINT_PREFIX, label, version_id);
        let dest = self.base_dir.join(&name);

        match std::fs::create_dir(&dest) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(AdapterError::CheckpointExists(dest));
            }
            Err(e) => return Err(AdapterError::Io(e)),
        }

        if let Err(e) = checkpoint::copy_tree(&version.storage_path, &dest) {
            checkpoint::remove_partial(&dest);
            tracing::error!(version = %version_id, label, error = %e, "Checkpoint failed");
            return Err(e);
        }

        tracing::info!(version = %version_id, checkpoint = %name, "Created checkpoint");

        Ok(AdapterCheckpoint {
            name,
            path: dest,
            version_id: version_id.to_string(),
            created_at: Utc::now(),
        })
    }

    pub fn info(&self) -> Result<AdapterInfo, AdapterError> {
        let versions = self.list()?;
        let active = versions
            .iter()
            .find(|l| l.is_active)
            .map(|l| l.version.version_id.clone());

        Ok(AdapterInfo {
            active,
            total: versions.len(),
            versions,
        })
    }

    /// Claim a fresh version directory. Ids are never reused: a collision on
    /// the timestamp gets a numeric suffix.
    pub fn allocate_version(&self) -> Result<AllocatedVersion, AdapterError> {
        let stamp = Utc::now().format(VERSION_TIMESTAMP_FORMAT).to_string();
        let base_id = format!("{}{}", self.version_prefix, stamp);

        let mut suffix = 0u32;
        loop {
            let version_id = if suffix == 0 {
                base_id.clone()
            } else {
                format!("{}_{}", base_id, suffix)
            };
            let path = self.base_dir.join(&version_id);

            match std::fs::create_dir(&path) {
                Ok(()) => {
                    tracing::debug!(version = %version_id, "Allocated adapter version directory");
                    return Ok(AllocatedVersion { version_id, path });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(e) => return Err(AdapterError::Io(e)),
            }
        }
    }

    /// Write the metadata sidecar for a completed training run
    pub fn record_version(
        &self,
        allocated: &AllocatedVersion,
        training_params: serde_json::Value,
        datasets_used: Vec<String>,
    ) -> Result<AdapterVersion, AdapterError> {
        if !allocated.path.join(ADAPTER_ARTIFACT_DIR).is_dir() {
            return Err(AdapterError::VersionNotFound(allocated.version_id.clone()));
        }

        let metadata = AdapterMetadata {
            version_id: allocated.version_id.clone(),
            training_params,
            created_at: Utc::now(),
            datasets_used,
        };

        let path = allocated.path.join(ADAPTER_METADATA_FILE);
        let temp = allocated.path.join(format!(".{}.tmp", ADAPTER_METADATA_FILE));
        let json = serde_json::to_string_pretty(&metadata).map_err(|source| {
            AdapterError::CorruptedMetadata {
                path: path.clone(),
                source,
            }
        })?;
        std::fs::write(&temp, json)?;
        std::fs::rename(&temp, &path)?;

        tracing::info!(version = %allocated.version_id, "Recorded adapter version");

        Ok(AdapterVersion {
            version_id: metadata.version_id,
            storage_path: allocated.path.clone(),
            training_params: metadata.training_params,
            created_at: metadata.created_at,
            datasets_used: metadata.datasets_used,
        })
    }

    fn is_version_name(&self, name: &str) -> bool {
        name.starts_with(&self.version_prefix)
            && !name.starts_with(CHECKPOINT_PREFIX)
            && !name.starts_with('.')
    }

    /// Load a completed version: its directory must hold the adapter artifacts
    fn load(&self, version_id: &str) -> Result<AdapterVersion, AdapterError> {
        if version_id.is_empty()
            || version_id.contains(['/', '\\'])
            || !self.is_version_name(version_id)
        {
            return Err(AdapterError::VersionNotFound(version_id.to_string()));
        }

        let dir = self.base_dir.join(version_id);
        if !dir.join(ADAPTER_ARTIFACT_DIR).is_dir() {
            return Err(AdapterError::VersionNotFound(version_id.to_string()));
        }

        let meta_path = dir.join(ADAPTER_METADATA_FILE);
        let metadata = match std::fs::read_to_string(&meta_path) {
            Ok(raw) => serde_json::from_str::<AdapterMetadata>(&raw).map_err(|source| {
                AdapterError::CorruptedMetadata {
                    path: meta_path.clone(),
                    source,
                }
            })?,
            // Artifacts without a sidecar (e.g. copied in by hand)
            Err(e) if e.kind() == io::ErrorKind::NotFound => AdapterMetadata {
                version_id: version_id.to_string(),
                training_params: serde_json::Value::Null,
                created_at: modified_at(&dir)?,
                datasets_used: Vec::new(),
            },
            Err(e) => return Err(AdapterError::Io(e)),
        };

        Ok(AdapterVersion {
            version_id: version_id.to_string(),
            storage_path: dir,
            training_params: metadata.training_params,
            created_at: metadata.created_at,
            datasets_used: metadata.datasets_used,
        })
    }

    fn acquire_lock_file(&self) -> Result<std::fs::File, AdapterError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(self.base_dir.join(ACTIVATION_LOCK_FILE))
            .map_err(AdapterError::ActivationFailed)?;
        file.lock_exclusive().map_err(AdapterError::ActivationFailed)?;
        Ok(file)
    }
}

fn modified_at(path: &Path) -> Result<DateTime<Utc>, AdapterError> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(DateTime::<Utc>::from(modified))
}
