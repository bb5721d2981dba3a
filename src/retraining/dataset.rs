// Training dataset artifact
//
// JSON array of {"human": query, "bot": answer}, highest confidence first.
// Written to a temporary name and renamed so a training job never reads a
// partial file.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::errors::TrainingError;
use crate::learning::LearningRecord;

#[derive(Serialize)]
struct Conversation<'a> {
    human: &'a str,
    bot: &'a str,
}

/// A written batch: the file and exactly the records it contains
#[derive(Debug, Clone)]
pub struct DatasetArtifact {
    pub path: PathBuf,
    pub record_ids: Vec<i64>,
}

impl DatasetArtifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.record_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.record_ids.is_empty()
    }
}

pub async fn write_dataset(
    dir: &Path,
    records: &[LearningRecord],
) -> Result<DatasetArtifact, TrainingError> {
    if records.is_empty() {
        return Err(TrainingError::Dataset("refusing to write an empty batch".to_string()));
    }

    tokio::fs::create_dir_all(dir).await?;

    let mut ordered: Vec<&LearningRecord> = records.iter().collect();
    ordered.sort_by(|a, b| {
        b.confidence
            .total_cmp(&a.confidence)
            .then_with(|| a.id.cmp(&b.id))
    });

    let conversations: Vec<Conversation<'_>> = ordered
        .iter()
        .map(|r| Conversation {
            human: &r.query,
            bot: &r.answer,
        })
        .collect();
    let json = serde_json::to_string_pretty(&conversations)
        .map_err(|e| TrainingError::Dataset(e.to_string()))?;

    let path = unused_path(dir).await?;
    let temp = path.with_extension("json.tmp");
    tokio::fs::write(&temp, json).await?;
    if let Err(e) = tokio::fs::rename(&temp, &path).await {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(e.into());
    }

    tracing::info!(path = %path.display(), samples = records.len(), "Wrote training dataset");

    Ok(DatasetArtifact {
        path,
        record_ids: ordered.iter().map(|r| r.id).collect(),
    })
}

async fn unused_path(dir: &Path) -> Result<PathBuf, TrainingError> {
    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let mut suffix = 0u32;
    loop {
        let name = if suffix == 0 {
            format!("retraining_batch_{}.json", stamp)
        } else {
            format!("retraining_batch_{}_{}.json", stamp, suffix)
        };
        let candidate = dir.join(name);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
        suffix += 1;
    }
}
