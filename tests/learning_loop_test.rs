// Integration tests: learning store -> retraining scheduler -> adapter versions

#![cfg(unix)]

use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tempfile::TempDir;

use synthloop::adapters::AdapterManager;
use synthloop::config::{SchedulerConfig, TrainingConfig};
use synthloop::learning::LearningStore;
use synthloop::retraining::{CommandTrainingJob, RetrainingScheduler, TickOutcome};
use synthloop::synthesis::SynthesizedAnswer;

/// Shell "trainer": copies the dataset into `<output>/adapter`
const FAKE_TRAINER: &str = r#"
while [ $# -gt 0 ]; do
  case "$1" in
    --custom-dataset) dataset="$2"; shift 2 ;;
    --output-dir) out="$2"; shift 2 ;;
    *) shift ;;
  esac
done
mkdir -p "$out/adapter"
cp "$dataset" "$out/adapter/train.json"
echo "training done"
"#;

struct World {
    dir: TempDir,
    store: Arc<LearningStore>,
    adapters: Arc<AdapterManager>,
}

impl World {
    fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let store = Arc::new(LearningStore::open_at(&dir.path().join("knowledge.db"), 0.7)?);
        let adapters = Arc::new(AdapterManager::with_layout(
            &dir.path().join("adapters"),
            &dir.path().join("active_adapter"),
            "lora_",
        )?);
        Ok(Self { dir, store, adapters })
    }

    fn scheduler(&self, script: &str) -> RetrainingScheduler {
        let scheduler_config = SchedulerConfig {
            retrain_threshold: 0.8,
            min_batch_size: 100,
            interval_secs: 3600,
            datasets_dir: self.dir.path().join("datasets"),
            lock_path: self.dir.path().join("retrain.lock"),
        };
        let training_config = TrainingConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string(), "trainer".to_string()],
            epochs: 1,
            batch_size: 2,
            timeout_secs: 60,
        };
        RetrainingScheduler::new(
            &scheduler_config,
            Arc::clone(&self.store),
            Arc::clone(&self.adapters),
            Arc::new(CommandTrainingJob::new(&training_config)),
        )
    }

    async fn fill(&self, count: usize, confidence: f64) -> Result<()> {
        for i in 0..count {
            self.store
                .append(&SynthesizedAnswer {
                    query: format!("question {}", i),
                    final_text: format!("answer {}", i),
                    confidence,
                    reasoning: "merged".to_string(),
                    sources_used: BTreeSet::from(["local".to_string(), "rag".to_string()]),
                })
                .await?;
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_ninety_nine_then_one_more() -> Result<()> {
    let world = World::new()?;
    let scheduler = world.scheduler(FAKE_TRAINER);

    world.fill(99, 0.85).await?;
    assert!(matches!(scheduler.run_once().await, TickOutcome::NotReady { qualifying: 99, .. }));
    assert!(world.adapters.list()?.is_empty());

    world.fill(1, 0.85).await?;
    let TickOutcome::Trained { version, samples } = scheduler.run_once().await else {
        panic!("expected training to run");
    };
    assert_eq!(samples, 100);
    assert!(version.storage_path.join("adapter").join("train.json").exists());

    let stats = world.store.stats().await?;
    assert_eq!(stats.consumed, 100);
    assert_eq!(stats.unconsumed, 0);

    // Dataset on disk holds exactly the consumed batch
    let dataset = world.dir.path().join("datasets").join(&version.datasets_used[0]);
    let parsed: Vec<serde_json::Value> = serde_json::from_str(&std::fs::read_to_string(dataset)?)?;
    assert_eq!(parsed.len(), 100);
    Ok(())
}

#[tokio::test]
async fn test_failed_job_consumes_batch_and_records_nothing() -> Result<()> {
    let world = World::new()?;
    let scheduler = world.scheduler("echo 'out of memory' >&2; exit 1");

    world.fill(120, 0.9).await?;
    assert!(matches!(
        scheduler.run_once().await,
        TickOutcome::TrainingFailed { samples: 120, .. }
    ));

    assert!(world.store.unconsumed(0.0).await?.is_empty());
    assert!(world.adapters.list()?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_trained_versions_can_be_promoted_and_rolled_back() -> Result<()> {
    let world = World::new()?;
    let scheduler = world.scheduler(FAKE_TRAINER);

    world.fill(100, 0.9).await?;
    let TickOutcome::Trained { version: first, .. } = scheduler.run_once().await else {
        panic!("expected first version");
    };
    world.fill(100, 0.95).await?;
    let TickOutcome::Trained { version: second, .. } = scheduler.run_once().await else {
        panic!("expected second version");
    };
    assert_ne!(first.version_id, second.version_id);

    world.adapters.activate(&second.version_id)?;
    assert_eq!(world.adapters.current()?.map(|v| v.version_id), Some(second.version_id.clone()));

    let checkpoint = world.adapters.checkpoint(&second.version_id, "release")?;
    assert!(checkpoint.path.join("adapter").join("train.json").exists());

    // Roll back
    world.adapters.activate(&first.version_id)?;
    assert_eq!(world.adapters.current()?.map(|v| v.version_id), Some(first.version_id.clone()));

    let diff = world.adapters.compare(&first.version_id, &second.version_id)?;
    assert!(diff.common_datasets.is_empty());

    let info = world.adapters.info()?;
    assert_eq!(info.total, 2);
    assert_eq!(info.active, Some(first.version_id));
    Ok(())
}
