// Retraining scheduler
//
// Idle -> Checking -> (Idle | Preparing -> Training -> Idle)
//
// One tick at a time per process (try-lock) and per host (advisory lock
// file). A tick that finds another in progress is skipped, never queued.
// Records are marked consumed before training starts; a failed run does not
// give them back.

use fs2::FileExt;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use super::dataset::{write_dataset, DatasetArtifact};
use super::job::TrainingJob;
use crate::adapters::{AdapterManager, AdapterVersion};
use crate::config::SchedulerConfig;
use crate::errors::StoreError;
use crate::learning::{LearningStore, RetrainingStats};

/// `tokio::time::interval` rejects a zero period
const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Idle,
    Checking,
    Preparing,
    Training,
}

/// What one tick did
#[derive(Debug, Clone)]
pub enum TickOutcome {
    /// Another tick held the lock
    Skipped,
    NotReady { qualifying: usize, required: usize },
    /// New version recorded; not activated
    Trained {
        version: AdapterVersion,
        samples: usize,
    },
    /// The job failed after its batch was marked consumed
    TrainingFailed { samples: usize, error: String },
    /// Something failed before training; nothing was consumed
    PreparationFailed { error: String },
}

pub struct RetrainingScheduler {
    store: Arc<LearningStore>,
    adapters: Arc<AdapterManager>,
    job: Arc<dyn TrainingJob>,
    retrain_threshold: f64,
    min_batch_size: usize,
    interval: Duration,
    datasets_dir: PathBuf,
    lock_path: PathBuf,
    tick_lock: tokio::sync::Mutex<()>,
    state: std::sync::Mutex<SchedulerState>,
    running: AtomicBool,
    shutdown: Notify,
}

/// Puts the state machine back to Idle however a tick ends
struct IdleOnDrop<'a>(&'a RetrainingScheduler);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_state(SchedulerState::Idle);
    }
}

impl RetrainingScheduler {
    pub fn new(
        config: &SchedulerConfig,
        store: Arc<LearningStore>,
        adapters: Arc<AdapterManager>,
        job: Arc<dyn TrainingJob>,
    ) -> Self {
        Self {
            store,
            adapters,
            job,
            retrain_threshold: config.retrain_threshold,
            min_batch_size: config.min_batch_size,
            interval: config.interval().max(MIN_INTERVAL),
            datasets_dir: config.datasets_dir.clone(),
            lock_path: config.lock_path.clone(),
            tick_lock: tokio::sync::Mutex::new(()),
            state: std::sync::Mutex::new(SchedulerState::Idle),
            running: AtomicBool::new(false),
            shutdown: Notify::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, next: SchedulerState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != next {
            debug!(from = ?*state, to = ?next, "Scheduler state change");
            *state = next;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// The status check a tick would make, without acting on it
    pub async fn status(&self) -> Result<RetrainingStats, StoreError> {
        self.store
            .retraining_stats(self.retrain_threshold, self.min_batch_size)
            .await
    }

    /// One scheduler tick; also the on-demand trigger
    pub async fn run_once(&self) -> TickOutcome {
        let Ok(_tick) = self.tick_lock.try_lock() else {
            info!("Retraining tick already in progress, skipping");
            return TickOutcome::Skipped;
        };

        let lock_file = match self.try_lock_file() {
            Ok(Some(file)) => file,
            Ok(None) => {
                info!(lock = %self.lock_path.display(), "Another process is retraining, skipping");
                return TickOutcome::Skipped;
            }
            Err(e) => {
                error!(lock = %self.lock_path.display(), error = %e, "Failed to open scheduler lock");
                return TickOutcome::PreparationFailed {
                    error: e.to_string(),
                };
            }
        };

        let _idle = IdleOnDrop(self);
        let outcome = self.tick().await;
        let _ = lock_file.unlock();
        outcome
    }

    async fn tick(&self) -> TickOutcome {
        self.set_state(SchedulerState::Checking);

        let batch = match self.store.unconsumed(self.retrain_threshold).await {
            Ok(batch) => batch,
            Err(e) => {
                error!(error = %e, "Failed to read learning store");
                return TickOutcome::PreparationFailed {
                    error: e.to_string(),
                };
            }
        };

        if batch.len() < self.min_batch_size {
            info!(
                qualifying = batch.len(),
                required = self.min_batch_size,
                "Not enough new data for retraining"
            );
            return TickOutcome::NotReady {
                qualifying: batch.len(),
                required: self.min_batch_size,
            };
        }

        self.set_state(SchedulerState::Preparing);
        info!(samples = batch.len(), "Retraining triggered");

        let dataset = match self.prepare(&batch).await {
            Ok(dataset) => dataset,
            Err(error) => {
                error!(%error, "Failed to prepare retraining batch");
                return TickOutcome::PreparationFailed { error };
            }
        };

        self.set_state(SchedulerState::Training);
        let samples = dataset.len();

        match self.train(&dataset).await {
            Ok(version) => {
                info!(version = %version.version_id, samples, "Retraining complete");
                TickOutcome::Trained { version, samples }
            }
            Err(error) => {
                error!(%error, samples, "Retraining failed; batch stays consumed");
                TickOutcome::TrainingFailed { samples, error }
            }
        }
    }

    /// Write the dataset for exactly `batch`, then claim it. If any record was
    /// consumed since the snapshot, the dataset is discarded and nothing trains.
    async fn prepare(
        &self,
        batch: &[crate::learning::LearningRecord],
    ) -> Result<DatasetArtifact, String> {
        let dataset = write_dataset(&self.datasets_dir, batch)
            .await
            .map_err(|e| e.to_string())?;

        if let Err(e) = self.store.claim(&dataset.record_ids).await {
            if let Err(rm) = tokio::fs::remove_file(&dataset.path).await {
                warn!(path = %dataset.path.display(), error = %rm, "Failed to remove orphaned dataset");
            }
            return Err(e.to_string());
        }

        Ok(dataset)
    }

    async fn train(&self, dataset: &DatasetArtifact) -> Result<AdapterVersion, String> {
        let allocated = self.adapters.allocate_version().map_err(|e| e.to_string())?;

        self.job
            .train(&dataset.path, &allocated.path)
            .await
            .map_err(|e| e.to_string())?;

        let mut params = self.job.params();
        if let serde_json::Value::Object(ref mut map) = params {
            map.insert("job".to_string(), self.job.name().into());
            map.insert("samples".to_string(), dataset.len().into());
            map.insert("retrain_threshold".to_string(), self.retrain_threshold.into());
        }

        self.adapters
            .record_version(&allocated, params, vec![dataset.file_name()])
            .map_err(|e| e.to_string())
    }

    fn try_lock_file(&self) -> std::io::Result<Option<std::fs::File>> {
        if let Some(parent) = self.lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(file)),
            Err(e) if e.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Tick on the configured interval until `stop` is called.
    ///
    /// The first tick runs immediately. A tick in progress when `stop` is
    /// called finishes first.
    pub async fn run_loop(&self) {
        self.running.store(true, Ordering::SeqCst);
        info!(
            interval = ?self.interval,
            threshold = self.retrain_threshold,
            min_batch = self.min_batch_size,
            "Retraining scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.run_once().await;
                    debug!(?outcome, "Scheduler tick finished");
                }
                _ = self.shutdown.notified() => break,
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("Retraining scheduler stopped");
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::constants::ADAPTER_ARTIFACT_DIR;
    use crate::errors::TrainingError;
    use crate::synthesis::SynthesizedAnswer;
    use async_trait::async_trait;
    use std::collections::BTreeSet;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    /// Writes a fake adapter, optionally after waiting for a release signal
    struct FakeJob {
        fail: bool,
        calls: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    impl FakeJob {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                calls: AtomicUsize::new(0),
                gate: None,
            }
        }
    }

    #[async_trait]
    impl TrainingJob for FakeJob {
        fn name(&self) -> &str {
            "fake"
        }

        async fn train(&self, dataset: &Path, output_dir: &Path) -> Result<(), TrainingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(dataset.exists());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(TrainingError::ExitStatus("exit status: 1".to_string()));
            }
            tokio::fs::create_dir_all(output_dir.join(ADAPTER_ARTIFACT_DIR)).await?;
            Ok(())
        }
    }

    struct Harness {
        _dir: TempDir,
        store: Arc<LearningStore>,
        adapters: Arc<AdapterManager>,
        config: SchedulerConfig,
    }

    fn harness() -> Harness {
        let dir = TempDir::new().unwrap();
        let adapters = AdapterManager::with_layout(
            &dir.path().join("adapters"),
            &dir.path().join("active"),
            "lora_",
        )
        .unwrap();
        let config = SchedulerConfig {
            retrain_threshold: 0.8,
            min_batch_size: 100,
            interval_secs: 3600,
            datasets_dir: dir.path().join("datasets"),
            lock_path: dir.path().join("retrain.lock"),
        };
        Harness {
            store: Arc::new(LearningStore::in_memory(0.7).unwrap()),
            adapters: Arc::new(adapters),
            config,
            _dir: dir,
        }
    }

    async fn fill(store: &LearningStore, count: usize, confidence: f64) {
        for i in 0..count {
            store
                .append(&SynthesizedAnswer {
                    query: format!("q{}", i),
                    final_text: format!("a{}", i),
                    confidence,
                    reasoning: String::new(),
                    sources_used: BTreeSet::from(["s".to_string()]),
                })
                .await
                .unwrap();
        }
    }

    fn scheduler(h: &Harness, job: Arc<dyn TrainingJob>) -> RetrainingScheduler {
        RetrainingScheduler::new(&h.config, Arc::clone(&h.store), Arc::clone(&h.adapters), job)
    }

    #[tokio::test]
    async fn test_below_batch_size_does_nothing() {
        let h = harness();
        fill(&h.store, 99, 0.85).await;
        let job = Arc::new(FakeJob::new(false));
        let s = scheduler(&h, job.clone());

        assert!(matches!(
            s.run_once().await,
            TickOutcome::NotReady { qualifying: 99, required: 100 }
        ));
        assert_eq!(job.calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.store.unconsumed(0.8).await.unwrap().len(), 99);
        assert_eq!(s.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_full_batch_trains_and_consumes() {
        let h = harness();
        fill(&h.store, 100, 0.85).await;
        let job = Arc::new(FakeJob::new(false));
        let s = scheduler(&h, job.clone());

        let TickOutcome::Trained { version, samples } = s.run_once().await else {
            panic!("expected a trained version");
        };
        assert_eq!(samples, 100);
        assert_eq!(job.calls.load(Ordering::SeqCst), 1);
        assert!(h.store.unconsumed(0.8).await.unwrap().is_empty());
        assert_eq!(version.datasets_used.len(), 1);
        assert_eq!(version.training_params["samples"], 100);

        // Recorded, not activated
        assert_eq!(h.adapters.list().unwrap().len(), 1);
        assert!(h.adapters.current().unwrap().is_none());
        assert_eq!(s.state(), SchedulerState::Idle);
    }

    #[tokio::test]
    async fn test_low_confidence_records_do_not_qualify() {
        let h = harness();
        fill(&h.store, 150, 0.75).await;
        let s = scheduler(&h, Arc::new(FakeJob::new(false)));

        assert!(matches!(s.run_once().await, TickOutcome::NotReady { qualifying: 0, .. }));
    }

    #[tokio::test]
    async fn test_failed_training_keeps_batch_consumed() {
        let h = harness();
        fill(&h.store, 100, 0.9).await;
        let s = scheduler(&h, Arc::new(FakeJob::new(true)));

        assert!(matches!(
            s.run_once().await,
            TickOutcome::TrainingFailed { samples: 100, .. }
        ));
        assert!(h.store.unconsumed(0.8).await.unwrap().is_empty());
        assert!(h.adapters.list().unwrap().is_empty());
        assert_eq!(s.state(), SchedulerState::Idle);

        // Next tick has nothing to do
        assert!(matches!(s.run_once().await, TickOutcome::NotReady { qualifying: 0, .. }));
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let h = harness();
        fill(&h.store, 100, 0.9).await;

        let gate = Arc::new(Notify::new());
        let job = Arc::new(FakeJob {
            fail: false,
            calls: AtomicUsize::new(0),
            gate: Some(Arc::clone(&gate)),
        });
        let s = Arc::new(scheduler(&h, job.clone()));

        let first = tokio::spawn({
            let s = Arc::clone(&s);
            async move { s.run_once().await }
        });

        while s.state() != SchedulerState::Training {
            tokio::task::yield_now().await;
        }

        assert!(matches!(s.run_once().await, TickOutcome::Skipped));

        gate.notify_one();
        assert!(matches!(first.await.unwrap(), TickOutcome::Trained { .. }));
        assert_eq!(job.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_consumed_after_snapshot_is_not_trained() {
        let h = harness();
        fill(&h.store, 100, 0.9).await;
        let job = Arc::new(FakeJob::new(false));
        let s = scheduler(&h, job.clone());

        let snapshot = h.store.unconsumed(0.8).await.unwrap();
        // Another scheduler on the same database takes part of the batch
        let stolen: Vec<i64> = snapshot.iter().take(10).map(|r| r.id).collect();
        h.store.mark_consumed(&stolen).await.unwrap();

        assert!(s.prepare(&snapshot).await.is_err());

        // Nothing left behind, and the untouched records stay available
        let leftovers = std::fs::read_dir(&h.config.datasets_dir).unwrap().count();
        assert_eq!(leftovers, 0);
        assert_eq!(h.store.unconsumed(0.8).await.unwrap().len(), 90);
        assert_eq!(job.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let h = harness();
        let config = SchedulerConfig {
            interval_secs: 0,
            ..h.config.clone()
        };
        let s = Arc::new(RetrainingScheduler::new(
            &config,
            Arc::clone(&h.store),
            Arc::clone(&h.adapters),
            Arc::new(FakeJob::new(false)),
        ));

        let handle = tokio::spawn({
            let s = Arc::clone(&s);
            async move { s.run_loop().await }
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        s.stop();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_status_mirrors_check() {
        let h = harness();
        fill(&h.store, 100, 0.9).await;
        let s = scheduler(&h, Arc::new(FakeJob::new(false)));

        let status = s.status().await.unwrap();
        assert_eq!(status.qualifying_samples, 100);
        assert!(status.ready_for_retrain);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_on_request() {
        let h = harness();
        let s = Arc::new(scheduler(&h, Arc::new(FakeJob::new(false))));

        let handle = tokio::spawn({
            let s = Arc::clone(&s);
            async move { s.run_loop().await }
        });

        tokio::time::sleep(Duration::from_secs(7200)).await;
        s.stop();
        handle.await.unwrap();
        assert!(!s.is_running());
    }
}
