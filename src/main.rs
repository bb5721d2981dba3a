// synthloop - answer synthesis and continuous-learning pipeline
// Main entry point: runs the retraining scheduler until Ctrl-C

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use synthloop::adapters::AdapterManager;
use synthloop::config::load_settings;
use synthloop::learning::LearningStore;
use synthloop::pipeline::SynthesisPipeline;
use synthloop::retraining::{CommandTrainingJob, RetrainingScheduler};

fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();

    tracing_log::LogTracer::init().context("Failed to bridge log records")?;
    tracing::subscriber::set_global_default(subscriber).context("Failed to install subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let settings = load_settings()?;

    let store = Arc::new(LearningStore::open(&settings.store)?);
    let pipeline = SynthesisPipeline::from_settings(&settings, Arc::clone(&store))?;
    let adapters = Arc::new(AdapterManager::new(&settings.adapters)?);
    let job = Arc::new(CommandTrainingJob::new(&settings.training));

    let health = pipeline.health().await;
    for component in &health.components {
        tracing::info!(
            component = %component.component,
            status = ?component.status,
            detail = %component.detail,
            "Component health"
        );
    }

    let stats = store.stats().await?;
    tracing::info!(
        total = stats.total,
        unconsumed = stats.unconsumed,
        average_confidence = stats.average_confidence,
        "Learning store ready"
    );

    match adapters.current()? {
        Some(active) => tracing::info!(version = %active.version_id, "Active adapter"),
        None => tracing::info!("No active adapter"),
    }

    let scheduler = Arc::new(RetrainingScheduler::new(
        &settings.scheduler,
        store,
        adapters,
        job,
    ));

    let runner = tokio::spawn({
        let scheduler = Arc::clone(&scheduler);
        async move { scheduler.run_loop().await }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested, waiting for the current tick to finish");
    scheduler.stop();

    runner.await.context("Scheduler task panicked")?;
    Ok(())
}
