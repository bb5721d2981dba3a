// External training job

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::config::constants::ADAPTER_ARTIFACT_DIR;
use crate::config::TrainingConfig;
use crate::errors::TrainingError;

/// Trains one adapter from a dataset file into `output_dir`.
///
/// Success means `output_dir` now holds the adapter artifacts.
#[async_trait]
pub trait TrainingJob: Send + Sync {
    fn name(&self) -> &str;

    /// Parameters recorded in the resulting version's metadata
    fn params(&self) -> serde_json::Value {
        serde_json::Value::Object(Default::default())
    }

    async fn train(&self, dataset: &Path, output_dir: &Path) -> Result<(), TrainingError>;
}

/// Runs a training program as a child process
pub struct CommandTrainingJob {
    program: String,
    args: Vec<String>,
    epochs: u32,
    batch_size: u32,
    timeout: Duration,
}

impl CommandTrainingJob {
    pub fn new(config: &TrainingConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            epochs: config.epochs,
            batch_size: config.batch_size,
            timeout: config.timeout(),
        }
    }

    fn command(&self, dataset: &Path, output_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("--epochs")
            .arg(self.epochs.to_string())
            .arg("--batch-size")
            .arg(self.batch_size.to_string())
            .arg("--custom-dataset")
            .arg(dataset)
            .arg("--output-dir")
            .arg(output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl TrainingJob for CommandTrainingJob {
    fn name(&self) -> &str {
        &self.program
    }

    fn params(&self) -> serde_json::Value {
        serde_json::json!({
            "program": self.program,
            "args": self.args,
            "epochs": self.epochs,
            "batch_size": self.batch_size,
        })
    }

    async fn train(&self, dataset: &Path, output_dir: &Path) -> Result<(), TrainingError> {
        tracing::info!(
            program = %self.program,
            dataset = %dataset.display(),
            output = %output_dir.display(),
            "Starting training job"
        );

        let mut child = self
            .command(dataset, output_dir)
            .spawn()
            .map_err(|source| TrainingError::Launch {
                program: self.program.clone(),
                source,
            })?;

        let mut forwarders = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(tokio::spawn(forward_lines(stdout, "stdout")));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(tokio::spawn(forward_lines(stderr, "stderr")));
        }

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                tracing::error!(timeout = ?self.timeout, "Training job timed out, killing it");
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill training job");
                }
                return Err(TrainingError::Timeout(self.timeout));
            }
        };

        for forwarder in forwarders {
            let _ = forwarder.await;
        }

        if !status.success() {
            return Err(TrainingError::ExitStatus(status.to_string()));
        }

        let artifacts = output_dir.join(ADAPTER_ARTIFACT_DIR);
        if !tokio::fs::try_exists(&artifacts).await? {
            return Err(TrainingError::MissingArtifacts(artifacts));
        }

        tracing::info!(output = %output_dir.display(), "Training job finished");
        Ok(())
    }
}

async fn forward_lines<R: AsyncRead + Unpin>(reader: R, stream: &'static str) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::info!(target: "synthloop::training", stream, "{}", line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(stream, error = %e, "Stopped reading training output");
                break;
            }
        }
    }
}
