// Synthesis pipeline - the request boundary
//
// collect -> synthesize -> store. The caller always gets a SynthesizedAnswer:
// source failures are omitted, review failures fall back, and store failures
// are logged and swallowed.

use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::collector::SourceCollector;
use crate::config::Settings;
use crate::errors::StoreError;
use crate::learning::{LearningStore, StoreStats};
use crate::sources::{create_sources, AnswerCandidate, CompletionClient};
use crate::synthesis::{LlmReviewer, SynthesizedAnswer, Synthesizer};

/// Full account of one query, for callers that want more than the answer
#[derive(Debug, Clone, Serialize)]
pub struct AnswerReport {
    pub answer: SynthesizedAnswer,
    pub candidates: Vec<AnswerCandidate>,
    pub failures: Vec<AnswerCandidate>,
    /// Id of the learning record, when the answer cleared the store gate
    pub stored_id: Option<i64>,
    #[serde(with = "crate::sources::types::duration_millis")]
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
    Down,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub component: String,
    pub status: HealthStatus,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub components: Vec<ComponentHealth>,
}

pub struct SynthesisPipeline {
    collector: SourceCollector,
    synthesizer: Synthesizer,
    store: Arc<LearningStore>,
}

impl SynthesisPipeline {
    pub fn new(collector: SourceCollector, synthesizer: Synthesizer, store: Arc<LearningStore>) -> Self {
        Self {
            collector,
            synthesizer,
            store,
        }
    }

    /// Build sources, reviewer and store from settings
    pub fn from_settings(settings: &Settings, store: Arc<LearningStore>) -> Result<Self> {
        let sources = create_sources(&settings.sources).context("Failed to create answer sources")?;
        let collector = SourceCollector::new(sources, &settings.collector);

        let synthesizer = match &settings.reviewer {
            Some(reviewer) => {
                let client = CompletionClient::new(reviewer.endpoint.clone(), reviewer.model.clone())
                    .context("Failed to create reviewer client")?;
                Synthesizer::new(
                    Arc::new(LlmReviewer::new(client, reviewer.timeout())),
                    reviewer.timeout(),
                )
            }
            None => {
                info!("No reviewer configured, multi-source answers resolve by highest confidence");
                Synthesizer::without_reviewer()
            }
        };

        Ok(Self::new(collector, synthesizer, store))
    }

    pub fn store(&self) -> &Arc<LearningStore> {
        &self.store
    }

    /// Answer one query. Never fails.
    pub async fn answer(&self, query: &str) -> SynthesizedAnswer {
        self.answer_detailed(query).await.answer
    }

    pub async fn answer_detailed(&self, query: &str) -> AnswerReport {
        let started = Instant::now();

        let collection = self.collector.collect_detailed(query).await;
        let answer = self.synthesizer.synthesize(query, &collection.candidates).await;

        let stored_id = match self.store.append(&answer).await {
            Ok(record) => record.map(|r| r.id),
            Err(e) => {
                warn!(error = %e, "Failed to store synthesized answer");
                None
            }
        };

        info!(
            candidates = collection.candidates.len(),
            failures = collection.failures.len(),
            confidence = answer.confidence,
            stored = stored_id.is_some(),
            "Answered query"
        );

        AnswerReport {
            answer,
            candidates: collection.candidates,
            failures: collection.failures,
            stored_id,
            elapsed: started.elapsed(),
        }
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        self.store.stats().await
    }

    pub async fn health(&self) -> HealthReport {
        let mut components = Vec::new();

        let sources = self.collector.sources();
        components.push(ComponentHealth {
            component: "sources".to_string(),
            status: if sources.is_empty() {
                HealthStatus::Degraded
            } else {
                HealthStatus::Ok
            },
            detail: sources
                .iter()
                .map(|s| format!("{} ({})", s.id(), s.kind()))
                .collect::<Vec<_>>()
                .join(", "),
        });

        components.push(ComponentHealth {
            component: "synthesizer".to_string(),
            status: HealthStatus::Ok,
            detail: self.synthesizer.strategy_name().to_string(),
        });

        components.push(match self.store.ping().await {
            Ok(()) => ComponentHealth {
                component: "learning_store".to_string(),
                status: HealthStatus::Ok,
                detail: self
                    .store
                    .location()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "in-memory".to_string()),
            },
            Err(e) => ComponentHealth {
                component: "learning_store".to_string(),
                status: HealthStatus::Down,
                detail: e.to_string(),
            },
        });

        let status = components
            .iter()
            .map(|c| c.status)
            .fold(HealthStatus::Ok, |worst, s| match (worst, s) {
                (HealthStatus::Down, _) | (_, HealthStatus::Down) => HealthStatus::Down,
                (HealthStatus::Degraded, _) | (_, HealthStatus::Degraded) => HealthStatus::Degraded,
                _ => HealthStatus::Ok,
            });

        HealthReport { status, components }
    }
}
