// Source collector
//
// Fans one query out to every configured source concurrently and gathers
// whatever answers arrive within budget. Individual failures are logged and
// omitted; the collector itself never fails.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CollectorConfig;
use crate::errors::SourceError;
use crate::sources::{AnswerCandidate, AnswerSource};

/// Everything learned from one fan-out
#[derive(Debug, Clone, Default)]
pub struct Collection {
    /// Usable candidates in arrival order
    pub candidates: Vec<AnswerCandidate>,
    /// Sources that failed, timed out, or missed the overall deadline
    pub failures: Vec<AnswerCandidate>,
    pub elapsed: Duration,
    pub deadline_hit: bool,
}

pub struct SourceCollector {
    sources: Vec<Arc<dyn AnswerSource>>,
    per_source_timeout: Duration,
    overall_timeout: Duration,
}

impl SourceCollector {
    pub fn new(sources: Vec<Arc<dyn AnswerSource>>, config: &CollectorConfig) -> Self {
        Self::with_timeouts(sources, config.per_source_timeout(), config.overall_timeout())
    }

    pub fn with_timeouts(
        sources: Vec<Arc<dyn AnswerSource>>,
        per_source_timeout: Duration,
        overall_timeout: Duration,
    ) -> Self {
        Self {
            sources,
            per_source_timeout,
            overall_timeout,
        }
    }

    pub fn sources(&self) -> &[Arc<dyn AnswerSource>] {
        &self.sources
    }

    /// Usable candidates only, in arrival order
    pub async fn collect(&self, query: &str) -> Vec<AnswerCandidate> {
        self.collect_detailed(query).await.candidates
    }

    /// Candidates plus per-source failures
    pub async fn collect_detailed(&self, query: &str) -> Collection {
        collect_detailed(
            query,
            &self.sources,
            self.per_source_timeout,
            self.overall_timeout,
        )
        .await
    }
}

/// Dispatch `query` to all `sources` and return the usable candidates
pub async fn collect(
    query: &str,
    sources: &[Arc<dyn AnswerSource>],
    per_source_timeout: Duration,
    overall_timeout: Duration,
) -> Vec<AnswerCandidate> {
    collect_detailed(query, sources, per_source_timeout, overall_timeout)
        .await
        .candidates
}

async fn collect_detailed(
    query: &str,
    sources: &[Arc<dyn AnswerSource>],
    per_source_timeout: Duration,
    overall_timeout: Duration,
) -> Collection {
    let started = Instant::now();
    let deadline = started + overall_timeout;
    let query: Arc<str> = Arc::from(query);

    let mut set = JoinSet::new();
    let mut pending: Vec<String> = Vec::with_capacity(sources.len());

    for source in sources {
        let source = Arc::clone(source);
        let query = Arc::clone(&query);
        pending.push(source.id().to_string());

        set.spawn(async move {
            let call_started = Instant::now();
            let result =
                match tokio::time::timeout(per_source_timeout, source.answer(&query, per_source_timeout))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(SourceError::Timeout {
                        source_id: source.id().to_string(),
                        timeout: per_source_timeout,
                    }),
                };
            let latency = call_started.elapsed();

            match result {
                Ok(answer) => AnswerCandidate::new(source.id(), answer, latency),
                Err(e) => AnswerCandidate::failed(source.id(), &e, latency),
            }
        });
    }

    let mut collection = Collection::default();

    loop {
        match tokio::time::timeout_at(deadline, set.join_next()).await {
            Ok(Some(Ok(candidate))) => {
                if let Some(pos) = pending.iter().position(|id| *id == candidate.source_id) {
                    pending.swap_remove(pos);
                }
                if candidate.is_usable() {
                    debug!(
                        source = %candidate.source_id,
                        confidence = candidate.confidence,
                        latency_ms = candidate.latency.as_millis() as u64,
                        "Source answered"
                    );
                    collection.candidates.push(candidate);
                } else {
                    warn!(
                        source = %candidate.source_id,
                        error = candidate.error.as_deref().unwrap_or("empty answer"),
                        "Source unavailable"
                    );
                    collection.failures.push(candidate);
                }
            }
            Ok(Some(Err(join_error))) => {
                // The panicked source stays in `pending` and is reported below
                warn!(error = %join_error, "Source task aborted");
            }
            Ok(None) => break,
            Err(_) => {
                collection.deadline_hit = true;
                set.abort_all();
                warn!(
                    remaining = pending.len(),
                    deadline_ms = overall_timeout.as_millis() as u64,
                    "Overall collection deadline reached, dropping late sources"
                );
                break;
            }
        }
    }

    for source_id in pending {
        let error = if collection.deadline_hit {
            SourceError::Timeout {
                source_id: source_id.clone(),
                timeout: overall_timeout,
            }
        } else {
            SourceError::Aborted {
                source_id: source_id.clone(),
                message: "task panicked".to_string(),
            }
        };
        collection
            .failures
            .push(AnswerCandidate::failed(source_id, &error, started.elapsed()));
    }

    collection.elapsed = started.elapsed();

    info!(
        answered = collection.candidates.len(),
        failed = collection.failures.len(),
        elapsed_ms = collection.elapsed.as_millis() as u64,
        "Collected answers"
    );

    collection
}
