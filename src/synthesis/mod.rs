// Synthesizer (reviewer)
//
// Turns the collected candidates for one query into one SynthesizedAnswer:
// - no candidates: fixed insufficient-information answer, confidence 0.0
// - one candidate: returned verbatim, no review
// - several: the merge strategy runs; if it fails, the highest-confidence
//   candidate is selected deterministically

use async_trait::async_trait;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::constants::{
    DEFAULT_REVIEW_TIMEOUT_MS, FALLBACK_REASONING, INSUFFICIENT_INFORMATION_ANSWER,
};
use crate::errors::ReviewError;
use crate::sources::AnswerCandidate;

pub mod fallback;
pub mod reviewer;
pub mod types;

pub use fallback::{highest_confidence, HighestConfidence};
pub use reviewer::LlmReviewer;
pub use types::{MergeOutcome, SynthesizedAnswer};

/// Pluggable merge step: evaluate all candidates against the query
#[async_trait]
pub trait MergeStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn merge(
        &self,
        query: &str,
        candidates: &[AnswerCandidate],
    ) -> Result<MergeOutcome, ReviewError>;
}

/// Stateless; safe to share across concurrent queries
#[derive(Clone)]
pub struct Synthesizer {
    strategy: Arc<dyn MergeStrategy>,
    review_timeout: Duration,
}

impl Synthesizer {
    pub fn new(strategy: Arc<dyn MergeStrategy>, review_timeout: Duration) -> Self {
        Self {
            strategy,
            review_timeout,
        }
    }

    /// Synthesizer without a reviewer model: multi-candidate queries resolve by
    /// highest confidence
    pub fn without_reviewer() -> Self {
        Self::new(
            Arc::new(HighestConfidence),
            Duration::from_millis(DEFAULT_REVIEW_TIMEOUT_MS),
        )
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub async fn synthesize(&self, query: &str, candidates: &[AnswerCandidate]) -> SynthesizedAnswer {
        let usable: Vec<AnswerCandidate> = candidates
            .iter()
            .filter(|c| c.is_usable())
            .cloned()
            .collect();

        match usable.len() {
            0 => insufficient(query),
            1 => {
                let only = &usable[0];
                debug!(source = %only.source_id, "Single candidate, skipping review");
                SynthesizedAnswer {
                    query: query.to_string(),
                    final_text: only.text.clone(),
                    confidence: only.confidence,
                    reasoning: format!("single source: {}", only.source_id),
                    sources_used: BTreeSet::from([only.source_id.clone()]),
                }
            }
            _ => match self.review(query, &usable).await {
                Ok(answer) => answer,
                Err(e) => {
                    warn!(
                        strategy = self.strategy.name(),
                        error = %e,
                        "Review failed, falling back to highest confidence"
                    );
                    fallback(query, &usable)
                }
            },
        }
    }

    async fn review(
        &self,
        query: &str,
        candidates: &[AnswerCandidate],
    ) -> Result<SynthesizedAnswer, ReviewError> {
        let outcome = tokio::time::timeout(self.review_timeout, self.strategy.merge(query, candidates))
            .await
            .map_err(|_| ReviewError::Timeout(self.review_timeout))??;

        validate_outcome(query, outcome, candidates)
    }
}

/// Reject verdicts that cannot be trusted and restrict provenance to real sources
fn validate_outcome(
    query: &str,
    outcome: MergeOutcome,
    candidates: &[AnswerCandidate],
) -> Result<SynthesizedAnswer, ReviewError> {
    if outcome.final_text.trim().is_empty() {
        return Err(ReviewError::Malformed("empty combined answer".to_string()));
    }
    if !outcome.confidence.is_finite() || !(0.0..=1.0).contains(&outcome.confidence) {
        return Err(ReviewError::Malformed(format!(
            "confidence {} outside [0, 1]",
            outcome.confidence
        )));
    }

    let known: HashSet<&str> = candidates.iter().map(|c| c.source_id.as_str()).collect();
    let sources_used: BTreeSet<String> = outcome
        .sources_used
        .into_iter()
        .filter(|id| {
            let keep = known.contains(id.as_str());
            if !keep {
                debug!(source = %id, "Dropping unknown source from review provenance");
            }
            keep
        })
        .collect();

    if sources_used.is_empty() {
        return Err(ReviewError::Malformed(
            "review named none of the candidate sources".to_string(),
        ));
    }

    Ok(SynthesizedAnswer {
        query: query.to_string(),
        final_text: outcome.final_text.trim().to_string(),
        confidence: outcome.confidence,
        reasoning: outcome.reasoning,
        sources_used,
    })
}

fn insufficient(query: &str) -> SynthesizedAnswer {
    SynthesizedAnswer {
        query: query.to_string(),
        final_text: INSUFFICIENT_INFORMATION_ANSWER.to_string(),
        confidence: 0.0,
        reasoning: "no valid answers received".to_string(),
        sources_used: BTreeSet::new(),
    }
}

/// Infallible for a non-empty candidate list
fn fallback(query: &str, candidates: &[AnswerCandidate]) -> SynthesizedAnswer {
    match highest_confidence(candidates) {
        Some(best) => SynthesizedAnswer {
            query: query.to_string(),
            final_text: best.text.clone(),
            confidence: best.confidence,
            reasoning: FALLBACK_REASONING.to_string(),
            sources_used: BTreeSet::from([best.source_id.clone()]),
        },
        None => insufficient(query),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SourceError;
    use crate::sources::SourceAnswer;

    fn candidate(id: &str, confidence: f64) -> AnswerCandidate {
        AnswerCandidate::new(
            id,
            SourceAnswer::validated(id, format!("text-{}", id), confidence).unwrap(),
            Duration::ZERO,
        )
    }

    struct Failing;

    #[async_trait]
    impl MergeStrategy for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn merge(&self, _q: &str, _c: &[AnswerCandidate]) -> Result<MergeOutcome, ReviewError> {
            Err(ReviewError::Malformed("garbage".to_string()))
        }
    }

    struct Fixed(MergeOutcome);

    #[async_trait]
    impl MergeStrategy for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn merge(&self, _q: &str, _c: &[AnswerCandidate]) -> Result<MergeOutcome, ReviewError> {
            Ok(self.0.clone())
        }
    }

    struct Stalled;

    #[async_trait]
    impl MergeStrategy for Stalled {
        fn name(&self) -> &str {
            "stalled"
        }

        async fn merge(&self, _q: &str, _c: &[AnswerCandidate]) -> Result<MergeOutcome, ReviewError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ReviewError::Request("unreachable".to_string()))
        }
    }

    fn synthesizer(strategy: impl MergeStrategy + 'static) -> Synthesizer {
        Synthesizer::new(Arc::new(strategy), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_empty_candidates_are_insufficient() {
        let answer = synthesizer(Failing).synthesize("q", &[]).await;
        assert_eq!(answer.confidence, 0.0);
        assert!(answer.sources_used.is_empty());
        assert_eq!(answer.final_text, INSUFFICIENT_INFORMATION_ANSWER);
        assert!(answer.is_insufficient());
    }

    #[tokio::test]
    async fn test_failed_candidates_do_not_count() {
        let err = SourceError::request("x", "down");
        let failed = AnswerCandidate::failed("x", &err, Duration::ZERO);
        let answer = synthesizer(Failing).synthesize("q", &[failed]).await;
        assert!(answer.is_insufficient());
    }

    #[tokio::test]
    async fn test_single_candidate_is_verbatim() {
        let answer = synthesizer(Failing).synthesize("q", &[candidate("solo", 0.42)]).await;
        assert_eq!(answer.final_text, "text-solo");
        assert_eq!(answer.confidence, 0.42);
        assert_eq!(answer.sources_used, BTreeSet::from(["solo".to_string()]));
    }

    #[tokio::test]
    async fn test_review_failure_falls_back_to_first_highest() {
        let candidates = vec![candidate("a", 0.6), candidate("c", 0.9), candidate("d", 0.9)];
        let answer = synthesizer(Failing).synthesize("q", &candidates).await;
        assert_eq!(answer.final_text, "text-c");
        assert_eq!(answer.confidence, 0.9);
        assert_eq!(answer.reasoning, FALLBACK_REASONING);
        assert_eq!(answer.sources_used, BTreeSet::from(["c".to_string()]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_review_timeout_falls_back() {
        let candidates = vec![candidate("a", 0.6), candidate("b", 0.7)];
        let answer = synthesizer(Stalled).synthesize("q", &candidates).await;
        assert_eq!(answer.reasoning, FALLBACK_REASONING);
        assert_eq!(answer.sources_used, BTreeSet::from(["b".to_string()]));
    }

    #[tokio::test]
    async fn test_successful_review_restricts_provenance() {
        let strategy = Fixed(MergeOutcome {
            final_text: " merged ".to_string(),
            confidence: 0.97,
            reasoning: "combined".to_string(),
            sources_used: vec!["a".to_string(), "ghost".to_string(), "b".to_string()],
        });
        let candidates = vec![candidate("a", 0.6), candidate("b", 0.7)];
        let answer = synthesizer(strategy).synthesize("q", &candidates).await;

        assert_eq!(answer.final_text, "merged");
        assert_eq!(answer.confidence, 0.97);
        assert_eq!(
            answer.sources_used,
            BTreeSet::from(["a".to_string(), "b".to_string()])
        );
    }

    #[tokio::test]
    async fn test_out_of_range_review_confidence_falls_back() {
        let strategy = Fixed(MergeOutcome {
            final_text: "merged".to_string(),
            confidence: 1.4,
            reasoning: String::new(),
            sources_used: vec!["a".to_string()],
        });
        let candidates = vec![candidate("a", 0.6), candidate("b", 0.7)];
        let answer = synthesizer(strategy).synthesize("q", &candidates).await;
        assert_eq!(answer.reasoning, FALLBACK_REASONING);
    }

    #[tokio::test]
    async fn test_review_naming_only_unknown_sources_falls_back() {
        let strategy = Fixed(MergeOutcome {
            final_text: "merged".to_string(),
            confidence: 0.9,
            reasoning: String::new(),
            sources_used: vec!["ghost".to_string()],
        });
        let candidates = vec![candidate("a", 0.6), candidate("b", 0.7)];
        let answer = synthesizer(strategy).synthesize("q", &candidates).await;
        assert_eq!(answer.sources_used, BTreeSet::from(["b".to_string()]));
    }

    #[tokio::test]
    async fn test_without_reviewer_selects_highest() {
        let candidates = vec![candidate("a", 0.8), candidate("b", 0.5)];
        let answer = Synthesizer::without_reviewer().synthesize("q", &candidates).await;
        assert_eq!(answer.sources_used, BTreeSet::from(["a".to_string()]));
        assert_eq!(answer.confidence, 0.8);
    }
}
