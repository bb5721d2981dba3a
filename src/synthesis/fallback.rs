// Deterministic highest-confidence selection
//
// Used when the review step fails, and usable directly as a merge strategy
// when no reviewer model is configured.

use async_trait::async_trait;

use super::types::MergeOutcome;
use super::MergeStrategy;
use crate::config::constants::FALLBACK_REASONING;
use crate::errors::ReviewError;
use crate::sources::AnswerCandidate;

/// Highest confidence wins; ties go to the candidate collected first
pub fn highest_confidence(candidates: &[AnswerCandidate]) -> Option<&AnswerCandidate> {
    let mut best: Option<&AnswerCandidate> = None;
    for candidate in candidates {
        match best {
            Some(current) if candidate.confidence <= current.confidence => {}
            _ => best = Some(candidate),
        }
    }
    best
}

/// Merge strategy that never merges: it picks the strongest single answer
#[derive(Debug, Default, Clone, Copy)]
pub struct HighestConfidence;

#[async_trait]
impl MergeStrategy for HighestConfidence {
    fn name(&self) -> &str {
        "highest_confidence"
    }

    async fn merge(
        &self,
        _query: &str,
        candidates: &[AnswerCandidate],
    ) -> Result<MergeOutcome, ReviewError> {
        let best = highest_confidence(candidates)
            .ok_or_else(|| ReviewError::Malformed("no candidates to select from".to_string()))?;

        Ok(MergeOutcome {
            final_text: best.text.clone(),
            confidence: best.confidence,
            reasoning: FALLBACK_REASONING.to_string(),
            sources_used: vec![best.source_id.clone()],
        })
    }
}
