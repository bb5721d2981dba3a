// LLM reviewer - merges multiple candidates with a secondary model
//
// The reviewer sees every candidate with its source id and confidence and is
// asked for a JSON verdict. Anything that does not parse into a usable verdict
// is a ReviewError, which sends the synthesizer down the fallback path.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use super::types::MergeOutcome;
use super::MergeStrategy;
use crate::errors::ReviewError;
use crate::sources::{AnswerCandidate, CompletionClient};

const MAX_TOKENS: u32 = 1024;
const TEMPERATURE: f32 = 0.2;

#[derive(Debug, Deserialize)]
struct ReviewVerdict {
    best_answer: String,
    confidence: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    sources_used: Vec<String>,
}

pub struct LlmReviewer {
    client: CompletionClient,
    timeout: Duration,
}

impl LlmReviewer {
    pub fn new(client: CompletionClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    pub fn build_prompt(query: &str, candidates: &[AnswerCandidate]) -> String {
        let mut prompt = format!(
            "You are an expert answer reviewer. You will receive multiple answers to the same \
             question from different sources. Your job is to:\n\
             1. Analyze each answer for accuracy and completeness\n\
             2. Identify the best information from all answers\n\
             3. Create ONE BEST ANSWER that combines the strongest points\n\n\
             Question: {}\n\nAnswers to review:\n",
            query
        );

        for (i, candidate) in candidates.iter().enumerate() {
            prompt.push_str(&format!(
                "\n--- Answer {} (from {}, confidence: {:.2}) ---\n{}\n",
                i + 1,
                candidate.source_id,
                candidate.confidence,
                candidate.text
            ));
        }

        prompt.push_str(
            "\nNow, create the BEST SINGLE ANSWER by:\n\
             - Taking the most accurate information\n\
             - Ensuring completeness\n\
             - Making it clear and well-structured\n\
             - Removing any contradictions\n\n\
             Respond in JSON format:\n\
             {\n  \"best_answer\": \"your synthesized answer here\",\n  \
             \"confidence\": 0.95,\n  \
             \"reasoning\": \"why this is the best answer\",\n  \
             \"sources_used\": [\"source id\", \"source id\"]\n}\n\n\
             JSON Response:",
        );

        prompt
    }

    /// Extract the outermost JSON object from free-form model output
    pub fn parse_verdict(raw: &str) -> Result<MergeOutcome, ReviewError> {
        let start = raw
            .find('{')
            .ok_or_else(|| ReviewError::Malformed("no JSON object in review output".to_string()))?;
        let end = raw
            .rfind('}')
            .filter(|end| *end > start)
            .ok_or_else(|| ReviewError::Malformed("unterminated JSON object".to_string()))?;

        let verdict: ReviewVerdict = serde_json::from_str(&raw[start..=end])
            .map_err(|e| ReviewError::Malformed(e.to_string()))?;

        Ok(MergeOutcome {
            final_text: verdict.best_answer,
            confidence: verdict.confidence,
            reasoning: verdict.reasoning,
            sources_used: verdict.sources_used,
        })
    }
}

#[async_trait]
impl MergeStrategy for LlmReviewer {
    fn name(&self) -> &str {
        "llm_reviewer"
    }

    async fn merge(
        &self,
        query: &str,
        candidates: &[AnswerCandidate],
    ) -> Result<MergeOutcome, ReviewError> {
        tracing::debug!(candidates = candidates.len(), "Reviewing candidates");

        let prompt = Self::build_prompt(query, candidates);
        let raw = self
            .client
            .complete(&prompt, MAX_TOKENS, TEMPERATURE, self.timeout)
            .await
            .map_err(|e| ReviewError::Request(format!("{:#}", e)))?;

        Self::parse_verdict(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::SourceAnswer;

    fn candidate(id: &str, text: &str, confidence: f64) -> AnswerCandidate {
        AnswerCandidate::new(
            id,
            SourceAnswer::validated(id, text, confidence).unwrap(),
            Duration::ZERO,
        )
    }

    #[test]
    fn test_prompt_lists_every_candidate() {
        let prompt = LlmReviewer::build_prompt(
            "What is diabetes?",
            &[candidate("tuned", "A disease.", 0.75), candidate("cot", "A metabolic disorder.", 0.85)],
        );
        assert!(prompt.contains("Question: What is diabetes?"));
        assert!(prompt.contains("--- Answer 1 (from tuned, confidence: 0.75) ---"));
        assert!(prompt.contains("--- Answer 2 (from cot, confidence: 0.85) ---"));
        assert!(prompt.ends_with("JSON Response:"));
    }

    #[test]
    fn test_parse_verdict_ignores_surrounding_text() {
        let raw = "Sure! Here it is:\n{\"best_answer\": \"Combined.\", \"confidence\": 0.93, \
                   \"reasoning\": \"both agree\", \"sources_used\": [\"a\", \"b\"]}\nDone.";
        let outcome = LlmReviewer::parse_verdict(raw).unwrap();
        assert_eq!(outcome.final_text, "Combined.");
        assert_eq!(outcome.confidence, 0.93);
        assert_eq!(outcome.sources_used, vec!["a", "b"]);
    }

    #[test]
    fn test_parse_verdict_rejects_prose() {
        assert!(matches!(
            LlmReviewer::parse_verdict("I think answer 2 is best."),
            Err(ReviewError::Malformed(_))
        ));
    }

    #[test]
    fn test_parse_verdict_rejects_missing_fields() {
        assert!(LlmReviewer::parse_verdict(r#"{"reasoning": "no answer"}"#).is_err());
    }

    #[tokio::test]
    async fn test_merge_against_completion_endpoint() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/completions")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "choices": [{"text": "{\"best_answer\": \"Merged\", \"confidence\": 0.9, \"sources_used\": [\"a\"]}"}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let reviewer = LlmReviewer::new(
            CompletionClient::new(server.url(), None).unwrap(),
            Duration::from_secs(5),
        );
        let outcome = reviewer
            .merge("q", &[candidate("a", "x", 0.5), candidate("b", "y", 0.6)])
            .await
            .unwrap();
        assert_eq!(outcome.final_text, "Merged");
        assert!(outcome.reasoning.is_empty());
    }
}
