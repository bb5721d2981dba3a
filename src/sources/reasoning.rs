// Chain-of-thought reasoning source

use async_trait::async_trait;
use std::time::Duration;

use super::completion::CompletionClient;
use super::types::SourceAnswer;
use super::AnswerSource;
use crate::errors::SourceError;

const MAX_TOKENS: u32 = 512;
const TEMPERATURE: f32 = 0.3;

/// Answers by prompting a general model to reason step by step
pub struct ReasoningSource {
    id: String,
    client: CompletionClient,
    confidence: f64,
}

impl ReasoningSource {
    pub fn new(id: impl Into<String>, client: CompletionClient, confidence: f64) -> Self {
        Self {
            id: id.into(),
            client,
            confidence,
        }
    }

    pub fn prompt(query: &str) -> String {
        format!(
            "Think step by step to answer this question:\n\n\
             Question: {}\n\n\
             Let's break this down:\n\
             1. First, identify what is being asked\n\
             2. Then, recall relevant information\n\
             3. Finally, provide a clear answer\n\n\
             Answer:",
            query
        )
    }
}

#[async_trait]
impl AnswerSource for ReasoningSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "reasoning"
    }

    async fn answer(&self, query: &str, timeout: Duration) -> Result<SourceAnswer, SourceError> {
        let text = self
            .client
            .complete(&Self::prompt(query), MAX_TOKENS, TEMPERATURE, timeout)
            .await
            .map_err(|e| SourceError::request(&self.id, format!("{:#}", e)))?;

        SourceAnswer::validated(&self.id, text, self.confidence)
    }
}
