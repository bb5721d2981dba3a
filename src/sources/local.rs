// Fine-tuned local model source
//
// Talks to the model server that serves the currently active adapter.

use async_trait::async_trait;
use std::time::Duration;

use super::completion::CompletionClient;
use super::types::SourceAnswer;
use super::AnswerSource;
use crate::errors::SourceError;

const MAX_TOKENS: u32 = 256;
const TEMPERATURE: f32 = 0.7;

/// Answers with the locally served, fine-tuned model
pub struct LocalModelSource {
    id: String,
    client: CompletionClient,
    confidence: f64,
}

impl LocalModelSource {
    pub fn new(id: impl Into<String>, client: CompletionClient, confidence: f64) -> Self {
        Self {
            id: id.into(),
            client,
            confidence,
        }
    }

    /// Instruction-tuned prompt format used during fine-tuning
    pub fn prompt(query: &str) -> String {
        format!("<s>[INST] {} [/INST]", query)
    }
}

#[async_trait]
impl AnswerSource for LocalModelSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "local_model"
    }

    async fn answer(&self, query: &str, timeout: Duration) -> Result<SourceAnswer, SourceError> {
        let raw = self
            .client
            .complete(&Self::prompt(query), MAX_TOKENS, TEMPERATURE, timeout)
            .await
            .map_err(|e| SourceError::request(&self.id, format!("{:#}", e)))?;

        // Some servers echo the prompt back
        let text = raw.rsplit("[/INST]").next().unwrap_or(&raw);

        SourceAnswer::validated(&self.id, text, self.confidence)
    }
}
