// Retrieval-augmented source
//
// Calls a RAG service that retrieves context and answers in one round trip.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::SourceAnswer;
use super::AnswerSource;
use crate::errors::SourceError;

#[derive(Debug, Serialize)]
struct RetrievalRequest<'a> {
    query: &'a str,
    mode: &'static str,
}

#[derive(Debug, Deserialize)]
struct RetrievalResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    context: Vec<serde_json::Value>,
}

pub struct RetrievalSource {
    id: String,
    client: Client,
    endpoint: String,
    default_confidence: f64,
}

impl RetrievalSource {
    pub fn new(
        id: impl Into<String>,
        endpoint: impl Into<String>,
        default_confidence: f64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            id: id.into(),
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            default_confidence,
        })
    }
}

#[async_trait]
impl AnswerSource for RetrievalSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "retrieval"
    }

    async fn answer(&self, query: &str, timeout: Duration) -> Result<SourceAnswer, SourceError> {
        let url = format!("{}/api/voice-assistant", self.endpoint);

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&RetrievalRequest { query, mode: "rag" })
            .send()
            .await
            .map_err(|e| SourceError::request(&self.id, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::request(
                &self.id,
                format!("status {}", status),
            ));
        }

        let body: RetrievalResponse = response
            .json()
            .await
            .map_err(|e| SourceError::request(&self.id, e))?;

        tracing::debug!(
            source = %self.id,
            context_items = body.context.len(),
            "Retrieval answered"
        );

        SourceAnswer::validated(
            &self.id,
            body.response,
            body.confidence.unwrap_or(self.default_confidence),
        )
    }
}
