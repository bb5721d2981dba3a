// External provider source
//
// Any OpenAI-compatible chat API (OpenAI, Grok, Mistral, Groq, ...).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::SourceAnswer;
use super::AnswerSource;
use crate::errors::SourceError;

const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

pub struct ExternalSource {
    id: String,
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    confidence: f64,
}

impl ExternalSource {
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        confidence: f64,
    ) -> anyhow::Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            id: id.into(),
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            model: model.into(),
            confidence,
        })
    }
}

#[async_trait]
impl AnswerSource for ExternalSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "external"
    }

    async fn answer(&self, query: &str, timeout: Duration) -> Result<SourceAnswer, SourceError> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: query,
            }],
            max_tokens: MAX_TOKENS,
        };

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| SourceError::request(&self.id, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::request(
                &self.id,
                format!("status {}: {}", status, body),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| SourceError::request(&self.id, e))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        SourceAnswer::validated(&self.id, text, self.confidence)
    }
}
