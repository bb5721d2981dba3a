// OpenAI-compatible completion client
//
// Shared by the local model source, the reasoning source and the reviewer.
// Works against any server exposing `/v1/completions` (vLLM, llama.cpp, TGI).

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    text: String,
}

/// Thin client for `/v1/completions`
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    base_url: String,
    model: Option<String>,
}

impl CompletionClient {
    pub fn new(base_url: impl Into<String>, model: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Run one completion and return the first choice's text
    pub async fn complete(
        &self,
        prompt: &str,
        max_tokens: u32,
        temperature: f32,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!("{}/v1/completions", self.base_url);
        let request = CompletionRequest {
            model: self.model.as_deref(),
            prompt,
            max_tokens,
            temperature,
        };

        tracing::debug!(url = %url, max_tokens, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .context("Failed to send completion request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Completion request failed\n\nStatus: {}\nBody: {}", status, body);
        }

        let parsed: CompletionResponse = response
            .json()
            .await
            .context("Failed to parse completion response")?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .context("Completion endpoint returned no choices")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_complete_returns_first_choice() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"choices":[{"text":" first"},{"text":"second"}]}"#)
            .create_async()
            .await;

        let client = CompletionClient::new(server.url(), Some("m".to_string())).unwrap();
        let text = client
            .complete("prompt", 16, 0.2, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(text, " first");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_surfaces_http_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/completions")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let client = CompletionClient::new(format!("{}/", server.url()), None).unwrap();
        let err = client
            .complete("prompt", 16, 0.2, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("503"));
    }
}
