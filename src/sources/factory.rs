// Source factory - builds answer sources from configuration entries

use anyhow::{Context, Result};
use std::sync::Arc;

use super::completion::CompletionClient;
use super::{
    AnswerSource, ExternalSource, LocalModelSource, ReasoningSource, RetrievalSource,
};
use crate::config::SourceEntry;

/// Create a source from a single configuration entry
pub fn create_source(entry: &SourceEntry) -> Result<Arc<dyn AnswerSource>> {
    let source: Arc<dyn AnswerSource> = match entry {
        SourceEntry::LocalModel {
            id,
            endpoint,
            model,
            confidence,
            ..
        } => {
            let client = CompletionClient::new(endpoint.clone(), model.clone())?;
            Arc::new(LocalModelSource::new(id.clone(), client, *confidence))
        }
        SourceEntry::Retrieval {
            id,
            endpoint,
            confidence,
            ..
        } => Arc::new(RetrievalSource::new(id.clone(), endpoint.clone(), *confidence)?),
        SourceEntry::Reasoning {
            id,
            endpoint,
            model,
            confidence,
            ..
        } => {
            let client = CompletionClient::new(endpoint.clone(), model.clone())?;
            Arc::new(ReasoningSource::new(id.clone(), client, *confidence))
        }
        SourceEntry::External {
            id,
            endpoint,
            api_key,
            model,
            confidence,
            ..
        } => Arc::new(ExternalSource::new(
            id.clone(),
            endpoint.clone(),
            api_key.clone(),
            model.clone(),
            *confidence,
        )?),
    };

    Ok(source)
}

/// Create every enabled source, preserving configuration order
pub fn create_sources(entries: &[SourceEntry]) -> Result<Vec<Arc<dyn AnswerSource>>> {
    entries
        .iter()
        .filter(|entry| {
            if !entry.is_enabled() {
                tracing::debug!(source = %entry.id(), "Skipping disabled source");
            }
            entry.is_enabled()
        })
        .map(|entry| {
            create_source(entry)
                .with_context(|| format!("Failed to create source '{}'", entry.id()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<SourceEntry> {
        vec![
            SourceEntry::LocalModel {
                id: "tuned".to_string(),
                endpoint: "http://127.0.0.1:8001".to_string(),
                model: None,
                confidence: 0.75,
                enabled: true,
            },
            SourceEntry::Retrieval {
                id: "rag".to_string(),
                endpoint: "http://127.0.0.1:3000".to_string(),
                confidence: 0.8,
                enabled: false,
            },
            SourceEntry::External {
                id: "openai".to_string(),
                endpoint: "https://api.openai.com".to_string(),
                api_key: "sk".to_string(),
                model: "gpt-4o".to_string(),
                confidence: 0.85,
                enabled: true,
            },
        ]
    }

    #[test]
    fn test_create_sources_skips_disabled_and_keeps_order() {
        let sources = create_sources(&entries()).unwrap();
        let ids: Vec<&str> = sources.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["tuned", "openai"]);
        assert_eq!(sources[0].kind(), "local_model");
        assert_eq!(sources[1].kind(), "external");
    }
}
