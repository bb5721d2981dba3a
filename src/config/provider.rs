// Answer source entries — one per configured source.

use super::constants::{
    EXTERNAL_CONFIDENCE, LOCAL_MODEL_CONFIDENCE, REASONING_CONFIDENCE, RETRIEVAL_CONFIDENCE,
};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_local_confidence() -> f64 {
    LOCAL_MODEL_CONFIDENCE
}

fn default_retrieval_confidence() -> f64 {
    RETRIEVAL_CONFIDENCE
}

fn default_reasoning_confidence() -> f64 {
    REASONING_CONFIDENCE
}

fn default_external_confidence() -> f64 {
    EXTERNAL_CONFIDENCE
}

/// A single answer source entry.
///
/// Serializes with a `kind` tag, e.g.:
/// ```toml
/// [[sources]]
/// kind = "local_model"
/// id = "tuned"
/// endpoint = "http://127.0.0.1:8001"
///
/// [[sources]]
/// kind = "external"
/// id = "openai"
/// endpoint = "https://api.openai.com"
/// api_key = "sk-..."
/// model = "gpt-4o"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceEntry {
    LocalModel {
        id: String,
        endpoint: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default = "default_local_confidence")]
        confidence: f64,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    Retrieval {
        id: String,
        endpoint: String,
        #[serde(default = "default_retrieval_confidence")]
        confidence: f64,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    Reasoning {
        id: String,
        endpoint: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default = "default_reasoning_confidence")]
        confidence: f64,
        #[serde(default = "default_true")]
        enabled: bool,
    },
    External {
        id: String,
        endpoint: String,
        api_key: String,
        model: String,
        #[serde(default = "default_external_confidence")]
        confidence: f64,
        #[serde(default = "default_true")]
        enabled: bool,
    },
}

impl SourceEntry {
    /// Stable identifier used for provenance
    pub fn id(&self) -> &str {
        match self {
            Self::LocalModel { id, .. }
            | Self::Retrieval { id, .. }
            | Self::Reasoning { id, .. }
            | Self::External { id, .. } => id,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::LocalModel { enabled, .. }
            | Self::Retrieval { enabled, .. }
            | Self::Reasoning { enabled, .. }
            | Self::External { enabled, .. } => *enabled,
        }
    }

    /// Self-reported confidence this source attaches to its answers
    pub fn confidence(&self) -> f64 {
        match self {
            Self::LocalModel { confidence, .. }
            | Self::Retrieval { confidence, .. }
            | Self::Reasoning { confidence, .. }
            | Self::External { confidence, .. } => *confidence,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::LocalModel { .. } => "local_model",
            Self::Retrieval { .. } => "retrieval",
            Self::Reasoning { .. } => "reasoning",
            Self::External { .. } => "external",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Wrapper {
        sources: Vec<SourceEntry>,
    }

    #[test]
    fn test_source_entries_parse_with_defaults() {
        let toml = r#"
            [[sources]]
            kind = "local_model"
            id = "tuned"
            endpoint = "http://127.0.0.1:8001"

            [[sources]]
            kind = "retrieval"
            id = "rag"
            endpoint = "http://127.0.0.1:3000"
            enabled = false

            [[sources]]
            kind = "external"
            id = "openai"
            endpoint = "https://api.openai.com"
            api_key = "sk-test"
            model = "gpt-4o"
            confidence = 0.9
        "#;

        let parsed: Wrapper = toml::from_str(toml).unwrap();
        assert_eq!(parsed.sources.len(), 3);
        assert_eq!(parsed.sources[0].id(), "tuned");
        assert_eq!(parsed.sources[0].confidence(), LOCAL_MODEL_CONFIDENCE);
        assert!(parsed.sources[0].is_enabled());
        assert!(!parsed.sources[1].is_enabled());
        assert_eq!(parsed.sources[2].confidence(), 0.9);
        assert_eq!(parsed.sources[2].kind_name(), "external");
    }
}
