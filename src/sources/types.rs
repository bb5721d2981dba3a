// Answer types shared by sources, the collector and the synthesizer

use crate::errors::SourceError;
use serde::Serialize;
use std::time::Duration;

/// What a source hands back for one query
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAnswer {
    pub text: String,
    /// Self-reported quality estimate in [0, 1]
    pub confidence: f64,
}

impl SourceAnswer {
    /// Validate raw source output.
    ///
    /// Empty or whitespace-only text and NaN confidence are failures; any
    /// other confidence is clamped into [0, 1].
    pub fn validated(
        source_id: &str,
        text: impl Into<String>,
        confidence: f64,
    ) -> Result<Self, SourceError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(SourceError::EmptyAnswer {
                source_id: source_id.to_string(),
            });
        }
        if confidence.is_nan() {
            return Err(SourceError::InvalidConfidence {
                source_id: source_id.to_string(),
            });
        }
        Ok(Self {
            text: text.trim().to_string(),
            confidence: confidence.clamp(0.0, 1.0),
        })
    }
}

/// One source's contribution to one query
#[derive(Debug, Clone, Serialize)]
pub struct AnswerCandidate {
    pub source_id: String,
    pub text: String,
    pub confidence: f64,
    #[serde(with = "duration_millis")]
    pub latency: Duration,
    /// Set when the source failed; failed candidates never reach the synthesizer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnswerCandidate {
    pub fn new(source_id: impl Into<String>, answer: SourceAnswer, latency: Duration) -> Self {
        Self {
            source_id: source_id.into(),
            text: answer.text,
            confidence: answer.confidence,
            latency,
            error: None,
        }
    }

    pub fn failed(source_id: impl Into<String>, error: &SourceError, latency: Duration) -> Self {
        Self {
            source_id: source_id.into(),
            text: String::new(),
            confidence: 0.0,
            latency,
            error: Some(error.to_string()),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.error.is_none() && !self.text.trim().is_empty()
    }
}

pub(crate) mod duration_millis {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }
}
