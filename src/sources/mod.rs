// Answer sources
//
// Every source (fine-tuned local model, retrieval, chain-of-thought reasoning,
// external provider) implements one trait, so the collector and synthesizer
// never special-case a particular kind.

use async_trait::async_trait;
use std::time::Duration;

use crate::errors::SourceError;

pub mod completion;
pub mod external;
pub mod factory;
pub mod local;
pub mod reasoning;
pub mod retrieval;
pub mod types;

pub use completion::CompletionClient;
pub use external::ExternalSource;
pub use factory::{create_source, create_sources};
pub use local::LocalModelSource;
pub use reasoning::ReasoningSource;
pub use retrieval::RetrievalSource;
pub use types::{AnswerCandidate, SourceAnswer};

/// Trait for answer sources
///
/// A source is an opaque `query -> (text, confidence)` function that may fail
/// or time out. The `timeout` is advisory; the collector enforces it as well.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    /// Stable identifier used in provenance (`sources_used`)
    fn id(&self) -> &str;

    /// Source family name for logs and health reports
    fn kind(&self) -> &'static str {
        "custom"
    }

    /// Answer one query
    async fn answer(&self, query: &str, timeout: Duration) -> Result<SourceAnswer, SourceError>;
}
