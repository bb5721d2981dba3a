// Synthesis result types

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The single answer returned to the caller for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedAnswer {
    pub query: String,
    pub final_text: String,
    /// Quality estimate in [0, 1]; 0.0 for the insufficient-information answer
    pub confidence: f64,
    pub reasoning: String,
    /// Provenance: ids of the sources the answer was built from
    pub sources_used: BTreeSet<String>,
}

impl SynthesizedAnswer {
    pub fn is_insufficient(&self) -> bool {
        self.sources_used.is_empty() && self.confidence == 0.0
    }
}

/// Raw output of a merge strategy, before validation against the candidates
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    pub final_text: String,
    pub confidence: f64,
    pub reasoning: String,
    pub sources_used: Vec<String>,
}
