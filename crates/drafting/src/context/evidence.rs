//! Evidence types handed to the assembler by upstream collaborators.
//!
//! Source documents come from the extraction pipeline; reference and
//! precedent hits come from the retrieval service and are consumed as given.

use serde::{Deserialize, Serialize};

/// One raw source item with its extracted structured fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Human-readable label (filename, exhibit number, ...).
    pub title: String,
    #[serde(default)]
    pub key_dates: Vec<String>,
    #[serde(default)]
    pub amounts: Vec<String>,
    #[serde(default)]
    pub reference_ids: Vec<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    /// Full extracted text; may be arbitrarily large.
    #[serde(default)]
    pub raw_text: String,
}

impl SourceDocument {
    pub fn new(title: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            raw_text: raw_text.into(),
            ..Self::default()
        }
    }
}

/// A retrieved reference passage (statute, guidance, internal policy).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceHit {
    pub title: String,
    #[serde(default)]
    pub category: String,
    pub content: String,
    /// Higher is more relevant. Not assumed to be normalised.
    pub relevance_score: f32,
}

/// A retrieved precedent case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecedentHit {
    pub title: String,
    #[serde(default)]
    pub category: String,
    /// Case summary or body text.
    pub content: String,
    #[serde(default)]
    pub outcome: Option<String>,
    pub relevance_score: f32,
}

/// Everything retrieved or extracted for one drafting request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default)]
    pub sources: Vec<SourceDocument>,
    #[serde(default)]
    pub references: Vec<ReferenceHit>,
    #[serde(default)]
    pub precedents: Vec<PrecedentHit>,
}

impl Evidence {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.references.is_empty() && self.precedents.is_empty()
    }
}
