//! Per-request drafting details.

use serde::{Deserialize, Serialize};

/// Identity of the firm the document is written for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FirmProfile {
    pub practice_name: String,
    /// Free-form, e.g. "$250/hour".
    #[serde(default)]
    pub billing_rate: String,
    pub preparer_name: String,
    #[serde(default)]
    pub preparer_title: String,
}

impl FirmProfile {
    /// "Jane Doe, CPA" or just the name when no title is set.
    pub fn signature(&self) -> String {
        if self.preparer_title.trim().is_empty() {
            self.preparer_name.clone()
        } else {
            format!("{}, {}", self.preparer_name, self.preparer_title)
        }
    }
}

/// Everything the pipeline needs besides the assembled context.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DraftRequest {
    pub case_reference: String,
    #[serde(default)]
    pub department: String,
    pub firm: FirmProfile,
    /// Overrides the configured pipeline choice for this request.
    #[serde(default)]
    pub staged: Option<bool>,
}
