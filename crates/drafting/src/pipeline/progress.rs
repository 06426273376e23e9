//! Progress notifications emitted after each successful stage.

use crate::pipeline::stage::StageName;
use serde::{Deserialize, Serialize};

/// Sent once per successful stage, at a fixed checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: StageName,
    /// 0–100.
    pub percent: u8,
    pub message: String,
}

impl ProgressEvent {
    pub fn completed(stage: StageName) -> Self {
        Self {
            stage,
            percent: stage.checkpoint(),
            message: stage.completion_message().to_string(),
        }
    }
}

/// Synchronous progress callback. Called on the pipeline's task.
pub type ProgressFn = dyn Fn(&ProgressEvent) + Send + Sync;
