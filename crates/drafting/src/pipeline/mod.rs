//! Generation pipelines.
//!
//! The staged pipeline drives fact extraction, structuring and tone
//! finishing in strict order and reports progress at fixed checkpoints.
//! The direct pipeline issues a single call.

pub mod direct;
pub mod error;
mod invoke;
pub mod markers;
pub mod progress;
pub mod prompts;
pub mod request;
pub mod run;
pub mod settings;
pub mod stage;
pub mod staged;

pub use direct::DirectPipeline;
pub use error::{PipelineError, StageFailure};
pub use progress::{ProgressEvent, ProgressFn};
pub use request::{DraftRequest, FirmProfile};
pub use run::{PipelineMode, PipelineRun, RunStatus};
pub use settings::PipelineSettings;
pub use stage::{PipelineState, StageInput, StageName, StageResult, StageStatus};
pub use staged::StagedPipeline;

#[cfg(test)]
pub(crate) mod test_helpers;
