//! Pipeline errors.

use crate::pipeline::run::PipelineRun;
use crate::pipeline::stage::StageName;
use casedraft_core::error::ProviderError;
use std::time::Duration;
use thiserror::Error;

/// Why a single stage failed.
#[derive(Debug, Clone, Error)]
pub enum StageFailure {
    #[error("{0}")]
    Provider(#[from] ProviderError),

    #[error("no response within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("the generation backend returned an empty response")]
    EmptyOutput,

    #[error("structural markers were not preserved: {}", .0.join(", "))]
    MarkersLost(Vec<String>),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage failed; the run is terminal. Earlier outputs remain in `run`.
    #[error("could not complete step {step} of {total} ({stage}): {reason}")]
    StageFailed {
        stage: StageName,
        step: usize,
        total: usize,
        reason: StageFailure,
        run: Box<PipelineRun>,
    },
}

impl PipelineError {
    pub(crate) fn stage_failed(stage: StageName, reason: StageFailure, run: PipelineRun) -> Self {
        PipelineError::StageFailed {
            stage,
            step: stage.step(),
            total: stage.total_steps(),
            reason,
            run: Box::new(run),
        }
    }

    pub fn stage(&self) -> StageName {
        match self {
            PipelineError::StageFailed { stage, .. } => *stage,
        }
    }

    /// The partial run, with outputs of stages that finished.
    pub fn run(&self) -> &PipelineRun {
        match self {
            PipelineError::StageFailed { run, .. } => run,
        }
    }

    pub fn into_run(self) -> PipelineRun {
        match self {
            PipelineError::StageFailed { run, .. } => *run,
        }
    }
}
