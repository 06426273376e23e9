//! Three-stage drafting pipeline.
//!
//! # Flow
//!
//! 1. **Fact extraction**: assembled context + case reference + department
//!    → fact sheet
//! 2. **Structuring**: fact sheet + firm identity → draft with bold section
//!    markers
//! 3. **Tone finishing**: draft + preparer identity → final artifact, every
//!    marker preserved verbatim
//!
//! Each stage is one backend call and consumes only the previous stage's
//! output. The first failure ends the run; there is no retry.

use crate::context::AssembledContext;
use crate::pipeline::error::{PipelineError, StageFailure};
use crate::pipeline::invoke::invoke_stage;
use crate::pipeline::markers;
use crate::pipeline::progress::{ProgressEvent, ProgressFn};
use crate::pipeline::prompts;
use crate::pipeline::request::DraftRequest;
use crate::pipeline::run::{PipelineMode, PipelineRun};
use crate::pipeline::settings::PipelineSettings;
use crate::pipeline::stage::{PipelineState, StageName};
use casedraft_config::MarkerPolicy;
use casedraft_core::message::Message;
use casedraft_core::provider::Provider;
use std::sync::Arc;
use tracing::{error, info, warn};

pub struct StagedPipeline {
    provider: Arc<dyn Provider>,
    settings: PipelineSettings,
}

impl StagedPipeline {
    pub fn new(provider: Arc<dyn Provider>, settings: PipelineSettings) -> Self {
        Self { provider, settings }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run all three stages in order.
    ///
    /// `progress` is called after each successful stage at 33, 66 and 100.
    /// On failure the returned error names the stage and holds the partial
    /// run.
    pub async fn run(
        &self,
        context: &AssembledContext,
        request: &DraftRequest,
        progress: Option<&ProgressFn>,
    ) -> Result<PipelineRun, PipelineError> {
        let mut run = PipelineRun::new(PipelineMode::Staged);
        info!(
            run_id = %run.id,
            case = %request.case_reference,
            context_tokens = context.estimated_tokens,
            "Staged pipeline started"
        );

        let mut previous = String::new();
        for stage in StageName::ORDER {
            run.advance(PipelineState::running(stage));
            let messages = self.messages_for(stage, context, request, &previous);

            let (outcome, elapsed_ms) =
                invoke_stage(self.provider.as_ref(), &self.settings, stage, messages).await;
            let outcome = outcome.and_then(|call| {
                if stage == StageName::ToneFinishing {
                    self.check_markers(&run, &previous, &call.output)?;
                }
                Ok(call)
            });

            match outcome {
                Ok(call) => {
                    info!(run_id = %run.id, stage = %stage, elapsed_ms, "Stage complete");
                    previous = call.output.clone();
                    run.record_success(stage, call.output, call.usage, elapsed_ms);
                    if let Some(notify) = progress {
                        notify(&ProgressEvent::completed(stage));
                    }
                }
                Err(reason) => {
                    error!(run_id = %run.id, stage = %stage, error = %reason, "Stage failed");
                    run.record_failure(stage, reason.to_string(), elapsed_ms);
                    return Err(PipelineError::stage_failed(stage, reason, run));
                }
            }
        }

        run.complete(previous);
        let usage = run.total_usage();
        info!(
            run_id = %run.id,
            total_tokens = usage.total_tokens,
            elapsed_ms = run.elapsed_ms().unwrap_or_default(),
            "Staged pipeline complete"
        );
        Ok(run)
    }

    fn messages_for(
        &self,
        stage: StageName,
        context: &AssembledContext,
        request: &DraftRequest,
        previous: &str,
    ) -> Vec<Message> {
        match stage {
            StageName::FactExtraction => prompts::fact_extraction(context, request),
            StageName::Structuring => {
                prompts::structuring(previous, &request.firm, context.prompt_capacity)
            }
            StageName::ToneFinishing => {
                prompts::tone_finishing(previous, &request.firm, context.prompt_capacity)
            }
            StageName::SinglePass => prompts::single_pass(context, request),
        }
    }

    fn check_markers(
        &self,
        run: &PipelineRun,
        structured: &str,
        finished: &str,
    ) -> Result<(), StageFailure> {
        let lost = markers::missing(structured, finished);
        if lost.is_empty() {
            return Ok(());
        }
        match self.settings.marker_policy {
            MarkerPolicy::Enforce => Err(StageFailure::MarkersLost(lost)),
            MarkerPolicy::Warn => {
                warn!(run_id = %run.id, missing = ?lost, "Tone finishing dropped structural markers");
                Ok(())
            }
        }
    }
}
