//! Single-call drafting pipeline.
//!
//! Sends the assembled context and case details to the backend once. Kept
//! for deployments that opt out of staged generation.

use crate::context::AssembledContext;
use crate::pipeline::error::PipelineError;
use crate::pipeline::invoke::invoke_stage;
use crate::pipeline::progress::{ProgressEvent, ProgressFn};
use crate::pipeline::prompts;
use crate::pipeline::request::DraftRequest;
use crate::pipeline::run::{PipelineMode, PipelineRun};
use crate::pipeline::settings::PipelineSettings;
use crate::pipeline::stage::{PipelineState, StageName};
use casedraft_core::provider::Provider;
use std::sync::Arc;
use tracing::{error, info};

pub struct DirectPipeline {
    provider: Arc<dyn Provider>,
    settings: PipelineSettings,
}

impl DirectPipeline {
    pub fn new(provider: Arc<dyn Provider>, settings: PipelineSettings) -> Self {
        Self { provider, settings }
    }

    /// One backend call. `progress` receives a single 100 checkpoint.
    pub async fn run(
        &self,
        context: &AssembledContext,
        request: &DraftRequest,
        progress: Option<&ProgressFn>,
    ) -> Result<PipelineRun, PipelineError> {
        let stage = StageName::SinglePass;
        let mut run = PipelineRun::new(PipelineMode::Direct);
        info!(run_id = %run.id, case = %request.case_reference, "Direct pipeline started");

        run.advance(PipelineState::running(stage));
        let messages = prompts::single_pass(context, request);
        let (outcome, elapsed_ms) =
            invoke_stage(self.provider.as_ref(), &self.settings, stage, messages).await;

        match outcome {
            Ok(call) => {
                let artifact = call.output.clone();
                run.record_success(stage, call.output, call.usage, elapsed_ms);
                run.complete(artifact);
                if let Some(notify) = progress {
                    notify(&ProgressEvent::completed(stage));
                }
                info!(run_id = %run.id, elapsed_ms, "Direct pipeline complete");
                Ok(run)
            }
            Err(reason) => {
                error!(run_id = %run.id, error = %reason, "Direct generation failed");
                run.record_failure(stage, reason.to_string(), elapsed_ms);
                Err(PipelineError::stage_failed(stage, reason, run))
            }
        }
    }
}
