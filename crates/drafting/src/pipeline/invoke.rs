//! A single stage call against the generation backend.

use crate::pipeline::error::StageFailure;
use crate::pipeline::settings::PipelineSettings;
use crate::pipeline::stage::StageName;
use casedraft_core::message::Message;
use casedraft_core::provider::{Provider, ProviderRequest, Usage};
use std::time::Instant;
use tracing::debug;

pub(crate) struct StageCall {
    pub output: String,
    pub usage: Option<Usage>,
}

/// Send `messages` for `stage` and return the generated text.
///
/// Expiry of the stage deadline and a whitespace-only response both count
/// as stage failures. Returns elapsed milliseconds alongside the outcome.
pub(crate) async fn invoke_stage(
    provider: &dyn Provider,
    settings: &PipelineSettings,
    stage: StageName,
    messages: Vec<Message>,
) -> (Result<StageCall, StageFailure>, u64) {
    let request = ProviderRequest::new(&settings.model, messages)
        .with_temperature(settings.temperature(stage))
        .with_max_tokens(settings.max_output_tokens);

    debug!(stage = %stage, model = %settings.model, "Calling generation backend");
    let started = Instant::now();

    let outcome = match settings.stage_timeout {
        Some(limit) => match tokio::time::timeout(limit, provider.complete(request)).await {
            Ok(result) => result.map_err(StageFailure::from),
            Err(_) => Err(StageFailure::Timeout(limit)),
        },
        None => provider.complete(request).await.map_err(StageFailure::from),
    };

    let elapsed_ms = started.elapsed().as_millis() as u64;
    let result = outcome.and_then(|response| {
        if response.message.content.trim().is_empty() {
            Err(StageFailure::EmptyOutput)
        } else {
            Ok(StageCall {
                output: response.message.content,
                usage: response.usage,
            })
        }
    });
    (result, elapsed_ms)
}
