//! `/v1` API.
//!
//! Endpoints:
//! - `POST /v1/drafts`: Generate a draft (class `generation`)
//! - `POST /v1/drafts/stream`: Same, as Server-Sent Events
//! - `POST /v1/context/preview`: Assemble context only (class `analysis`)
//! - `GET  /v1/budget`: Active budget and selection limits

use crate::SharedState;
use crate::middleware::{ApiError, admit};
use axum::{
    Extension, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
    response::sse::{Event as SseEvent, Sse},
    routing::{get, post},
};
use casedraft_admission::{AdmissionError, CallerIdentity, OperationClass};
use casedraft_drafting::{
    AssemblyLimits, ContextStats, DraftOutcome, DraftRequest, Evidence, PipelineError,
    PipelineRun, ProgressEvent, ProgressFn, StageName, TokenBudget,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{error, info};

pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/drafts", post(create_draft))
        .route("/drafts/stream", post(stream_draft))
        .route("/context/preview", post(preview_context))
        .route("/budget", get(budget_handler))
        .with_state(state)
}

// --- Request / response types ---

#[derive(Debug, Deserialize)]
pub struct DraftBody {
    #[serde(flatten)]
    pub request: DraftRequest,
    #[serde(default)]
    pub evidence: Evidence,
}

#[derive(Debug, Serialize)]
pub struct DraftResponse {
    pub artifact: String,
    pub run: PipelineRun,
    pub context: ContextStats,
}

impl From<DraftOutcome> for DraftResponse {
    fn from(outcome: DraftOutcome) -> Self {
        Self {
            artifact: outcome.artifact().to_string(),
            run: outcome.run,
            context: outcome.context,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<StageName>,
    /// Partial run, with outputs of the stages that finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run: Option<PipelineRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_at: Option<DateTime<Utc>>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            failed_stage: None,
            run: None,
            reset_at: None,
        }
    }

    pub fn rate_limited(err: &AdmissionError) -> Self {
        let AdmissionError::QuotaExceeded { reset_at, .. } = err;
        Self {
            reset_at: Some(*reset_at),
            ..Self::new(err.to_string())
        }
    }

    pub fn stage_failed(err: PipelineError) -> Self {
        let error = err.to_string();
        let failed_stage = Some(err.stage());
        Self {
            error,
            failed_stage,
            run: Some(err.into_run()),
            reset_at: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub context: ContextStats,
    pub body: String,
}

#[derive(Debug, Serialize)]
pub struct BudgetResponse {
    pub budget: TokenBudget,
    pub prompt_capacity: usize,
    pub limits: AssemblyLimits,
    pub staged_by_default: bool,
}

// --- Handlers ---

async fn create_draft(
    State(state): State<SharedState>,
    Extension(identity): Extension<CallerIdentity>,
    Json(body): Json<DraftBody>,
) -> Result<(HeaderMap, Json<DraftResponse>), ApiError> {
    let headers = admit(&state.gate, &identity, OperationClass::Generation).await?;
    info!(
        caller = %identity,
        case = %body.request.case_reference,
        sources = body.evidence.sources.len(),
        "v1/drafts request"
    );

    match state.drafts.draft(&body.request, &body.evidence, None).await {
        Ok(outcome) => Ok((headers, Json(outcome.into()))),
        Err(e) => {
            error!(caller = %identity, error = %e, "Draft failed");
            Err((
                StatusCode::BAD_GATEWAY,
                headers,
                Json(ErrorResponse::stage_failed(e)),
            ))
        }
    }
}

/// Progress events as they happen, then one `complete` or `failed` event.
async fn stream_draft(
    State(state): State<SharedState>,
    Extension(identity): Extension<CallerIdentity>,
    Json(body): Json<DraftBody>,
) -> Result<
    (
        HeaderMap,
        Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>,
    ),
    ApiError,
> {
    let headers = admit(&state.gate, &identity, OperationClass::Generation).await?;
    info!(
        caller = %identity,
        case = %body.request.case_reference,
        "v1/drafts/stream SSE request"
    );

    let (tx, rx) = tokio::sync::mpsc::unbounded_channel::<SseEvent>();
    let drafts = state.drafts.clone();
    tokio::spawn(async move {
        let progress_tx = tx.clone();
        let on_progress = move |event: &ProgressEvent| {
            // The client may have gone away; the run still finishes.
            let _ = progress_tx.send(sse_event("progress", event));
        };
        let progress: &ProgressFn = &on_progress;

        let last = match drafts
            .draft(&body.request, &body.evidence, Some(progress))
            .await
        {
            Ok(outcome) => sse_event("complete", &DraftResponse::from(outcome)),
            Err(e) => {
                error!(error = %e, "Streamed draft failed");
                sse_event("failed", &ErrorResponse::stage_failed(e))
            }
        };
        let _ = tx.send(last);
    });

    let stream = UnboundedReceiverStream::new(rx).map(Ok::<_, Infallible>);
    Ok((headers, Sse::new(stream)))
}

async fn preview_context(
    State(state): State<SharedState>,
    Extension(identity): Extension<CallerIdentity>,
    Json(evidence): Json<Evidence>,
) -> Result<(HeaderMap, Json<PreviewResponse>), ApiError> {
    let headers = admit(&state.gate, &identity, OperationClass::Analysis).await?;
    let assembled = state.drafts.preview(&evidence);
    info!(
        caller = %identity,
        estimated_tokens = assembled.estimated_tokens,
        backstop = assembled.backstop_applied,
        "v1/context/preview"
    );
    Ok((
        headers,
        Json(PreviewResponse {
            context: assembled.stats(),
            body: assembled.body,
        }),
    ))
}

async fn budget_handler(State(state): State<SharedState>) -> Json<BudgetResponse> {
    let budget = state.drafts.budget().clone();
    Json(BudgetResponse {
        prompt_capacity: budget.prompt_capacity(),
        budget,
        limits: *state.drafts.limits(),
        staged_by_default: state.drafts.staged_by_default(),
    })
}

fn sse_event<T: Serialize>(name: &str, payload: &T) -> SseEvent {
    let data = serde_json::to_string(payload)
        .unwrap_or_else(|e| serde_json::json!({ "error": e.to_string() }).to_string());
    SseEvent::default().event(name).data(data)
}
