//! HTTP API gateway for CaseDraft.
//!
//! Exposes a health check and the v1 API for draft generation, streaming
//! progress, context preview and budget inspection.
//!
//! Built on Axum for high performance async HTTP.

pub mod api;
pub mod middleware;

use axum::extract::DefaultBodyLimit;
use axum::{Router, http::StatusCode, response::Json, routing::get};
use casedraft_admission::{AdmissionGate, OperationClass};
use casedraft_config::{ApiTokenConfig, AppConfig};
use casedraft_drafting::DraftService;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

/// How often expired counter rows are purged.
const PURGE_INTERVAL: Duration = Duration::from_secs(300);

/// Shared application state for the gateway.
pub struct GatewayState {
    pub drafts: Arc<DraftService>,
    pub gate: Arc<AdmissionGate>,
    /// Bearer token → caller id.
    tokens: HashMap<String, String>,
    body_limit_bytes: usize,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(drafts: DraftService, gate: AdmissionGate) -> Self {
        Self {
            drafts: Arc::new(drafts),
            gate: Arc::new(gate),
            tokens: HashMap::new(),
            body_limit_bytes: casedraft_config::GatewayConfig::default().body_limit_bytes,
        }
    }

    pub fn with_tokens(mut self, tokens: &[ApiTokenConfig]) -> Self {
        self.tokens = tokens
            .iter()
            .map(|t| (t.token.clone(), t.caller_id.clone()))
            .collect();
        self
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit_bytes = bytes;
        self
    }

    /// Caller id bound to `token`, if it is a configured token.
    pub fn caller_for(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }
}

/// Build the full router.
///
/// Layers applied to `/v1`:
/// - Bearer token authentication (unknown token or other scheme → 401, none → anonymous)
/// - General admission (`api` or `anonymous` class)
///
/// `/health` sits outside both. Everything gets a body limit, CORS and
/// request tracing.
pub fn build_router(state: SharedState) -> Router {
    let v1 = api::v1_router(state.clone())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admit_request,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ));

    // No origins configured: cross-origin browser calls are refused.
    let cors = CorsLayer::new()
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(state.body_limit_bytes))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = casedraft_providers::build_from_config(&config)?;
    let drafts = DraftService::from_config(provider, &config)?;
    let store = casedraft_admission::store_from_config(&config).await?;
    let gate = AdmissionGate::from_config(store, &config.rate_limits);

    if config.gateway.api_tokens.is_empty() {
        warn!("No API tokens configured, every /v1 caller is anonymous");
    }

    let state: SharedState = Arc::new(
        GatewayState::new(drafts, gate)
            .with_tokens(&config.gateway.api_tokens)
            .with_body_limit(config.gateway.body_limit_bytes),
    );
    spawn_purge_task(state.gate.clone());

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        address = %addr,
        rate_limits = config.rate_limits.enabled,
        counter_store = ?config.rate_limits.backend,
        "Gateway listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

/// Periodically drop counter entries older than the longest quota window.
fn spawn_purge_task(gate: Arc<AdmissionGate>) -> tokio::task::JoinHandle<()> {
    let max_window = OperationClass::ALL
        .iter()
        .map(|c| gate.quotas().get(*c).window)
        .max()
        .unwrap_or(PURGE_INTERVAL);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            match gate.store().purge(chrono::Utc::now(), max_window).await {
                Ok(removed) => debug!(removed, "Purged expired rate-limit entries"),
                Err(e) => warn!(error = %e, "Rate-limit purge failed"),
            }
        }
    })
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::{RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET};
    use axum::body::Body;
    use axum::http::{Request, header};
    use casedraft_admission::{InMemoryCounterStore, Quota, QuotaTable};
    use casedraft_core::error::ProviderError;
    use casedraft_core::message::Message;
    use casedraft_core::provider::{Provider, ProviderRequest, ProviderResponse};
    use casedraft_drafting::{AssemblyLimits, PipelineSettings, TokenBudget};
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Plays back replies in order; `Err` entries fail the call.
    struct Scripted {
        replies: Mutex<Vec<Result<String, ProviderError>>>,
        calls: Mutex<usize>,
    }

    impl Scripted {
        fn new(mut replies: Vec<Result<String, ProviderError>>) -> Arc<Self> {
            replies.reverse();
            Arc::new(Self {
                replies: Mutex::new(replies),
                calls: Mutex::new(0),
            })
        }

        fn texts(texts: &[&str]) -> Arc<Self> {
            Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait::async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> Result<ProviderResponse, ProviderError> {
            *self.calls.lock().unwrap() += 1;
            let reply = self.replies.lock().unwrap().pop().expect("unscripted call");
            reply.map(|text| ProviderResponse {
                message: Message::assistant(text),
                usage: None,
                model: "mock".into(),
            })
        }
    }

    fn app_with(provider: Arc<Scripted>, quotas: QuotaTable) -> Router {
        let drafts = DraftService::new(
            provider,
            TokenBudget::default(),
            AssemblyLimits::default(),
            PipelineSettings::new("mock"),
            true,
        );
        let gate = AdmissionGate::new(Arc::new(InMemoryCounterStore::new()), quotas);
        let state = GatewayState::new(drafts, gate).with_tokens(&[ApiTokenConfig {
            token: "tok-1".into(),
            caller_id: "acct-7".into(),
        }]);
        build_router(Arc::new(state))
    }

    fn app(provider: Arc<Scripted>) -> Router {
        app_with(provider, QuotaTable::default())
    }

    fn hour(limit: u32) -> Quota {
        Quota::new(limit, Duration::from_secs(3_600))
    }

    const DRAFT_BODY: &str = r#"{
        "case_reference": "2024-117",
        "department": "individual tax",
        "firm": {
            "practice_name": "Acme Tax",
            "billing_rate": "$250/hour",
            "preparer_name": "Jordan Lee",
            "preparer_title": "CPA"
        },
        "evidence": {
            "sources": [{"title": "Notice CP2000", "raw_text": "Proposed adjustment of $4,210."}]
        }
    }"#;

    fn post(uri: &str, token: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get_from(uri: &str, addr: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header("x-forwarded-for", addr)
            .body(Body::empty())
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_exempt_from_rate_limiting() {
        let quotas = QuotaTable::default().with(OperationClass::Anonymous, hour(1));
        let app = app_with(Scripted::texts(&[]), quotas);

        for _ in 0..3 {
            let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
            let response = app.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert!(response.headers().get(&RATE_LIMIT_LIMIT).is_none());
        }
    }

    #[tokio::test]
    async fn unknown_token_is_unauthorized() {
        let provider = Scripted::texts(&[]);
        let app = app(provider.clone());
        let response = app
            .oneshot(post("/v1/drafts", Some("nope"), DRAFT_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_unauthorized() {
        let provider = Scripted::texts(&[]);
        let app = app(provider.clone());
        for value in ["Basic tok-1", "tok-1"] {
            let req = Request::builder()
                .uri("/v1/budget")
                .header(header::AUTHORIZATION, value)
                .body(Body::empty())
                .unwrap();
            let response = app.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{value}");
            let json = json_body(response).await;
            assert_eq!(json["error"], "authorization must use the Bearer scheme");
        }
    }

    #[tokio::test]
    async fn lowercase_bearer_scheme_is_accepted() {
        let app = app(Scripted::texts(&[]));
        let req = Request::builder()
            .uri("/v1/budget")
            .header(header::AUTHORIZATION, "bearer tok-1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&RATE_LIMIT_LIMIT], "60");
    }

    #[tokio::test]
    async fn draft_returns_artifact_and_generation_headers() {
        let provider = Scripted::texts(&["FACTS", "**Summary**\nDRAFT", "**Summary**\nFINAL"]);
        let quotas = QuotaTable::default().with(OperationClass::Generation, hour(5));
        let app = app_with(provider.clone(), quotas);

        let response = app
            .oneshot(post("/v1/drafts", Some("tok-1"), DRAFT_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[&RATE_LIMIT_LIMIT], "5");
        assert_eq!(response.headers()[&RATE_LIMIT_REMAINING], "4");
        assert!(response.headers().get(&RATE_LIMIT_RESET).is_some());

        let json = json_body(response).await;
        assert_eq!(json["artifact"], "**Summary**\nFINAL");
        assert_eq!(json["run"]["stages"].as_array().unwrap().len(), 3);
        assert_eq!(json["run"]["status"], "succeeded");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn generation_quota_rejects_before_any_backend_call() {
        let provider = Scripted::texts(&["F", "D", "T"]);
        let quotas = QuotaTable::default().with(OperationClass::Generation, hour(1));
        let app = app_with(provider.clone(), quotas);

        let first = app
            .clone()
            .oneshot(post("/v1/drafts", Some("tok-1"), DRAFT_BODY))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(post("/v1/drafts", Some("tok-1"), DRAFT_BODY))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(second.headers()[&RATE_LIMIT_REMAINING], "0");
        let retry: u64 = second.headers()[header::RETRY_AFTER]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        assert!((1..=3_600).contains(&retry));

        let json = json_body(second).await;
        let error = json["error"].as_str().unwrap();
        assert!(error.starts_with("rate limit exceeded for generation; try again after "));
        assert!(json["reset_at"].is_string());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn stage_failure_is_bad_gateway_with_partial_outputs() {
        let provider = Scripted::new(vec![
            Ok("FACT SHEET".into()),
            Err(ProviderError::Network("connection reset".into())),
        ]);
        let app = app(provider);

        let response = app
            .oneshot(post("/v1/drafts", Some("tok-1"), DRAFT_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let json = json_body(response).await;
        assert_eq!(json["failed_stage"], "structuring");
        assert_eq!(
            json["error"],
            "could not complete step 2 of 3 (structuring): Network error: connection reset"
        );
        assert_eq!(json["run"]["stages"][0]["output"], "FACT SHEET");
        assert!(json["run"]["artifact"].is_null());
    }

    #[tokio::test]
    async fn direct_override_makes_one_call() {
        let provider = Scripted::texts(&["ONE PASS"]);
        let app = app(provider.clone());
        let body = DRAFT_BODY.replacen('{', r#"{"staged": false,"#, 1);

        let response = app
            .oneshot(post("/v1/drafts", Some("tok-1"), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["artifact"], "ONE PASS");
        assert_eq!(json["run"]["mode"], "direct");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn anonymous_callers_are_limited_per_address() {
        let quotas = QuotaTable::default().with(OperationClass::Anonymous, hour(1));
        let app = app_with(Scripted::texts(&[]), quotas);

        let first = app.clone().oneshot(get_from("/v1/budget", "203.0.113.9")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let json = json_body(first).await;
        assert_eq!(json["budget"]["total"], 150_000);
        assert_eq!(json["prompt_capacity"], 140_000);

        let second = app.clone().oneshot(get_from("/v1/budget", "203.0.113.9")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = json_body(second).await;
        assert!(
            json["error"]
                .as_str()
                .unwrap()
                .starts_with("rate limit exceeded for anonymous")
        );

        let other = app.oneshot(get_from("/v1/budget", "198.51.100.4")).await.unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn preview_assembles_without_generating() {
        let provider = Scripted::texts(&[]);
        let app = app(provider.clone());
        let evidence = r#"{"sources": [{"title": "Notice CP2000", "raw_text": "Balance due."}]}"#;

        let response = app
            .oneshot(post("/v1/context/preview", Some("tok-1"), evidence))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert!(json["body"].as_str().unwrap().contains("### Notice CP2000"));
        assert_eq!(json["context"]["backstop_applied"], false);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn stream_emits_progress_then_complete() {
        let provider = Scripted::texts(&["FACTS", "DRAFT", "FINAL"]);
        let app = app(provider);

        let response = app
            .oneshot(post("/v1/drafts/stream", Some("tok-1"), DRAFT_BODY))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        assert_eq!(text.matches("event: progress").count(), 3);
        assert_eq!(text.matches("event: complete").count(), 1);
        assert!(!text.contains("event: failed"));
        let complete = text.find("event: complete").unwrap();
        assert!(text.rfind("event: progress").unwrap() < complete);
        assert!(text.contains(r#""percent":100"#));
    }

    #[tokio::test]
    async fn stream_reports_failure_as_final_event() {
        let provider = Scripted::new(vec![Err(ProviderError::Timeout("30s".into()))]);
        let app = app(provider);

        let response = app
            .oneshot(post("/v1/drafts/stream", Some("tok-1"), DRAFT_BODY))
            .await
            .unwrap();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();

        assert_eq!(text.matches("event: progress").count(), 0);
        assert_eq!(text.matches("event: failed").count(), 1);
        assert!(text.contains(r#""failed_stage":"fact_extraction""#));
    }
}
