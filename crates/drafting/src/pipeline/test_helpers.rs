//! Shared test helpers for pipeline tests.

use crate::context::AssembledContext;
use crate::pipeline::progress::ProgressEvent;
use crate::pipeline::request::{DraftRequest, FirmProfile};
use casedraft_core::error::ProviderError;
use casedraft_core::message::Message;
use casedraft_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted backend reply.
pub enum Reply {
    Text(String),
    Fail(ProviderError),
    /// Sleep, then answer. Pair with a paused tokio clock.
    Slow(Duration, String),
}

/// A mock provider that plays back scripted replies in order and records
/// every request it receives.
///
/// Panics if more calls are made than replies provided.
pub struct ScriptedProvider {
    replies: Mutex<Vec<Reply>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(replies: Vec<Reply>) -> Self {
        let mut replies = replies;
        replies.reverse();
        Self {
            replies: Mutex::new(replies),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn texts(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|t| Reply::Text(t.to_string())).collect())
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| panic!("ScriptedProvider: no reply for call #{call}"));

        match reply {
            Reply::Text(text) => Ok(text_response(&text)),
            Reply::Fail(err) => Err(err),
            Reply::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(text_response(&text))
            }
        }
    }
}

pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: Some(Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        }),
        model: "mock-model".into(),
    }
}

pub fn request() -> DraftRequest {
    DraftRequest {
        case_reference: "2024-117".into(),
        department: "individual tax".into(),
        firm: FirmProfile {
            practice_name: "Acme Tax".into(),
            billing_rate: "$250/hour".into(),
            preparer_name: "Jordan Lee".into(),
            preparer_title: "CPA".into(),
        },
        staged: None,
    }
}

pub fn context(body: &str) -> AssembledContext {
    AssembledContext {
        sections: Vec::new(),
        body: body.into(),
        estimated_tokens: crate::context::token::estimate_tokens(body),
        budget_total: 150_000,
        prompt_capacity: 140_000,
        backstop_applied: false,
    }
}

/// Collects progress events for later assertions.
#[derive(Default, Clone)]
pub struct ProgressLog(Arc<Mutex<Vec<ProgressEvent>>>);

impl ProgressLog {
    pub fn callback(&self) -> impl Fn(&ProgressEvent) + Send + Sync + 'static {
        let log = self.0.clone();
        move |event: &ProgressEvent| log.lock().unwrap().push(event.clone())
    }

    pub fn percents(&self) -> Vec<u8> {
        self.0.lock().unwrap().iter().map(|e| e.percent).collect()
    }
}
