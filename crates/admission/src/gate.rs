//! Admission gate: quota checks in front of every expensive operation.
//!
//! The gate never blocks on its own failures: when the counter store is
//! unreachable the request is let through and the outage is logged.

use crate::class::{OperationClass, QuotaTable};
use crate::identity::CallerIdentity;
use crate::store::CounterStore;
use casedraft_config::RateLimitConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Quota position reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// When the oldest hit in the window expires.
    pub reset_at: DateTime<Utc>,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionDecision {
    Allowed(RateLimitStatus),
    Rejected(RateLimitStatus),
    /// The counter store failed; the request is let through unmetered.
    Degraded { status: RateLimitStatus, reason: String },
}

impl AdmissionDecision {
    pub fn status(&self) -> &RateLimitStatus {
        match self {
            AdmissionDecision::Allowed(s) | AdmissionDecision::Rejected(s) => s,
            AdmissionDecision::Degraded { status, .. } => status,
        }
    }

    pub fn is_allowed(&self) -> bool {
        !matches!(self, AdmissionDecision::Rejected(_))
    }

    /// `Err` only for a rejection.
    pub fn into_result(self, class: OperationClass) -> Result<RateLimitStatus, AdmissionError> {
        match self {
            AdmissionDecision::Rejected(status) => Err(AdmissionError::QuotaExceeded {
                class,
                limit: status.limit,
                reset_at: status.reset_at,
            }),
            other => Ok(*other.status()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    #[error(
        "rate limit exceeded for {class}; try again after {}",
        .reset_at.to_rfc3339_opts(SecondsFormat::Secs, true)
    )]
    QuotaExceeded {
        class: OperationClass,
        limit: u32,
        reset_at: DateTime<Utc>,
    },
}

impl AdmissionError {
    /// Whole seconds until the caller may retry, at least 1.
    pub fn retry_after_secs(&self, now: DateTime<Utc>) -> u64 {
        match self {
            AdmissionError::QuotaExceeded { reset_at, .. } => {
                let ms = (*reset_at - now).num_milliseconds().max(0) as u64;
                ms.div_ceil(1_000).max(1)
            }
        }
    }
}

/// Checks `(identity, class)` against its quota in a shared counter store.
pub struct AdmissionGate {
    store: Arc<dyn CounterStore>,
    quotas: QuotaTable,
    enabled: bool,
}

impl AdmissionGate {
    pub fn new(store: Arc<dyn CounterStore>, quotas: QuotaTable) -> Self {
        Self {
            store,
            quotas,
            enabled: true,
        }
    }

    pub fn from_config(store: Arc<dyn CounterStore>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            quotas: QuotaTable::from_config(config),
            enabled: config.enabled,
        }
    }

    pub fn quotas(&self) -> &QuotaTable {
        &self.quotas
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// Check and record one request now.
    pub async fn check(&self, identity: &CallerIdentity, class: OperationClass) -> AdmissionDecision {
        self.check_at(identity, class, Utc::now()).await
    }

    /// Check and record one request at `now`.
    pub async fn check_at(
        &self,
        identity: &CallerIdentity,
        class: OperationClass,
        now: DateTime<Utc>,
    ) -> AdmissionDecision {
        let quota = self.quotas.get(class);
        if !self.enabled {
            return AdmissionDecision::Allowed(RateLimitStatus {
                allowed: true,
                limit: quota.limit,
                remaining: quota.limit,
                reset_at: now,
            });
        }

        let key = format!("{class}:{}", identity.key());
        match self.store.hit(&key, quota.window, quota.limit, now).await {
            Ok(snapshot) => {
                let reset_at = reset_time(snapshot.oldest.unwrap_or(now), quota.window);
                let status = RateLimitStatus {
                    allowed: snapshot.admitted,
                    limit: quota.limit,
                    remaining: quota.limit.saturating_sub(snapshot.count),
                    reset_at,
                };
                if snapshot.admitted {
                    debug!(key = %key, remaining = status.remaining, "Admitted");
                    AdmissionDecision::Allowed(status)
                } else {
                    warn!(
                        identity = %identity,
                        class = %class,
                        limit = quota.limit,
                        reset_at = %reset_at,
                        "Rate limit exceeded"
                    );
                    AdmissionDecision::Rejected(status)
                }
            }
            Err(e) => {
                warn!(
                    store = self.store.name(),
                    class = %class,
                    error = %e,
                    "Counter store unavailable, admitting request unmetered"
                );
                AdmissionDecision::Degraded {
                    status: RateLimitStatus {
                        allowed: true,
                        limit: 0,
                        remaining: 0,
                        reset_at: now,
                    },
                    reason: e.to_string(),
                }
            }
        }
    }
}

fn reset_time(oldest: DateTime<Utc>, window: std::time::Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|w| oldest.checked_add_signed(w))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
