//! Operation classes and their quotas.

use casedraft_config::{ClassLimit, RateLimitConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Category of request, each with its own quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
    /// General authenticated API traffic.
    Api,
    /// Draft generation (expensive backend calls).
    Generation,
    /// Context preview and other analysis.
    Analysis,
    Upload,
    /// Unauthenticated traffic, keyed by address.
    Anonymous,
}

impl OperationClass {
    pub const ALL: [OperationClass; 5] = [
        OperationClass::Api,
        OperationClass::Generation,
        OperationClass::Analysis,
        OperationClass::Upload,
        OperationClass::Anonymous,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationClass::Api => "api",
            OperationClass::Generation => "generation",
            OperationClass::Analysis => "analysis",
            OperationClass::Upload => "upload",
            OperationClass::Anonymous => "anonymous",
        }
    }
}

impl std::fmt::Display for OperationClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// At most `limit` admissions in any trailing `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub limit: u32,
    pub window: Duration,
}

impl Quota {
    pub const fn new(limit: u32, window: Duration) -> Self {
        Self { limit, window }
    }
}

impl From<ClassLimit> for Quota {
    fn from(c: ClassLimit) -> Self {
        Self::new(c.limit, Duration::from_secs(c.window_secs))
    }
}

/// One quota per operation class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaTable {
    api: Quota,
    generation: Quota,
    analysis: Quota,
    upload: Quota,
    anonymous: Quota,
}

impl QuotaTable {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            api: config.api.into(),
            generation: config.generation.into(),
            analysis: config.analysis.into(),
            upload: config.upload.into(),
            anonymous: config.anonymous.into(),
        }
    }

    pub fn get(&self, class: OperationClass) -> Quota {
        match class {
            OperationClass::Api => self.api,
            OperationClass::Generation => self.generation,
            OperationClass::Analysis => self.analysis,
            OperationClass::Upload => self.upload,
            OperationClass::Anonymous => self.anonymous,
        }
    }

    /// Replace one class's quota.
    pub fn with(mut self, class: OperationClass, quota: Quota) -> Self {
        match class {
            OperationClass::Api => self.api = quota,
            OperationClass::Generation => self.generation = quota,
            OperationClass::Analysis => self.analysis = quota,
            OperationClass::Upload => self.upload = quota,
            OperationClass::Anonymous => self.anonymous = quota,
        }
        self
    }
}

impl Default for QuotaTable {
    fn default() -> Self {
        Self::from_config(&RateLimitConfig::default())
    }
}
