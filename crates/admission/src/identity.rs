//! Caller identity resolution.

use serde::{Deserialize, Serialize};

pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";
pub const REAL_IP_HEADER: &str = "x-real-ip";

/// Who a request is counted against. Resolved once per request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CallerIdentity {
    /// Authenticated caller id.
    User(String),
    /// Client network address for unauthenticated traffic.
    Address(String),
    /// Neither a caller id nor an address was available.
    Unknown,
}

impl CallerIdentity {
    /// Resolve an identity from an optional authenticated id and request
    /// headers.
    ///
    /// Order: caller id, first entry of `x-forwarded-for`, `x-real-ip`,
    /// then [`CallerIdentity::Unknown`]. Blank values are skipped.
    pub fn resolve<F>(user_id: Option<&str>, header: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(id) = non_empty(user_id) {
            return CallerIdentity::User(id.to_string());
        }

        let forwarded = header(FORWARDED_FOR_HEADER);
        let first_hop = forwarded.as_deref().and_then(|v| v.split(',').next());
        if let Some(addr) = non_empty(first_hop) {
            return CallerIdentity::Address(addr.to_string());
        }

        let real_ip = header(REAL_IP_HEADER);
        if let Some(addr) = non_empty(real_ip.as_deref()) {
            return CallerIdentity::Address(addr.to_string());
        }

        CallerIdentity::Unknown
    }

    /// Counter key fragment for this identity.
    pub fn key(&self) -> String {
        match self {
            CallerIdentity::User(id) => format!("user:{id}"),
            CallerIdentity::Address(addr) => format!("ip:{addr}"),
            CallerIdentity::Unknown => "unknown".to_string(),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, CallerIdentity::User(_))
    }
}

impl std::fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
