//! Authentication and admission layers for `/v1`.

use crate::SharedState;
use crate::api::ErrorResponse;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use casedraft_admission::{
    AdmissionDecision, AdmissionGate, CallerIdentity, OperationClass, RateLimitStatus,
};
use chrono::Utc;
use tracing::warn;

pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Error half of every `/v1` handler.
pub type ApiError = (StatusCode, HeaderMap, Json<ErrorResponse>);

/// Resolve the caller and attach a [`CallerIdentity`] to the request.
///
/// An `Authorization` header must use the Bearer scheme (any case) with a
/// configured token; no header at all means an anonymous caller keyed by
/// address.
pub async fn authenticate(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Response {
    let caller_id = match req.headers().get(header::AUTHORIZATION) {
        None => None,
        Some(value) => {
            let Some(token) = bearer_token(value) else {
                warn!(path = %req.uri().path(), "Rejected non-Bearer authorization");
                return unauthorized("authorization must use the Bearer scheme");
            };
            match state.caller_for(token) {
                Some(id) => Some(id.to_string()),
                None => {
                    warn!(path = %req.uri().path(), "Rejected unknown bearer token");
                    return unauthorized("invalid bearer token");
                }
            }
        }
    };

    let identity = CallerIdentity::resolve(caller_id.as_deref(), |name| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    });
    req.extensions_mut().insert(identity);
    next.run(req).await
}

/// Token of a `Bearer <token>` header value. The scheme is matched
/// case-insensitively; other schemes and empty tokens yield `None`.
pub fn bearer_token(value: &HeaderValue) -> Option<&str> {
    let (scheme, token) = value.to_str().ok()?.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ErrorResponse::new(message))).into_response()
}

/// General admission for every `/v1` request: `api` for authenticated
/// callers, `anonymous` otherwise.
///
/// Headers set by a handler's own class check take precedence.
pub async fn admit_request(
    State(state): State<SharedState>,
    req: Request,
    next: Next,
) -> Response {
    let identity = req
        .extensions()
        .get::<CallerIdentity>()
        .cloned()
        .unwrap_or(CallerIdentity::Unknown);
    let class = if identity.is_authenticated() {
        OperationClass::Api
    } else {
        OperationClass::Anonymous
    };

    match admit(&state.gate, &identity, class).await {
        Ok(headers) => {
            let mut response = next.run(req).await;
            for (name, value) in headers.iter() {
                response
                    .headers_mut()
                    .entry(name)
                    .or_insert_with(|| value.clone());
            }
            response
        }
        Err(rejection) => rejection.into_response(),
    }
}

/// Check one class for `identity`. On success returns the rate-limit
/// headers to attach; on rejection a ready 429.
pub async fn admit(
    gate: &AdmissionGate,
    identity: &CallerIdentity,
    class: OperationClass,
) -> Result<HeaderMap, ApiError> {
    let decision = gate.check(identity, class).await;
    let mut headers = match &decision {
        // Unmetered: nothing meaningful to report.
        AdmissionDecision::Degraded { .. } => HeaderMap::new(),
        d => rate_limit_headers(d.status()),
    };

    match decision.into_result(class) {
        Ok(_) => Ok(headers),
        Err(err) => {
            headers.insert(
                header::RETRY_AFTER,
                HeaderValue::from(err.retry_after_secs(Utc::now())),
            );
            Err((
                StatusCode::TOO_MANY_REQUESTS,
                headers,
                Json(ErrorResponse::rate_limited(&err)),
            ))
        }
    }
}

/// `X-RateLimit-*` headers for `status`. Reset is in unix seconds.
pub fn rate_limit_headers(status: &RateLimitStatus) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(status.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(status.remaining));
    headers.insert(RATE_LIMIT_RESET, HeaderValue::from(status.reset_at.timestamp()));
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn headers_carry_limit_remaining_and_unix_reset() {
        let status = RateLimitStatus {
            allowed: true,
            limit: 10,
            remaining: 7,
            reset_at: Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap(),
        };
        let headers = rate_limit_headers(&status);
        assert_eq!(headers[&RATE_LIMIT_LIMIT], "10");
        assert_eq!(headers[&RATE_LIMIT_REMAINING], "7");
        assert_eq!(headers[&RATE_LIMIT_RESET], "1772445600");
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        for raw in ["Bearer tok-1", "bearer tok-1", "BEARER  tok-1 "] {
            assert_eq!(bearer_token(&HeaderValue::from_static(raw)), Some("tok-1"), "{raw}");
        }
    }

    #[test]
    fn other_schemes_and_bare_tokens_are_not_bearer() {
        for raw in ["Basic dXNlcjpwYXNz", "tok-1", "Bearer ", "Token tok-1"] {
            assert_eq!(bearer_token(&HeaderValue::from_static(raw)), None, "{raw}");
        }
    }
}
