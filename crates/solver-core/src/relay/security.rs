//! Caller authentication boundary.
//!
//! Session management proper belongs to an external collaborator; the relay
//! only needs to know that a caller is authenticated and whether it is
//! privileged. Both facts are derived here from a bearer key and injected
//! into the request as a [`CallerIdentity`] extension.

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::RwLock;

/// Keys accepted at the relay boundary.
///
/// A caller presenting `admin_key` is privileged: its explicit `apiKey`
/// form field is honored by the credential resolver. `caller_key` admits
/// regular callers; when unset, the relay is open (development mode) and
/// every caller is non-privileged.
#[derive(Debug, Clone, Default)]
pub struct RelaySecurityConfig {
    pub caller_key: Option<String>,
    pub admin_key: Option<String>,
}

/// Authenticated caller, attached as a request extension by
/// [`caller_auth_middleware`].
#[derive(Debug, Clone, Copy)]
pub struct CallerIdentity {
    pub privileged: bool,
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn bearer_key(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer ").or(Some(s)))
        .or_else(|| request.headers().get("x-api-key").and_then(|h| h.to_str().ok()))
}

pub async fn caller_auth_middleware(
    State(security): State<Arc<RwLock<RelaySecurityConfig>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let security = security.read().await.clone();
    let presented = bearer_key(&request);

    if let (Some(admin), Some(key)) = (security.admin_key.as_deref(), presented) {
        if constant_time_compare(key, admin) {
            request.extensions_mut().insert(CallerIdentity { privileged: true });
            return Ok(next.run(request).await);
        }
    }

    match security.caller_key.as_deref() {
        // Open mode: no caller key configured, everyone is non-privileged.
        None => {
            request.extensions_mut().insert(CallerIdentity { privileged: false });
            Ok(next.run(request).await)
        }
        Some(expected) => {
            let authorized = presented.is_some_and(|k| constant_time_compare(k, expected));
            if authorized {
                request.extensions_mut().insert(CallerIdentity { privileged: false });
                Ok(next.run(request).await)
            } else {
                tracing::warn!("Rejected unauthenticated solve request");
                Err(StatusCode::UNAUTHORIZED)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("ab", "abc"));
    }
}
