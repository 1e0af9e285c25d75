//! Failure classification for the attempt dispatcher.
//!
//! Only credential-exhaustion failures may mark a pool key invalid;
//! anything else might be the request's fault, or nobody's, and the key
//! stays in rotation.

use solver_types::credential::InvalidReason;

/// Does this relay failure exhaust the credential that carried it?
///
/// Status codes 401/403/429 are attributed to the key outright; otherwise
/// the message text is sniffed for key-shaped complaints the way the
/// upstream phrases them.
pub fn is_credential_error(status: u16, message: &str) -> bool {
    if matches!(status, 401 | 403 | 429) {
        return true;
    }
    let text = message.to_lowercase();
    if text.contains("api key") || text.contains("apikey") {
        return true;
    }
    if text.contains("key") && (text.contains("invalid") || text.contains("expired")) {
        return true;
    }
    if text.contains("quota") || text.contains("resource exhausted") || text.contains("resource_exhausted") {
        return true;
    }
    if text.contains("permission") || text.contains("unauthorized") {
        return true;
    }
    false
}

/// Derive the invalidity category recorded next to a marked key.
pub fn invalid_reason(status: u16, message: &str) -> InvalidReason {
    let text = message.to_lowercase();
    if text.contains("quota") || text.contains("resource exhausted") || text.contains("resource_exhausted") {
        return InvalidReason::Quota;
    }
    if text.contains("expired") {
        return InvalidReason::Expired;
    }
    if text.contains("not valid") || text.contains("invalid") {
        return InvalidReason::Invalid;
    }
    if text.contains("permission") || text.contains("unauthorized") {
        return InvalidReason::NoPermission;
    }
    match status {
        429 => InvalidReason::Quota,
        401 | 403 => InvalidReason::Invalid,
        _ => InvalidReason::Unavailable,
    }
}
