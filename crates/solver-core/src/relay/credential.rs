//! Effective upstream credential resolution.
//!
//! Precedence per call: privileged caller's explicit key, then the
//! system-wide shared key, then the deployment default. A non-privileged
//! caller's supplied key is ignored outright so one caller can neither spend
//! nor discover another tenant's quota.

use crate::error::{AppError, AppResult};
use crate::relay::security::CallerIdentity;

pub fn resolve_credential(
    caller: CallerIdentity,
    supplied: Option<&str>,
    shared: Option<&str>,
    default_key: Option<&str>,
) -> AppResult<String> {
    if caller.privileged {
        if let Some(key) = nonempty(supplied) {
            return Ok(key.to_string());
        }
    }
    if let Some(key) = nonempty(shared) {
        return Ok(key.to_string());
    }
    if let Some(key) = nonempty(default_key) {
        return Ok(key.to_string());
    }
    Err(AppError::Config("no upstream API key configured".to_string()))
}

fn nonempty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVILEGED: CallerIdentity = CallerIdentity { privileged: true };
    const REGULAR: CallerIdentity = CallerIdentity { privileged: false };

    #[test]
    fn privileged_override_wins() {
        let key =
            resolve_credential(PRIVILEGED, Some("own-key"), Some("shared"), Some("default"))
                .unwrap();
        assert_eq!(key, "own-key");
    }

    #[test]
    fn regular_caller_key_is_ignored() {
        let key = resolve_credential(REGULAR, Some("own-key"), Some("shared"), Some("default"))
            .unwrap();
        assert_eq!(key, "shared");
    }

    #[test]
    fn shared_beats_default() {
        let key = resolve_credential(PRIVILEGED, None, Some("shared"), Some("default")).unwrap();
        assert_eq!(key, "shared");
    }

    #[test]
    fn default_is_last_resort() {
        let key = resolve_credential(REGULAR, None, None, Some("default")).unwrap();
        assert_eq!(key, "default");
    }

    #[test]
    fn blank_keys_do_not_resolve() {
        let err = resolve_credential(PRIVILEGED, Some("  "), Some(""), None).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
