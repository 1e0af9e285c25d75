//! Invalid-credential bookkeeping shared by the rotator and its consumers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a pool key was marked unusable.
///
/// Derived by the dispatcher's failure classification; the server never
/// produces these.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidReason {
    /// Quota or rate limit exhausted (429, "RESOURCE_EXHAUSTED", ...).
    Quota,
    /// Key has expired.
    Expired,
    /// Key rejected as malformed or unknown.
    Invalid,
    /// Key lacks permission for the requested model.
    NoPermission,
    /// Key-attributable failure that fits none of the above.
    Unavailable,
}

impl InvalidReason {
    /// Human-readable label for pool displays.
    pub fn label(self) -> &'static str {
        match self {
            Self::Quota => "quota exhausted",
            Self::Expired => "expired",
            Self::Invalid => "invalid",
            Self::NoPermission => "no permission",
            Self::Unavailable => "unavailable",
        }
    }
}

/// Timestamped invalidity marker kept per pool key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InvalidMark {
    pub reason: InvalidReason,
    pub marked_at: DateTime<Utc>,
}

impl InvalidMark {
    pub fn now(reason: InvalidReason) -> Self {
        Self { reason, marked_at: Utc::now() }
    }
}

/// Masked display form of a key: first and last four characters only.
/// Keys too short to mask meaningfully are fully redacted.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.trim().chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}
