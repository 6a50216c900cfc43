//! Submitter identity and notification registration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque credential identifying a submitter.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerToken(pub String);

impl OwnerToken {
    /// Generate a fresh random token.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tokens are credentials; keep them out of debug logs.
impl fmt::Debug for OwnerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix: String = self.0.chars().take(4).collect();
        write!(f, "OwnerToken({}…)", prefix)
    }
}

impl From<String> for OwnerToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OwnerToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Maps an owner token to where completion notices are sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OwnerRegistration {
    pub token: OwnerToken,
    /// URL or device handle
    pub notification_target: String,
    pub created_at: DateTime<Utc>,
}

impl OwnerRegistration {
    pub fn new(token: OwnerToken, notification_target: impl Into<String>) -> Self {
        Self {
            token,
            notification_target: notification_target.into(),
            created_at: Utc::now(),
        }
    }

    /// Whether the target can receive an HTTP POST.
    pub fn is_http_target(&self) -> bool {
        is_http_target(&self.notification_target)
    }
}

/// Whether a notification target is an http(s) URL.
pub fn is_http_target(target: &str) -> bool {
    let lower = target.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}
