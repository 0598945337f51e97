//! The stored credential record and its freshness classification.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default refresh window: credentials expiring sooner than this are refreshed.
pub const DEFAULT_REFRESH_WINDOW_SECS: i64 = 300;

/// A stored credential for one provider family.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCredential {
    /// Family key, e.g. `"openai"`, `"anthropic"`, `"google-antigravity"`.
    pub provider: String,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// `"oauth"` or `"token"`.
    #[serde(default)]
    pub auth_method: String,
}

/// Freshness of a credential at a given instant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialStatus {
    Active,
    NeedsRefresh,
    Expired,
}

impl fmt::Display for CredentialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CredentialStatus::Active => "active",
            CredentialStatus::NeedsRefresh => "needs refresh",
            CredentialStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

impl AuthCredential {
    /// A pasted, non-expiring API/session token.
    pub fn token(provider: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            access_token: access_token.into(),
            auth_method: "token".into(),
            ..Default::default()
        }
    }

    /// Classify against `now` using `window` as the refresh threshold.
    ///
    /// No expiry means [`CredentialStatus::Active`] forever.
    pub fn status_at(&self, now: DateTime<Utc>, window: Duration) -> CredentialStatus {
        match self.expires_at {
            None => CredentialStatus::Active,
            Some(exp) if now >= exp => CredentialStatus::Expired,
            Some(exp) if exp - now < window => CredentialStatus::NeedsRefresh,
            Some(_) => CredentialStatus::Active,
        }
    }

    /// [`status_at`](Self::status_at) with the current time.
    pub fn status(&self, window: Duration) -> CredentialStatus {
        self.status_at(Utc::now(), window)
    }

    pub fn is_expired(&self) -> bool {
        self.status(default_window()) == CredentialStatus::Expired
    }

    pub fn needs_refresh(&self) -> bool {
        self.status(default_window()) != CredentialStatus::Active
    }

    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }
}

pub fn default_window() -> Duration {
    Duration::seconds(DEFAULT_REFRESH_WINDOW_SECS)
}
