//! Credential types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::claims::expiry_or_expired;
use crate::error::ErrorTag;

/// Token pair handed out by the backend on login, refresh or social exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenGrant {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    /// Extract a grant from an auth response body.
    ///
    /// Tokens are looked up under `data` first and at the top level second;
    /// the backend has shipped both layouts.
    pub fn from_response(body: &Value) -> Option<Self> {
        let read = |scope: &Value| -> Option<Self> {
            let access = scope
                .get("access_token")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())?;
            let refresh = scope
                .get("refresh_token")
                .and_then(Value::as_str)
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            Some(Self::new(access, refresh))
        };

        body.get("data").and_then(read).or_else(|| read(body))
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .finish()
    }
}

/// A session-bound bearer credential.
///
/// Instances are immutable; the store swaps whole values so readers never see
/// a half-updated credential.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Decoded from the access token's `exp` claim; `0` when undecodable.
    pub expires_at_ms: i64,
    /// Set when the last refresh attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<ErrorTag>,
}

impl Credential {
    /// Build a credential from a freshly issued grant.
    pub fn issue(grant: TokenGrant) -> Self {
        let expires_at_ms = expiry_or_expired(&grant.access_token);
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            expires_at_ms,
            last_error: None,
        }
    }

    /// Check if the credential is unusable at `now_ms`, refreshing `skew_ms` early.
    pub fn is_expired_at(&self, now_ms: i64, skew_ms: i64) -> bool {
        now_ms.saturating_add(skew_ms.max(0)) >= self.expires_at_ms
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.expires_at_ms).filter(|_| self.expires_at_ms > 0)
    }

    #[inline]
    pub fn has_refresh_token(&self) -> bool {
        self.refresh_token.is_some()
    }

    /// Copy of this credential flagged with a refresh failure.
    pub fn degraded(&self, tag: ErrorTag) -> Self {
        Self {
            last_error: Some(tag),
            ..self.clone()
        }
    }

    /// Re-derive the expiry from the token, e.g. after loading a snapshot.
    pub fn rehydrate(self) -> Self {
        Self {
            expires_at_ms: expiry_or_expired(&self.access_token),
            ..self
        }
    }

    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.has_refresh_token())
            .field("expires_at_ms", &self.expires_at_ms)
            .field("last_error", &self.last_error)
            .finish()
    }
}

/// Credential lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialEvent {
    /// A session was created by login, social exchange or restore.
    Established {
        expires_at: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    },

    /// The access token was successfully refreshed.
    Refreshed {
        expires_at: Option<DateTime<Utc>>,
        timestamp: DateTime<Utc>,
    },

    /// Refresh failed; the stale credential is kept and flagged.
    RefreshFailed {
        error: String,
        /// Whether manual re-login is required.
        requires_relogin: bool,
        timestamp: DateTime<Utc>,
    },

    /// The session was destroyed.
    SignedOut { timestamp: DateTime<Utc> },
}
