//! Client error types.

use std::fmt;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::ErrorBody;
use crate::credentials::RefreshError;

/// Client-wide result type.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by every client operation.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No usable session. Raised before any network call is made.
    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    /// A client-side precondition failed (e.g. oversized document).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Exchanging the refresh token failed. The session is degraded, not destroyed.
    #[error("Access token refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),

    /// Transport failure.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend rejected the request.
    #[error("Upstream error ({status}): {}", body.message)]
    Upstream { status: StatusCode, body: ErrorBody },

    /// A success response could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Polling exceeded the configured attempt ceiling.
    #[error("Gave up polling job {job_id} after {attempts} attempts")]
    Timeout { job_id: String, attempts: u32 },

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ClientError {
    pub fn unauthenticated(msg: impl Into<String>) -> Self {
        Self::Unauthenticated(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Check if this error is a transport failure worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Check if this error requires the user to sign in again.
    pub fn requires_relogin(&self) -> bool {
        match self {
            Self::Unauthenticated(_) => true,
            Self::RefreshFailed(e) => e.requires_relogin(),
            _ => false,
        }
    }

    /// Check if the backend answered 401.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }

    /// HTTP status of an upstream rejection.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message suitable for showing to a user.
    ///
    /// Upstream errors carry the backend message verbatim; everything else
    /// falls back to the error's display form.
    pub fn user_message(&self) -> String {
        match self {
            Self::Upstream { body, .. } => body.message.clone(),
            Self::RefreshFailed(_) => "Your session has expired, please sign in again".to_string(),
            other => other.to_string(),
        }
    }

    /// Project this error onto its taxonomy tag.
    pub fn tag(&self) -> ErrorTag {
        match self {
            Self::Unauthenticated(_) => ErrorTag::Unauthenticated,
            Self::Validation(_) | Self::Configuration(_) => ErrorTag::ValidationError,
            Self::RefreshFailed(_) => ErrorTag::RefreshAccessTokenError,
            Self::Network(_) => ErrorTag::NetworkError,
            Self::Upstream { .. } | Self::Decode(_) => ErrorTag::UpstreamError,
            Self::Timeout { .. } => ErrorTag::Timeout,
            Self::Cancelled => ErrorTag::Cancelled,
        }
    }
}

/// Compact error classification exposed to the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorTag {
    Unauthenticated,
    ValidationError,
    RefreshAccessTokenError,
    NetworkError,
    UpstreamError,
    Timeout,
    Cancelled,
}

impl ErrorTag {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "Unauthenticated",
            Self::ValidationError => "ValidationError",
            Self::RefreshAccessTokenError => "RefreshAccessTokenError",
            Self::NetworkError => "NetworkError",
            Self::UpstreamError => "UpstreamError",
            Self::Timeout => "Timeout",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for ErrorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_error_exposes_backend_message() {
        let err = ClientError::Upstream {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ErrorBody::new("unsupported file type"),
        };

        assert_eq!(err.user_message(), "unsupported file type");
        assert_eq!(err.tag(), ErrorTag::UpstreamError);
        assert!(!err.is_transient());
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn refresh_rejection_requires_relogin() {
        let err = ClientError::from(RefreshError::Rejected {
            status: 401,
            message: "Invalid or expired refresh token".to_string(),
        });

        assert!(err.requires_relogin());
        assert_eq!(err.tag(), ErrorTag::RefreshAccessTokenError);
    }

    #[test]
    fn transient_refresh_failure_does_not_require_relogin() {
        let err = ClientError::from(RefreshError::Network("connection reset".to_string()));
        assert!(!err.requires_relogin());
    }

    #[test]
    fn tag_serializes_as_plain_name() {
        let json = serde_json::to_string(&ErrorTag::RefreshAccessTokenError).unwrap();
        assert_eq!(json, "\"RefreshAccessTokenError\"");
    }
}
