//! Refresh error types.

use thiserror::Error;

/// Errors that can occur while exchanging a refresh token.
///
/// Cloneable so every caller waiting on a coalesced refresh observes the
/// same failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// Missing refresh token - re-login required.
    #[error("Missing refresh token - re-login required")]
    MissingRefreshToken,

    /// The backend refused the exchange.
    #[error("Refresh rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered 2xx without a usable token.
    #[error("Invalid refresh response: {0}")]
    InvalidResponse(String),
}

impl RefreshError {
    /// Check if this error requires manual re-login.
    pub fn requires_relogin(&self) -> bool {
        match self {
            Self::MissingRefreshToken => true,
            Self::Rejected { status, .. } => (400..500).contains(status),
            Self::Network(_) | Self::InvalidResponse(_) => false,
        }
    }

    /// Check if this error is transient and may be retried.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Rejected { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RefreshError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
