//! Session state projection.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::store::CredentialStore;
use super::types::Credential;
use crate::error::{ClientError, ErrorTag, Result};

/// UI-facing view of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    /// A credential exists (possibly expired or degraded).
    pub authenticated: bool,
    /// The access token is past its expiry.
    pub expired: bool,
    /// Tag of the last refresh failure, if any.
    pub error: Option<ErrorTag>,
}

impl SessionState {
    pub const SIGNED_OUT: Self = Self {
        authenticated: false,
        expired: false,
        error: None,
    };

    /// Pure projection of a credential at a point in time.
    pub fn project(credential: Option<&Credential>, now_ms: i64, skew_ms: i64) -> Self {
        match credential {
            None => Self::SIGNED_OUT,
            Some(credential) => Self {
                authenticated: true,
                expired: credential.is_expired_at(now_ms, skew_ms),
                error: credential.last_error,
            },
        }
    }

    /// The session exists but the user has to sign in again to use it.
    pub fn requires_reauthentication(&self) -> bool {
        self.authenticated && self.error == Some(ErrorTag::RefreshAccessTokenError)
    }

    /// Gate for job operations: fail fast without a session.
    pub fn ensure_may_start(&self) -> Result<()> {
        if self.authenticated {
            Ok(())
        } else {
            Err(ClientError::unauthenticated("sign in to analyse documents"))
        }
    }
}

/// Read-only session view over a [`CredentialStore`].
#[derive(Debug, Clone)]
pub struct SessionProjector {
    store: Arc<CredentialStore>,
}

impl SessionProjector {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    pub fn state(&self) -> SessionState {
        self.store.session_state()
    }

    /// Fail with [`ClientError::Unauthenticated`] unless a session exists.
    pub fn gate(&self) -> Result<()> {
        self.state().ensure_may_start()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_at_ms: i64, last_error: Option<ErrorTag>) -> Credential {
        Credential {
            access_token: "token".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at_ms,
            last_error,
        }
    }

    #[test]
    fn no_credential_is_signed_out() {
        let state = SessionState::project(None, 0, 0);
        assert_eq!(state, SessionState::SIGNED_OUT);
        assert!(matches!(
            state.ensure_may_start(),
            Err(ClientError::Unauthenticated(_))
        ));
    }

    #[test]
    fn live_credential_is_authenticated() {
        let state = SessionState::project(Some(&credential(5_000, None)), 1_000, 0);
        assert!(state.authenticated);
        assert!(!state.expired);
        assert!(state.error.is_none());
        assert!(state.ensure_may_start().is_ok());
    }

    #[test]
    fn expired_credential_may_still_start_a_job() {
        // The gateway refreshes on first use.
        let state = SessionState::project(Some(&credential(1_000, None)), 5_000, 0);
        assert!(state.expired);
        assert!(!state.requires_reauthentication());
        assert!(state.ensure_may_start().is_ok());
    }

    #[test]
    fn degraded_credential_requires_reauthentication() {
        let state = SessionState::project(
            Some(&credential(1_000, Some(ErrorTag::RefreshAccessTokenError))),
            5_000,
            0,
        );
        assert!(state.authenticated);
        assert!(state.requires_reauthentication());
        assert_eq!(state.error, Some(ErrorTag::RefreshAccessTokenError));
    }
}
