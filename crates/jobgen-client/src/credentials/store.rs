//! Credential store with coalesced refresh.
//!
//! The store is the only mutable state shared between the gateway, the
//! submitter and the poller. Every mutation swaps a whole `Arc<Credential>`,
//! so readers always see a complete value.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tracing::{debug, error, info, warn};

use super::error::RefreshError;
use super::refresher::TokenRefresher;
use super::session::SessionState;
use super::types::{Credential, CredentialEvent, TokenGrant};
use crate::clock::Clock;
use crate::error::{ClientError, ErrorTag, Result};

const EVENT_CAPACITY: usize = 64;

/// Why a refresh was requested.
#[derive(Debug, Clone, Copy)]
enum RefreshReason<'a> {
    /// The credential looked expired to the caller.
    Expired,
    /// The backend rejected this access token with 401.
    Rejected(&'a str),
    /// Explicit refresh request.
    Forced,
}

/// Holder of the current session credential.
pub struct CredentialStore {
    current: RwLock<Option<Arc<Credential>>>,
    refresher: Arc<dyn TokenRefresher>,
    clock: Arc<dyn Clock>,
    refresh_skew_ms: i64,
    /// At most one refresh exchange is in flight.
    refresh_lock: AsyncMutex<()>,
    /// Bumped whenever a refresh settles or the session is replaced.
    generation: AtomicU64,
    /// Failure of the most recent refresh, replayed to coalesced waiters.
    last_failure: Mutex<Option<RefreshError>>,
    events: broadcast::Sender<CredentialEvent>,
}

impl CredentialStore {
    pub fn new(refresher: Arc<dyn TokenRefresher>, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            current: RwLock::new(None),
            refresher,
            clock,
            refresh_skew_ms: 0,
            refresh_lock: AsyncMutex::new(()),
            generation: AtomicU64::new(0),
            last_failure: Mutex::new(None),
            events,
        }
    }

    /// Refresh `skew_ms` before the token actually expires.
    pub fn with_refresh_skew(mut self, skew_ms: i64) -> Self {
        self.refresh_skew_ms = skew_ms.max(0);
        self
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CredentialEvent> {
        self.events.subscribe()
    }

    /// Synchronous read of the current credential.
    pub fn current(&self) -> Option<Arc<Credential>> {
        self.current.read().clone()
    }

    /// Projection of the current session for UI gating.
    pub fn session_state(&self) -> SessionState {
        SessionState::project(
            self.current().as_deref(),
            self.clock.now_ms(),
            self.refresh_skew_ms,
        )
    }

    /// Start a session from a login or social-provider token pair.
    pub fn establish(&self, grant: TokenGrant) -> Arc<Credential> {
        self.install(Credential::issue(grant))
    }

    /// Start a session from a persisted snapshot. Expiry is re-derived from the token.
    pub fn restore(&self, snapshot: Credential) -> Arc<Credential> {
        self.install(snapshot.rehydrate())
    }

    fn install(&self, credential: Credential) -> Arc<Credential> {
        let credential = Arc::new(credential);
        {
            let mut slot = self.current.write();
            *slot = Some(Arc::clone(&credential));
            *self.last_failure.lock() = None;
        }
        self.generation.fetch_add(1, Ordering::AcqRel);

        info!(expires_at = ?credential.expires_at(), "Session established");
        self.emit(CredentialEvent::Established {
            expires_at: credential.expires_at(),
            timestamp: Utc::now(),
        });

        credential
    }

    /// Destroy the session. Returns whether one existed.
    pub fn sign_out(&self) -> bool {
        let previous = {
            let mut slot = self.current.write();
            *self.last_failure.lock() = None;
            slot.take()
        };
        self.generation.fetch_add(1, Ordering::AcqRel);

        if previous.is_some() {
            info!("Session signed out");
            self.emit(CredentialEvent::SignedOut {
                timestamp: Utc::now(),
            });
        }
        previous.is_some()
    }

    /// Return a credential that is valid now, refreshing it first if it expired.
    pub async fn get_valid_credential(&self) -> Result<Arc<Credential>> {
        let credential = self.current().ok_or_else(no_session)?;

        if !credential.is_expired_at(self.clock.now_ms(), self.refresh_skew_ms) {
            return Ok(credential);
        }

        debug!(expires_at_ms = credential.expires_at_ms, "Access token expired");
        self.coalesced_refresh(RefreshReason::Expired).await
    }

    /// Exchange the refresh token for a new access token.
    ///
    /// Concurrent callers share one exchange and observe the same outcome.
    pub async fn refresh(&self) -> Result<Arc<Credential>> {
        self.coalesced_refresh(RefreshReason::Forced).await
    }

    /// Refresh after the backend answered 401 for `rejected_access_token`.
    ///
    /// If the token was already rotated since that request was sent, the
    /// current credential is returned without another exchange.
    pub async fn refresh_rejected(&self, rejected_access_token: &str) -> Result<Arc<Credential>> {
        self.coalesced_refresh(RefreshReason::Rejected(rejected_access_token))
            .await
    }

    async fn coalesced_refresh(&self, reason: RefreshReason<'_>) -> Result<Arc<Credential>> {
        let observed = self.generation.load(Ordering::Acquire);
        let _guard = self.refresh_lock.lock().await;

        // Double-check after acquiring lock (another task may have refreshed)
        if self.generation.load(Ordering::Acquire) != observed {
            return self.settled_outcome();
        }

        let current = self.current().ok_or_else(no_session)?;
        match reason {
            RefreshReason::Expired
                if !current.is_expired_at(self.clock.now_ms(), self.refresh_skew_ms) =>
            {
                return Ok(current);
            }
            RefreshReason::Rejected(rejected) if current.access_token != rejected => {
                return Ok(current);
            }
            _ => {}
        }

        self.perform_refresh(current).await
    }

    /// Outcome of the refresh that settled while a caller was waiting.
    fn settled_outcome(&self) -> Result<Arc<Credential>> {
        let current = self.current().ok_or_else(|| {
            ClientError::unauthenticated("session ended while waiting for refresh")
        })?;

        if current.last_error.is_some()
            && let Some(failure) = self.last_failure.lock().clone()
        {
            return Err(failure.into());
        }
        Ok(current)
    }

    async fn perform_refresh(&self, current: Arc<Credential>) -> Result<Arc<Credential>> {
        info!("Refreshing access token");
        let outcome = self.refresher.refresh(&current).await;

        let mut slot = self.current.write();
        if !slot.as_ref().is_some_and(|c| Arc::ptr_eq(c, &current)) {
            // Signed out or replaced while the exchange was in flight.
            drop(slot);
            debug!("Session changed during refresh; discarding refresh result");
            return self.settled_outcome();
        }

        match outcome {
            Ok(grant) => {
                let refresh_token = grant
                    .refresh_token
                    .or_else(|| current.refresh_token.clone());
                let next = Arc::new(Credential::issue(TokenGrant::new(
                    grant.access_token,
                    refresh_token,
                )));

                if next.expires_at_ms <= current.expires_at_ms {
                    warn!(
                        previous_expires_at_ms = current.expires_at_ms,
                        expires_at_ms = next.expires_at_ms,
                        "Refreshed token does not extend the session"
                    );
                }

                *slot = Some(Arc::clone(&next));
                *self.last_failure.lock() = None;
                drop(slot);
                self.generation.fetch_add(1, Ordering::AcqRel);

                info!(expires_at = ?next.expires_at(), "Access token refresh successful");
                self.emit(CredentialEvent::Refreshed {
                    expires_at: next.expires_at(),
                    timestamp: Utc::now(),
                });

                Ok(next)
            }
            Err(e) => {
                // Keep the stale credential so the UI can tell "needs re-auth"
                // apart from "never signed in".
                *slot = Some(Arc::new(
                    current.degraded(ErrorTag::RefreshAccessTokenError),
                ));
                *self.last_failure.lock() = Some(e.clone());
                drop(slot);
                self.generation.fetch_add(1, Ordering::AcqRel);

                error!(error = %e, requires_relogin = e.requires_relogin(), "Access token refresh failed");
                self.emit(CredentialEvent::RefreshFailed {
                    error: e.to_string(),
                    requires_relogin: e.requires_relogin(),
                    timestamp: Utc::now(),
                });

                Err(e.into())
            }
        }
    }

    fn emit(&self, event: CredentialEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("current", &self.current())
            .field("refresh_skew_ms", &self.refresh_skew_ms)
            .finish()
    }
}

fn no_session() -> ClientError {
    ClientError::unauthenticated("no active session")
}
