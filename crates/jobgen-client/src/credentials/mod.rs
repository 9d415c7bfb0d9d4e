//! Credential management.
//!
//! - [`Credential`]: access token, refresh token and decoded expiry
//! - [`CredentialStore`]: atomic holder with single-flight refresh
//! - [`TokenRefresher`]: exchanges a refresh token over the network
//! - [`SessionProjector`]: read-only session view used to gate job operations

mod claims;
mod error;
mod refresher;
mod session;
mod store;
mod types;

pub use claims::{decode_expiry_ms, expiry_or_expired};
pub use error::RefreshError;
pub use refresher::{HttpTokenRefresher, RefreshMode, TokenRefresher};
pub use session::{SessionProjector, SessionState};
pub use store::CredentialStore;
pub use types::{Credential, CredentialEvent, TokenGrant};
