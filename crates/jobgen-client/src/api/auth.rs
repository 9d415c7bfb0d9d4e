//! Login and logout.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use super::gateway::{ApiGateway, ApiRequest};
use crate::credentials::{Credential, TokenGrant};
use crate::error::{ClientError, Result};

/// The signed-in user as returned by `/auth/login`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: Option<UserProfile>,
    pub credential: Arc<Credential>,
}

/// Session lifecycle endpoints.
#[derive(Debug, Clone)]
pub struct AuthApi {
    gateway: ApiGateway,
}

impl AuthApi {
    pub fn new(gateway: ApiGateway) -> Self {
        Self { gateway }
    }

    /// `POST /auth/login`, then establish the session.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(ClientError::validation("email and password are required"));
        }

        let request = ApiRequest::post("auth/login").json(&json!({
            "email": email.trim(),
            "password": password,
        }))?;
        let body = self.gateway.send_anonymous(&request).await?.value()?;

        let grant = TokenGrant::from_response(&body)
            .ok_or_else(|| ClientError::decode("login response carries no access_token"))?;
        let user = body
            .get("data")
            .and_then(|data| data.get("user"))
            .or_else(|| body.get("user"))
            .filter(|user| user.is_object())
            .and_then(|user| serde_json::from_value(user.clone()).ok());

        let credential = self.gateway.credentials().establish(grant);
        info!(has_refresh_token = credential.has_refresh_token(), "Signed in");

        Ok(LoginOutcome { user, credential })
    }

    /// `POST /auth/logout` on a best-effort basis, then drop the session locally.
    ///
    /// Returns whether a session existed.
    #[instrument(skip(self))]
    pub async fn logout(&self) -> bool {
        let store = self.gateway.credentials();
        let Some(credential) = store.current() else {
            return false;
        };

        if let Err(e) = self
            .gateway
            .send_with(&credential, &ApiRequest::post("auth/logout"))
            .await
        {
            warn!(error = %e, "Backend logout failed; signing out locally");
        }

        store.sign_out()
    }
}
