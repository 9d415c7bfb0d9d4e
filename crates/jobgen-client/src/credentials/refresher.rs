//! Refresh-token exchange.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, instrument};
use url::Url;

use super::error::RefreshError;
use super::types::{Credential, TokenGrant};
use crate::api::ErrorBody;

/// How the refresh token reaches `/auth/refresh`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshMode {
    /// Refresh token round-tripped in the JSON body.
    #[default]
    Body,
    /// Refresh token held in the backend's httpOnly cookie; no body is sent.
    Cookie,
}

/// Performs a single refresh round trip.
///
/// Implementations must not retry internally; coalescing and failure
/// bookkeeping are handled by [`crate::CredentialStore`].
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, credential: &Credential) -> Result<TokenGrant, RefreshError>;
}

/// Refresher talking to the backend's `/auth/refresh` endpoint.
#[derive(Debug, Clone)]
pub struct HttpTokenRefresher {
    client: Client,
    endpoint: Url,
    mode: RefreshMode,
}

impl HttpTokenRefresher {
    /// `client` must have a cookie store enabled for [`RefreshMode::Cookie`].
    pub fn new(client: Client, endpoint: Url, mode: RefreshMode) -> Self {
        Self {
            client,
            endpoint,
            mode,
        }
    }

    pub fn mode(&self) -> RefreshMode {
        self.mode
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    #[instrument(skip_all, fields(mode = ?self.mode))]
    async fn refresh(&self, credential: &Credential) -> Result<TokenGrant, RefreshError> {
        let request = self.client.post(self.endpoint.clone());
        let request = match (self.mode, credential.refresh_token.as_deref()) {
            (RefreshMode::Body, Some(token)) => request.json(&json!({ "refresh_token": token })),
            (RefreshMode::Body, None) => return Err(RefreshError::MissingRefreshToken),
            (RefreshMode::Cookie, _) => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let body = ErrorBody::from_response_text(status, &text);
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message: body.message,
            });
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        let grant = TokenGrant::from_response(&body)
            .ok_or_else(|| RefreshError::InvalidResponse("No access_token in response".to_string()))?;

        debug!(
            rotated_refresh_token = grant.refresh_token.is_some(),
            "Access token refresh successful"
        );

        Ok(grant)
    }
}
