//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::credentials::RefreshMode;
use crate::error::{ClientError, Result};
use crate::jobs::{MAX_DOCUMENT_BYTES, PollPolicy};

/// Default backend origin.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default API prefix every endpoint lives under.
pub const DEFAULT_API_PREFIX: &str = "/api/v1";

/// Which status route the poller queries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusRoute {
    /// `GET /cv/{id}`
    #[default]
    Resource,
    /// `GET /cv/parse/{id}/status`
    ParseStatus,
}

/// Outbound proxy settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Whether proxy is enabled.
    pub enabled: bool,
    /// Proxy URL (e.g., "http://proxy.example.com:8080").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Use system proxy settings when no explicit URL is given.
    #[serde(default)]
    pub use_system_proxy: bool,
}

/// Configuration for [`crate::JobgenClient`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend origin, e.g. `https://api.example.com`.
    pub base_url: String,
    /// Path prefix prepended to every endpoint.
    pub api_prefix: String,
    /// Per-request timeout in seconds. Zero disables the timeout.
    pub request_timeout: u64,
    /// How the refresh token is presented to `/auth/refresh`.
    pub refresh_mode: RefreshMode,
    /// Treat the access token as expired this many milliseconds early.
    pub refresh_skew_ms: i64,
    /// Largest document accepted for upload.
    pub max_document_bytes: usize,
    pub status_route: StatusRoute,
    pub poll: PollPolicy,
    /// `None` keeps reqwest's default proxy behaviour.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxyConfig>,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            request_timeout: 30,
            refresh_mode: RefreshMode::Body,
            refresh_skew_ms: 0,
            max_document_bytes: MAX_DOCUMENT_BYTES,
            status_route: StatusRoute::Resource,
            poll: PollPolicy::default(),
            proxy: None,
            user_agent: concat!("jobgen-client/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientConfig {
    /// Configuration pointing at `base_url` with every other field defaulted.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Resolve the API root (origin plus prefix) with no trailing slash.
    pub fn api_root(&self) -> Result<Url> {
        let base = self.base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(ClientError::config("base_url must not be empty"));
        }

        let mut url = Url::parse(base)
            .map_err(|e| ClientError::config(format!("invalid base_url {base:?}: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(ClientError::config(format!(
                "base_url {base:?} cannot carry a path"
            )));
        }

        {
            let Ok(mut segments) = url.path_segments_mut() else {
                return Err(ClientError::config(format!(
                    "base_url {base:?} cannot carry a path"
                )));
            };
            segments.pop_if_empty();
            segments.extend(self.api_prefix.split('/').filter(|s| !s.is_empty()));
        }

        Ok(url)
    }

    /// Validate the configuration without building a client.
    pub fn validate(&self) -> Result<()> {
        self.api_root()?;
        if self.max_document_bytes == 0 {
            return Err(ClientError::config("max_document_bytes must be positive"));
        }
        if self.poll.max_delay_ms == 0 {
            return Err(ClientError::config("poll.max_delay_ms must be positive"));
        }
        Ok(())
    }
}
