//! HTTP client construction.

use std::time::Duration;

use rustls::crypto::CryptoProvider;
use tracing::{debug, warn};

use crate::config::{ClientConfig, ProxyConfig};
use crate::credentials::RefreshMode;
use crate::error::{ClientError, Result};

/// Make aws-lc-rs the process-wide rustls provider unless one is already set.
pub fn ensure_crypto_provider() {
    if CryptoProvider::get_default().is_some() {
        return;
    }
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        debug!("Lost the race to install a rustls provider; using the winner");
    }
}

/// Route `builder` through the configured proxy.
///
/// A disabled proxy also disables environment and system proxies. An enabled
/// proxy without a URL falls back to the system settings only when
/// `use_system_proxy` is set. An unparsable URL is a configuration error.
pub fn apply_proxy_config(
    builder: reqwest::ClientBuilder,
    proxy_config: &ProxyConfig,
) -> Result<reqwest::ClientBuilder> {
    if !proxy_config.enabled {
        return Ok(builder.no_proxy());
    }

    if let Some(url) = proxy_config.url.as_deref() {
        let mut proxy = reqwest::Proxy::all(url)
            .map_err(|e| ClientError::config(format!("invalid proxy URL {url:?}: {e}")))?;
        if let (Some(username), Some(password)) = (
            proxy_config.username.as_ref(),
            proxy_config.password.as_ref(),
        ) {
            proxy = proxy.basic_auth(username, password);
        }
        return Ok(builder.proxy(proxy));
    }

    if proxy_config.use_system_proxy {
        // reqwest picks up system/env proxy settings unless `no_proxy()` is called.
        return Ok(builder);
    }

    Ok(builder.no_proxy())
}

/// Build the shared `reqwest::Client` for a [`ClientConfig`].
///
/// The cookie store is enabled in [`RefreshMode::Cookie`] so the httpOnly
/// refresh cookie set at login is replayed on `/auth/refresh`.
pub fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client> {
    ensure_crypto_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(Duration::from_secs(10));

    let timeout = config.request_timeout();
    if timeout > Duration::ZERO {
        builder = builder.timeout(timeout);
    }

    if config.refresh_mode == RefreshMode::Cookie {
        builder = builder.cookie_store(true);
    }

    if let Some(proxy) = &config.proxy {
        builder = apply_proxy_config(builder, proxy)?;
    }

    builder.build().map_err(|e| {
        warn!(error = %e, "Failed to create HTTP client");
        ClientError::config(format!("failed to create HTTP client: {e}"))
    })
}
