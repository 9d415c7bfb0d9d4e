use crate::error::Result;
use jobgen_client::{ClientConfig, PollPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Poll ceiling used by the CLI so an abandoned job does not hang the terminal.
const CLI_MAX_POLL_ATTEMPTS: u32 = 150;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Colorize human-readable output
    pub colored: bool,

    /// Where the session is persisted between invocations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_file: Option<PathBuf>,

    /// Backend client settings
    pub client: ClientConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            colored: true,
            session_file: None,
            client: ClientConfig {
                poll: PollPolicy::default().with_max_attempts(CLI_MAX_POLL_ATTEMPTS),
                user_agent: concat!("jobgen-cli/", env!("CARGO_PKG_VERSION")).to_string(),
                ..ClientConfig::default()
            },
        }
    }
}

impl AppConfig {
    /// Load from `path`, or the default location. A missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_path(path);
        let Some(path) = path.filter(|p| p.exists()) else {
            return Ok(Self::default());
        };

        debug!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(&path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Overwrite the configuration file with defaults.
    pub fn reset(path: Option<&Path>) -> Result<PathBuf> {
        let path = Self::resolve_path(path).ok_or_else(|| {
            crate::error::CliError::invalid_input("no configuration directory available")
        })?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, Self::default().show()?)?;
        Ok(path)
    }

    pub fn show(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply command-line overrides.
    pub fn with_overrides(mut self, base_url: Option<String>, no_color: bool) -> Self {
        if let Some(base_url) = base_url {
            self.client.base_url = base_url;
        }
        if no_color {
            self.colored = false;
        }
        self
    }

    pub fn session_path(&self) -> Option<PathBuf> {
        self.session_file
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join("jobgen").join("session.json")))
    }

    fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
        path.map(Path::to_path_buf)
            .or_else(|| dirs::config_dir().map(|dir| dir.join("jobgen").join("config.toml")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobgen_client::RefreshMode;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.client.poll.max_attempts, Some(CLI_MAX_POLL_ATTEMPTS));
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
colored = false

[client]
base_url = "https://jobs.example.com"
refresh_mode = "cookie"

[client.poll]
max_delay_ms = 5000
"#,
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();

        assert!(!config.colored);
        assert_eq!(config.client.base_url, "https://jobs.example.com");
        assert_eq!(config.client.refresh_mode, RefreshMode::Cookie);
        assert_eq!(config.client.poll.max_delay_ms, 5_000);
        assert_eq!(config.client.poll.base_delay_ms, 2_000);
    }

    #[test]
    fn reset_writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        AppConfig::reset(Some(&path)).unwrap();

        assert_eq!(AppConfig::load(Some(&path)).unwrap(), AppConfig::default());
    }

    #[test]
    fn overrides_take_precedence() {
        let config = AppConfig::default().with_overrides(Some("http://127.0.0.1:9000".into()), true);

        assert_eq!(config.client.base_url, "http://127.0.0.1:9000");
        assert!(!config.colored);
    }
}
