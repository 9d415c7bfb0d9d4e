mod auth;
mod jobs;

use crate::{
    cli::OutputFormat, config::AppConfig, error::Result, output::OutputManager,
    session::SessionFile,
};
use indicatif::{ProgressBar, ProgressStyle};
use jobgen_client::JobgenClient;
use std::time::Duration;
use tracing::warn;

pub struct CommandExecutor {
    client: JobgenClient,
    session: SessionFile,
    output: OutputManager,
    format: OutputFormat,
    quiet: bool,
}

impl CommandExecutor {
    pub fn new(config: AppConfig, format: OutputFormat, quiet: bool) -> Result<Self> {
        let session = SessionFile::new(config.session_path());
        let client = JobgenClient::new(config.client)?;
        session.restore_into(&client)?;

        Ok(Self {
            client,
            session,
            output: OutputManager::new(config.colored),
            format,
            quiet,
        })
    }

    /// Write back the session, which a refresh may have rotated.
    pub fn persist_session(&self) {
        if let Err(e) = self.session.persist(&self.client) {
            warn!("Failed to persist session: {}", e);
        }
    }

    fn print(&self, text: &str) {
        if !self.quiet || self.format.is_json() {
            print!("{text}");
        }
    }

    fn spinner(&self, message: &'static str) -> ProgressBar {
        if self.quiet || self.format.is_json() {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new_spinner();
        pb.enable_steady_tick(Duration::from_millis(120));
        pb.set_style(
            ProgressStyle::with_template("{spinner:.blue} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&[
                    "▹▹▹▹▹",
                    "▸▹▹▹▹",
                    "▹▸▹▹▹",
                    "▹▹▸▹▹",
                    "▹▹▹▸▹",
                    "▹▹▹▹▸",
                    "▪▪▪▪▪",
                ]),
        );
        pb.set_message(message);
        pb
    }
}
