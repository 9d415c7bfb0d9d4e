use super::CommandExecutor;
use crate::error::{CliError, Result};
use indicatif::ProgressBar;
use jobgen_client::{Document, Job, JobEvent, JobStatus, PollHandle, Started};
use std::path::Path;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info};

impl CommandExecutor {
    pub async fn analyze(&self, file: &Path, no_matches: bool, no_wait: bool) -> Result<()> {
        self.client.session_state().ensure_may_start()?;
        let document =
            Document::from_path(file, self.client.config().max_document_bytes).await?;
        info!(
            "Uploading {} ({} bytes)",
            document.file_name,
            document.len()
        );

        if no_wait {
            let pb = self.spinner("Uploading document...");
            let submission = self.client.submit(document).await;
            pb.finish_and_clear();
            self.print(&self.output.format_submission(&submission?, &self.format)?);
            return Ok(());
        }

        let workflow = if no_matches {
            self.client.workflow().without_matches()
        } else {
            self.client.workflow()
        };

        let events = self.client.subscribe_jobs();
        let pb = self.spinner("Uploading document...");
        let started = match workflow.start(document).await {
            Ok(started) => started,
            Err(e) => {
                pb.finish_and_clear();
                return Err(e.into());
            }
        };

        let report = match started {
            Started::Immediate(job) => {
                pb.finish_and_clear();
                workflow.finish(job, true).await
            }
            Started::Polling(handle) => {
                pb.set_message(format!("Analysing (job {})...", handle.job_id()));
                let job = self.wait_with_progress(handle, events, &pb).await?;
                if !no_matches && job.status == JobStatus::Completed {
                    pb.set_message("Fetching matched jobs...");
                }
                let report = workflow.finish(job, false).await;
                pb.finish_and_clear();
                report
            }
        };

        self.print(&self.output.format_report(&report, &self.format)?);
        Ok(())
    }

    pub async fn status(&self, job_id: &str, wait: bool) -> Result<()> {
        let job = if wait {
            let events = self.client.subscribe_jobs();
            let handle = self.client.start_poll(job_id)?;
            let pb = self.spinner("Waiting for analysis...");
            let job = self.wait_with_progress(handle, events, &pb).await;
            pb.finish_and_clear();
            job?
        } else {
            let pb = self.spinner("Fetching status...");
            let result = self.client.api().fetch_status(job_id).await;
            pb.finish_and_clear();
            let mut job = Job::queued(job_id);
            job.apply(result?);
            job
        };

        self.print(&self.output.format_job(&job, &self.format)?);
        Ok(())
    }

    pub async fn matches(&self, page: u32, limit: u32) -> Result<()> {
        let pb = self.spinner("Fetching matched jobs...");
        let matches = self.client.fetch_matched_jobs(page, limit).await;
        pb.finish_and_clear();
        self.print(&self.output.format_matches(&matches?, &self.format)?);
        Ok(())
    }

    /// Wait for `handle`, mirroring its events on the spinner.
    ///
    /// Ctrl-C drops the handle, which cancels the poll.
    async fn wait_with_progress(
        &self,
        handle: PollHandle,
        mut events: broadcast::Receiver<JobEvent>,
        pb: &ProgressBar,
    ) -> Result<Job> {
        let job_id = handle.job_id().to_string();
        let wait = handle.wait();
        tokio::pin!(wait);
        let interrupt = tokio::signal::ctrl_c();
        tokio::pin!(interrupt);
        let mut listening = true;

        loop {
            tokio::select! {
                result = &mut wait => return Ok(result?),
                _ = &mut interrupt => {
                    pb.finish_and_clear();
                    info!(%job_id, "Interrupted, cancelling poll");
                    return Err(CliError::Interrupted);
                }
                event = events.recv(), if listening => match event {
                    Ok(event) if event.job_id() == job_id => {
                        debug!(?event, "Job event");
                        pb.set_message(self.output.event_message(&event));
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => debug!(skipped, "Job events lagged"),
                    Err(RecvError::Closed) => listening = false,
                },
            }
        }
    }
}
