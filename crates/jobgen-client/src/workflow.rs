//! Submit, poll, then fetch matched jobs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::{BackendApi, DEFAULT_MATCHES_LIMIT, DEFAULT_MATCHES_PAGE};
use crate::error::{ClientError, Result};
use crate::jobs::{
    Document, Job, JobPoller, JobStatus, JobSubmitter, MatchedJobsPage, PollHandle, Submission,
};

/// Outcome of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub job: Job,
    /// Whether the result arrived with the submission response.
    pub immediate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches: Option<MatchedJobsPage>,
    /// Why the matched jobs could not be fetched, if they were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matches_error: Option<String>,
}

impl AnalysisReport {
    pub fn failure_message(&self) -> Option<&str> {
        self.job.failure_message()
    }
}

/// Drives one document through the backend.
#[derive(Debug, Clone)]
pub struct AnalysisWorkflow {
    submitter: JobSubmitter,
    poller: Arc<JobPoller>,
    api: Arc<BackendApi>,
    fetch_matches: bool,
    matches_limit: u32,
}

impl AnalysisWorkflow {
    pub fn new(submitter: JobSubmitter, poller: Arc<JobPoller>, api: Arc<BackendApi>) -> Self {
        Self {
            submitter,
            poller,
            api,
            fetch_matches: true,
            matches_limit: DEFAULT_MATCHES_LIMIT,
        }
    }

    /// Skip the matched-jobs fetch after completion.
    pub fn without_matches(mut self) -> Self {
        self.fetch_matches = false;
        self
    }

    pub fn with_matches_limit(mut self, limit: u32) -> Self {
        self.matches_limit = limit;
        self
    }

    /// Submit `document` and return a handle to its poll, or the immediate result.
    pub async fn start(&self, document: Document) -> Result<Started> {
        match self.submitter.submit(document).await? {
            Submission::Accepted { job_id, .. } => Ok(Started::Polling(self.poller.start(job_id)?)),
            Submission::Completed(result) => {
                let reported = result.status;
                let mut job = Job::queued(result.id.clone().unwrap_or_default());
                job.apply(result);
                // A synchronous answer without a status is a finished analysis.
                if reported.is_none() {
                    job.status = JobStatus::Completed;
                }
                if !job.is_terminal() {
                    return Err(ClientError::decode(format!(
                        "synchronous result reported {} without a job id",
                        job.status
                    )));
                }
                Ok(Started::Immediate(job))
            }
        }
    }

    /// Run the whole flow.
    ///
    /// On `Completed` exactly one matched-jobs fetch is chained; its failure
    /// is recorded on the report rather than failing the run. On `Failed`
    /// nothing is chained.
    pub async fn run(&self, document: Document) -> Result<AnalysisReport> {
        let (job, immediate) = match self.start(document).await? {
            Started::Immediate(job) => (job, true),
            Started::Polling(handle) => (handle.wait().await?, false),
        };
        Ok(self.finish(job, immediate).await)
    }

    /// Chain the dependent fetch for a settled job.
    pub async fn finish(&self, job: Job, immediate: bool) -> AnalysisReport {
        let mut report = AnalysisReport {
            job,
            immediate,
            matches: None,
            matches_error: None,
        };

        if report.job.status != JobStatus::Completed || !self.fetch_matches {
            return report;
        }

        match self
            .api
            .fetch_matched_jobs(DEFAULT_MATCHES_PAGE, self.matches_limit)
            .await
        {
            Ok(matches) => {
                info!(job_id = %report.job.id, count = matches.items.len(), "Matched jobs fetched");
                report.matches = Some(matches);
            }
            Err(e) => {
                warn!(job_id = %report.job.id, error = %e, tag = %e.tag(), "Matched jobs fetch failed");
                report.matches_error = Some(e.user_message());
            }
        }
        report
    }
}

/// A submitted document.
#[derive(Debug)]
pub enum Started {
    /// Analysed synchronously.
    Immediate(Job),
    /// Accepted; the poll is running.
    Polling(PollHandle),
}
