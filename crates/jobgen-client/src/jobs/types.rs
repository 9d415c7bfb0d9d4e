//! Job and analysis result types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message surfaced when a job fails without saying why.
pub const GENERIC_FAILURE_MESSAGE: &str = "Analysis failed. Please try again with a different file.";

/// Processing status of an analysis job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    /// Accepted but not yet picked up. The backend calls this `Pending`.
    #[serde(alias = "Pending", alias = "pending", alias = "queued")]
    Queued,
    #[serde(alias = "processing")]
    Processing,
    #[serde(alias = "completed")]
    Completed,
    #[serde(alias = "failed")]
    Failed,
}

impl JobStatus {
    /// Check if no further transition can occur.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "Queued",
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An improvement suggestion attached to an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub applied: bool,
}

/// Analysis payload returned by the status routes and by synchronous submissions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<Suggestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_error: Option<String>,
    /// Fields this client does not model (experiences, educations, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Local view of an analysis job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Number of status fetches applied so far.
    pub attempt: u32,
}

impl Job {
    pub fn queued(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Queued,
            result: None,
            error: None,
            attempt: 0,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply one status response.
    ///
    /// A response without a status counts as still processing. Once the job
    /// is terminal further updates are ignored.
    pub fn apply(&mut self, update: AnalysisResult) {
        if self.is_terminal() {
            return;
        }

        self.attempt += 1;
        self.status = update.status.unwrap_or(JobStatus::Processing);
        if self.status == JobStatus::Failed {
            self.error = Some(
                update
                    .processing_error
                    .clone()
                    .filter(|m| !m.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
            );
        }
        self.result = Some(update);
    }

    /// Message to show for a failed job.
    pub fn failure_message(&self) -> Option<&str> {
        (self.status == JobStatus::Failed)
            .then(|| self.error.as_deref().unwrap_or(GENERIC_FAILURE_MESSAGE))
    }
}

/// A job listing matched against the user's profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedJob {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub apply_url: String,
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<f64>,
    #[serde(default)]
    pub extracted_skills: Vec<String>,
}

/// One page of matched jobs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchedJobsPage {
    #[serde(default)]
    pub items: Vec<MatchedJob>,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub limit: u32,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub has_next: bool,
    #[serde(default)]
    pub has_prev: bool,
}
