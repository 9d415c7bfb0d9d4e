//! Document submission.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use super::types::AnalysisResult;
use crate::api::BackendApi;
use crate::api::envelope::unwrap_data;
use crate::credentials::SessionProjector;
use crate::error::{ClientError, Result};

/// Largest document the backend accepts.
pub const MAX_DOCUMENT_BYTES: usize = 5 * 1024 * 1024;

/// A document to analyse.
#[derive(Clone)]
pub struct Document {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Bytes,
}

impl Document {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a document from disk, guessing the content type from the extension.
    ///
    /// Files larger than `max_bytes` are rejected from their metadata before
    /// anything is read.
    pub async fn from_path(path: impl AsRef<Path>, max_bytes: usize) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            ClientError::validation(format!("cannot read {}: {e}", path.display()))
        })?;
        if metadata.len() > max_bytes as u64 {
            return Err(ClientError::validation(format!(
                "{} is {} bytes; the limit is {} bytes",
                path.display(),
                metadata.len(),
                max_bytes
            )));
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ClientError::validation(format!("cannot read {}: {e}", path.display()))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        Ok(Self::new(file_name, guess_content_type(path), bytes))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn guess_content_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("doc") => "application/msword",
        Some("docx") => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Outcome of a submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Submission {
    /// Accepted for asynchronous processing; poll `job_id`.
    Accepted {
        job_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Analysed synchronously; no polling required.
    Completed(AnalysisResult),
}

impl Submission {
    /// Classify a submission response body.
    ///
    /// `jobId` always means asynchronous. Otherwise a terminal status means
    /// the result is final, a bare `id` means a job to poll, and a body with
    /// neither an id nor a status is a finished analysis. A non-terminal
    /// status without any id is a decode error.
    pub fn from_response(body: Value) -> Result<Self> {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        let scope = if body.get("jobId").is_some() || body.get("id").is_some() {
            body
        } else {
            unwrap_data(body)
        };

        if let Some(job_id) = id_field(&scope, "jobId") {
            return Ok(Self::Accepted { job_id, message });
        }

        let result: AnalysisResult = serde_json::from_value(scope)
            .map_err(|e| ClientError::decode(format!("unexpected submission response: {e}")))?;

        if result.status.is_some_and(|s| s.is_terminal()) {
            return Ok(Self::Completed(result));
        }
        match (result.id.clone(), result.status) {
            (Some(job_id), _) if !job_id.is_empty() => Ok(Self::Accepted { job_id, message }),
            (_, None) => Ok(Self::Completed(result)),
            // Still running, but nothing to poll.
            (_, Some(status)) => Err(ClientError::decode(format!(
                "submission reported {status} without a job id"
            ))),
        }
    }

    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Accepted { job_id, .. } => Some(job_id),
            Self::Completed(result) => result.id.as_deref(),
        }
    }
}

fn id_field(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Uploads documents for analysis.
#[derive(Debug, Clone)]
pub struct JobSubmitter {
    api: Arc<BackendApi>,
    session: SessionProjector,
    max_document_bytes: usize,
}

impl JobSubmitter {
    pub fn new(api: Arc<BackendApi>, session: SessionProjector) -> Self {
        Self {
            api,
            session,
            max_document_bytes: MAX_DOCUMENT_BYTES,
        }
    }

    pub fn with_max_document_bytes(mut self, max: usize) -> Self {
        self.max_document_bytes = max;
        self
    }

    /// Reject documents that would be refused anyway, without a round trip.
    pub fn validate(&self, document: &Document) -> Result<()> {
        if document.is_empty() {
            return Err(ClientError::validation(format!(
                "{} is empty",
                document.file_name
            )));
        }
        if document.len() > self.max_document_bytes {
            return Err(ClientError::validation(format!(
                "{} is {} bytes; the limit is {} bytes",
                document.file_name,
                document.len(),
                self.max_document_bytes
            )));
        }
        Ok(())
    }

    /// Submit a document for analysis.
    ///
    /// Validation and the session gate both run before any network call.
    #[instrument(skip_all, fields(file_name = %document.file_name, bytes = document.len()))]
    pub async fn submit(&self, document: Document) -> Result<Submission> {
        self.validate(&document)?;
        self.session.gate()?;

        let submission = self.api.submit_document(document).await?;
        match &submission {
            Submission::Accepted { job_id, .. } => info!(%job_id, "Document accepted for analysis"),
            Submission::Completed(result) => {
                info!(score = ?result.score, "Document analysed synchronously")
            }
        }
        Ok(submission)
    }
}
