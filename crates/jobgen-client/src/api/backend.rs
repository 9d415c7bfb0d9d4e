//! Typed calls against the analysis backend.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::envelope::unwrap_data;
use super::gateway::{ApiGateway, ApiRequest, ApiResponse};
use crate::config::StatusRoute;
use crate::error::{ClientError, Result};
use crate::jobs::{AnalysisResult, Document, MatchedJobsPage, StatusSource, Submission};

pub const DEFAULT_MATCHES_PAGE: u32 = 1;
pub const DEFAULT_MATCHES_LIMIT: u32 = 10;

/// Backend endpoints with caller-side re-authentication.
#[derive(Debug, Clone)]
pub struct BackendApi {
    gateway: ApiGateway,
    status_route: StatusRoute,
}

impl BackendApi {
    pub fn new(gateway: ApiGateway, status_route: StatusRoute) -> Self {
        Self {
            gateway,
            status_route,
        }
    }

    pub fn gateway(&self) -> &ApiGateway {
        &self.gateway
    }

    /// Send `request`, and if the backend answers 401, refresh once and retry once.
    ///
    /// The refresh is keyed on the rejected token, so concurrent callers
    /// rejected with the same token share a single exchange.
    pub async fn call(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let store = self.gateway.credentials();
        let credential = store.get_valid_credential().await?;

        match self.gateway.send_with(&credential, request).await {
            Err(e) if e.is_unauthorized() => {
                info!(path = %request.path(), "Access token rejected; refreshing before one retry");
                let refreshed = store.refresh_rejected(&credential.access_token).await?;
                self.gateway.send_with(&refreshed, request).await
            }
            outcome => outcome,
        }
    }

    /// `POST /cv/parse`
    #[instrument(skip_all, fields(file_name = %document.file_name))]
    pub async fn submit_document(&self, document: Document) -> Result<Submission> {
        let request = ApiRequest::post("cv/parse").document(document);
        let response = self.call(&request).await?;
        debug!(status = %response.status, "Submission answered");
        Submission::from_response(response.value()?)
    }

    /// `GET /cv/{id}` or `GET /cv/parse/{id}/status`, depending on configuration.
    pub async fn fetch_status(&self, job_id: &str) -> Result<AnalysisResult> {
        let request = match self.status_route {
            StatusRoute::Resource => ApiRequest::get("cv").segment(job_id),
            StatusRoute::ParseStatus => ApiRequest::get("cv/parse")
                .segment(job_id)
                .segment("status"),
        };

        let body = unwrap_data(self.call(&request).await?.value()?);
        if body.is_null() {
            return Err(ClientError::decode(format!("empty status response for job {job_id}")));
        }
        serde_json::from_value(body)
            .map_err(|e| ClientError::decode(format!("unexpected status response: {e}")))
    }

    /// `GET /jobs/matched?page&limit`. Zero page or limit falls back to the defaults.
    #[instrument(skip(self))]
    pub async fn fetch_matched_jobs(&self, page: u32, limit: u32) -> Result<MatchedJobsPage> {
        let page = if page == 0 { DEFAULT_MATCHES_PAGE } else { page };
        let limit = if limit == 0 { DEFAULT_MATCHES_LIMIT } else { limit };
        let request = ApiRequest::get("jobs/matched")
            .query("page", page)
            .query("limit", limit);

        let body = unwrap_data(self.call(&request).await?.value()?);
        let matches = match body {
            // An empty result has been seen as `data: null`.
            Value::Null => MatchedJobsPage {
                page,
                limit,
                ..Default::default()
            },
            body => serde_json::from_value(body)
                .map_err(|e| ClientError::decode(format!("unexpected matched jobs response: {e}")))?,
        };

        debug!(count = matches.items.len(), total = matches.total, "Fetched matched jobs");
        Ok(matches)
    }
}

#[async_trait]
impl StatusSource for BackendApi {
    async fn fetch_status(&self, job_id: &str) -> Result<AnalysisResult> {
        BackendApi::fetch_status(self, job_id).await
    }
}
