//! Client facade wiring every component from a [`ClientConfig`].

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::api::{ApiGateway, AuthApi, BackendApi, LoginOutcome};
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::credentials::{
    Credential, CredentialEvent, CredentialStore, HttpTokenRefresher, SessionProjector,
    SessionState, TokenGrant, TokenRefresher,
};
use crate::error::Result;
use crate::http::build_http_client;
use crate::jobs::{
    Document, Job, JobEvent, JobPoller, JobSubmitter, MatchedJobsPage, PollHandle, StatusSource,
    Submission, Timer, TokioTimer,
};
use crate::workflow::{AnalysisReport, AnalysisWorkflow};

/// Builder for [`JobgenClient`] with injectable time sources.
pub struct ClientBuilder {
    config: ClientConfig,
    http: Option<reqwest::Client>,
    clock: Option<Arc<dyn Clock>>,
    timer: Option<Arc<dyn Timer>>,
    refresher: Option<Arc<dyn TokenRefresher>>,
}

impl ClientBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            http: None,
            clock: None,
            timer: None,
            refresher: None,
        }
    }

    /// Use an existing `reqwest::Client`. It must have a cookie store for cookie refresh mode.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn timer(mut self, timer: Arc<dyn Timer>) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Replace the HTTP refresher, e.g. for a social-provider token source.
    pub fn refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    pub fn build(self) -> Result<JobgenClient> {
        let config = self.config;
        config.validate()?;

        let api_root = config.api_root()?;
        let http = match self.http {
            Some(http) => http,
            None => build_http_client(&config)?,
        };
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let timer: Arc<dyn Timer> = self.timer.unwrap_or_else(|| Arc::new(TokioTimer));

        let refresher: Arc<dyn TokenRefresher> = match self.refresher {
            Some(refresher) => refresher,
            None => {
                let mut endpoint = api_root.clone();
                if let Ok(mut path) = endpoint.path_segments_mut() {
                    path.pop_if_empty().extend(["auth", "refresh"]);
                }
                Arc::new(HttpTokenRefresher::new(
                    http.clone(),
                    endpoint,
                    config.refresh_mode,
                ))
            }
        };

        let credentials = Arc::new(
            CredentialStore::new(refresher, clock).with_refresh_skew(config.refresh_skew_ms),
        );
        let session = SessionProjector::new(Arc::clone(&credentials));
        let gateway = ApiGateway::new(http, api_root, Arc::clone(&credentials));
        let api = Arc::new(BackendApi::new(gateway.clone(), config.status_route));
        let auth = AuthApi::new(gateway);
        let submitter = JobSubmitter::new(Arc::clone(&api), session.clone())
            .with_max_document_bytes(config.max_document_bytes);
        let poller = Arc::new(
            JobPoller::new(
                Arc::clone(&api) as Arc<dyn StatusSource>,
                config.poll.clone(),
                timer,
            )
            .with_session(session.clone()),
        );

        debug!(base_url = %config.base_url, refresh_mode = ?config.refresh_mode, "Client initialized");

        Ok(JobgenClient {
            config,
            credentials,
            session,
            api,
            auth,
            submitter,
            poller,
        })
    }
}

/// Entry point to the jobgen backend.
#[derive(Debug, Clone)]
pub struct JobgenClient {
    config: ClientConfig,
    credentials: Arc<CredentialStore>,
    session: SessionProjector,
    api: Arc<BackendApi>,
    auth: AuthApi,
    submitter: JobSubmitter,
    poller: Arc<JobPoller>,
}

impl JobgenClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        ClientBuilder::new(config).build()
    }

    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn api(&self) -> &Arc<BackendApi> {
        &self.api
    }

    pub fn poller(&self) -> &Arc<JobPoller> {
        &self.poller
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn subscribe_credentials(&self) -> broadcast::Receiver<CredentialEvent> {
        self.credentials.subscribe()
    }

    pub fn subscribe_jobs(&self) -> broadcast::Receiver<JobEvent> {
        self.poller.subscribe()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome> {
        let outcome = self.auth.login(email, password).await?;
        self.poller.clear_settled();
        Ok(outcome)
    }

    /// Establish a session from a token pair obtained elsewhere (social provider exchange).
    pub fn establish(&self, grant: TokenGrant) -> Arc<Credential> {
        self.poller.clear_settled();
        self.credentials.establish(grant)
    }

    /// Resume a persisted session.
    pub fn restore(&self, snapshot: Credential) -> Arc<Credential> {
        self.poller.clear_settled();
        self.credentials.restore(snapshot)
    }

    /// End the session. Settled jobs cached under it are forgotten.
    pub async fn logout(&self) -> bool {
        let signed_out = self.auth.logout().await;
        self.poller.clear_settled();
        signed_out
    }

    pub async fn submit(&self, document: Document) -> Result<Submission> {
        self.submitter.submit(document).await
    }

    pub fn start_poll(&self, job_id: impl Into<String>) -> Result<PollHandle> {
        self.poller.start(job_id)
    }

    pub async fn poll(&self, job_id: impl Into<String>) -> Result<Job> {
        self.poller.poll(job_id).await
    }

    pub async fn fetch_matched_jobs(&self, page: u32, limit: u32) -> Result<MatchedJobsPage> {
        self.api.fetch_matched_jobs(page, limit).await
    }

    pub fn workflow(&self) -> AnalysisWorkflow {
        AnalysisWorkflow::new(
            self.submitter.clone(),
            Arc::clone(&self.poller),
            Arc::clone(&self.api),
        )
    }

    /// Submit, poll and fetch matched jobs.
    pub async fn analyze(&self, document: Document) -> Result<AnalysisReport> {
        self.workflow().run(document).await
    }
}
