//! Authenticated asynchronous client for the jobgen CV analysis service.
//!
//! The crate keeps a session-bound bearer credential fresh, submits CV
//! documents for analysis and polls the resulting jobs to completion.
//!
//! # Architecture
//!
//! - [`CredentialStore`]: holds the current credential and coalesces refreshes
//! - [`TokenRefresher`]: exchanges a refresh token for a new access token
//! - [`ApiGateway`]: attaches the bearer credential and normalises error bodies
//! - [`JobSubmitter`]: uploads a document and returns a job id or a result
//! - [`JobPoller`]: polls a job with a capped linear backoff
//! - [`SessionProjector`]: derives UI-facing session state and gates job operations
//! - [`AnalysisWorkflow`]: submit, poll, then fetch matched jobs
//!
//! [`JobgenClient`] wires all of the above from a [`ClientConfig`].

pub mod api;
pub mod client;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod jobs;
pub mod workflow;

pub use api::{
    ApiGateway, ApiRequest, ApiResponse, AuthApi, BackendApi, ErrorBody, LoginOutcome, UserProfile,
};
pub use client::{ClientBuilder, JobgenClient};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ClientConfig, ProxyConfig, StatusRoute};
pub use credentials::{
    Credential, CredentialEvent, CredentialStore, HttpTokenRefresher, RefreshError, RefreshMode,
    SessionProjector, SessionState, TokenGrant, TokenRefresher,
};
pub use error::{ClientError, ErrorTag, Result};
pub use jobs::{
    AnalysisResult, Document, Job, JobEvent, JobPoller, JobStatus, JobSubmitter, MatchedJob,
    MatchedJobsPage, PollHandle, PollPolicy, PollState, RecordingTimer, StatusSource, Submission,
    Suggestion, Timer, TokioTimer,
};
pub use workflow::{AnalysisReport, AnalysisWorkflow, Started};
