//! Analysis jobs: submission, polling and the result model.

mod poller;
mod schedule;
mod submitter;
mod timer;
mod types;

pub use poller::{JobEvent, JobPoller, PollHandle, PollState, StatusSource};
pub use schedule::PollPolicy;
pub use submitter::{Document, JobSubmitter, MAX_DOCUMENT_BYTES, Submission};
pub use timer::{RecordingTimer, Timer, TokioTimer};
pub use types::{
    AnalysisResult, GENERIC_FAILURE_MESSAGE, Job, JobStatus, MatchedJob, MatchedJobsPage,
    Suggestion,
};
