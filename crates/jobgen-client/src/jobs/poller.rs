//! Job status poller.
//!
//! One task per job walks `Idle -> Polling -> {Completed, Failed, Cancelled,
//! TimedOut}`. Every transition is applied under the handle's gate after
//! checking the cancellation token, so once [`PollHandle::cancel`] returns no
//! further state change or event is published for that job, even if a fetch
//! was in flight.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::schedule::PollPolicy;
use super::timer::Timer;
use super::types::{AnalysisResult, Job, JobStatus};
use crate::credentials::SessionProjector;
use crate::error::{ClientError, Result};

const EVENT_CAPACITY: usize = 256;

/// Fetches the current status of a job.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self, job_id: &str) -> Result<AnalysisResult>;
}

/// Job lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// A non-terminal status arrived; the next fetch is scheduled.
    Progress { job: Job, next_delay_ms: u64 },
    /// A fetch failed transiently and will be retried.
    Retrying {
        job_id: String,
        attempt: u32,
        error: String,
        next_delay_ms: u64,
    },
    Completed { job: Job },
    /// The job failed, or polling hit a non-retryable error (`job` is `None`).
    Failed {
        job_id: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job: Option<Job>,
    },
    Cancelled { job_id: String },
    TimedOut { job_id: String, attempts: u32 },
}

impl JobEvent {
    pub fn job_id(&self) -> &str {
        match self {
            Self::Progress { job, .. } | Self::Completed { job } => &job.id,
            Self::Retrying { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Cancelled { job_id }
            | Self::TimedOut { job_id, .. } => job_id,
        }
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Progress { .. } | Self::Retrying { .. })
    }
}

/// Poller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PollState {
    Idle,
    Polling { attempt: u32 },
    Completed,
    Failed,
    Cancelled,
    TimedOut,
}

impl PollState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Idle | Self::Polling { .. })
    }

    fn settled(job: &Job) -> Self {
        match job.status {
            JobStatus::Completed => Self::Completed,
            _ => Self::Failed,
        }
    }
}

/// State shared between a poll task and its handle.
struct PollShared {
    job_id: String,
    token: CancellationToken,
    gate: Mutex<()>,
    state: watch::Sender<PollState>,
    events: broadcast::Sender<JobEvent>,
}

impl PollShared {
    /// Publish a transition unless the poll was cancelled. Returns `false` if it was.
    fn transition(&self, state: Option<PollState>, event: Option<JobEvent>) -> bool {
        let _gate = self.gate.lock();
        if self.token.is_cancelled() {
            return false;
        }
        if let Some(state) = state {
            self.state.send_replace(state);
        }
        if let Some(event) = event {
            // No subscribers is fine.
            let _ = self.events.send(event);
        }
        true
    }

    fn cancel(&self) -> bool {
        let _gate = self.gate.lock();
        if self.token.is_cancelled() || self.state.borrow().is_terminal() {
            return false;
        }
        self.token.cancel();
        self.state.send_replace(PollState::Cancelled);
        let _ = self.events.send(JobEvent::Cancelled {
            job_id: self.job_id.clone(),
        });
        true
    }
}

/// Polls analysis jobs until they settle.
pub struct JobPoller {
    source: Arc<dyn StatusSource>,
    policy: PollPolicy,
    timer: Arc<dyn Timer>,
    session: Option<SessionProjector>,
    events: broadcast::Sender<JobEvent>,
    /// Jobs that reached a terminal status, served without a network call.
    terminal: DashMap<String, Job>,
    /// Jobs with a poll task running.
    active: DashMap<String, ()>,
}

impl JobPoller {
    pub fn new(source: Arc<dyn StatusSource>, policy: PollPolicy, timer: Arc<dyn Timer>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source,
            policy,
            timer,
            session: None,
            events,
            terminal: DashMap::new(),
            active: DashMap::new(),
        }
    }

    /// Refuse to start polling without a session.
    pub fn with_session(mut self, session: SessionProjector) -> Self {
        self.session = Some(session);
        self
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Terminal job cached from an earlier poll.
    pub fn cached(&self, job_id: &str) -> Option<Job> {
        self.terminal.get(job_id).map(|entry| entry.value().clone())
    }

    /// Forget every settled job, e.g. when the session that owned them ends.
    pub fn clear_settled(&self) {
        let count = self.terminal.len();
        self.terminal.clear();
        if count > 0 {
            debug!(count, "Dropped settled jobs");
        }
    }

    /// Start polling `job_id` in a background task.
    ///
    /// The session gate runs first. A job that already settled is then
    /// returned from the cache without a network call or event. At most one
    /// poll task runs per job id.
    pub fn start(self: &Arc<Self>, job_id: impl Into<String>) -> Result<PollHandle> {
        let job_id = job_id.into();

        if let Some(session) = &self.session {
            session.gate()?;
        }

        if let Some(job) = self.cached(&job_id) {
            debug!(%job_id, status = %job.status, "Job already settled; serving cached result");
            let (state, _) = watch::channel(PollState::settled(&job));
            return Ok(PollHandle {
                shared: Arc::new(PollShared {
                    job_id,
                    token: CancellationToken::new(),
                    gate: Mutex::new(()),
                    state,
                    events: self.events.clone(),
                }),
                task: None,
                cached: Some(job),
            });
        }

        if self.active.insert(job_id.clone(), ()).is_some() {
            return Err(ClientError::validation(format!(
                "job {job_id} is already being polled"
            )));
        }

        let (state, _) = watch::channel(PollState::Idle);
        let shared = Arc::new(PollShared {
            job_id: job_id.clone(),
            token: CancellationToken::new(),
            gate: Mutex::new(()),
            state,
            events: self.events.clone(),
        });

        let poller = Arc::clone(self);
        let task_shared = Arc::clone(&shared);
        let task = tokio::spawn(async move {
            let _active = ActiveGuard {
                poller: &poller,
                job_id: &task_shared.job_id,
            };
            poller.run(&task_shared).await
        });

        Ok(PollHandle {
            shared,
            task: Some(task),
            cached: None,
        })
    }

    /// Poll `job_id` to completion.
    pub async fn poll(self: &Arc<Self>, job_id: impl Into<String>) -> Result<Job> {
        self.start(job_id)?.wait().await
    }

    #[instrument(skip_all, fields(job_id = %shared.job_id))]
    async fn run(&self, shared: &PollShared) -> Result<Job> {
        let job_id = shared.job_id.as_str();
        let mut job = Job::queued(job_id);
        let mut attempt: u32 = 0;

        loop {
            if self.policy.exhausted(attempt) {
                warn!(attempts = attempt, "Poll ceiling reached");
                let event = JobEvent::TimedOut {
                    job_id: job_id.to_string(),
                    attempts: attempt,
                };
                if !shared.transition(Some(PollState::TimedOut), Some(event)) {
                    return Err(ClientError::Cancelled);
                }
                return Err(ClientError::Timeout {
                    job_id: job_id.to_string(),
                    attempts: attempt,
                });
            }

            if !shared.transition(Some(PollState::Polling { attempt }), None) {
                return Err(ClientError::Cancelled);
            }

            let fetched = tokio::select! {
                biased;
                _ = shared.token.cancelled() => return Err(ClientError::Cancelled),
                fetched = self.source.fetch_status(job_id) => fetched,
            };

            let delay = match fetched {
                Ok(update) => {
                    let mut next = job.clone();
                    next.apply(update);

                    if next.is_terminal() {
                        return self.settle(shared, next);
                    }

                    let delay = self.policy.delay(attempt);
                    debug!(
                        status = %next.status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Job still running"
                    );
                    let event = JobEvent::Progress {
                        job: next.clone(),
                        next_delay_ms: delay.as_millis() as u64,
                    };
                    if !shared.transition(None, Some(event)) {
                        return Err(ClientError::Cancelled);
                    }
                    job = next;
                    delay
                }
                Err(e) if e.is_transient() => {
                    let delay = self.policy.error_delay(attempt);
                    warn!(
                        error = %e,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Status fetch failed; retrying"
                    );
                    let event = JobEvent::Retrying {
                        job_id: job_id.to_string(),
                        attempt,
                        error: e.to_string(),
                        next_delay_ms: delay.as_millis() as u64,
                    };
                    if !shared.transition(None, Some(event)) {
                        return Err(ClientError::Cancelled);
                    }
                    delay
                }
                Err(e) => {
                    warn!(error = %e, "Status fetch failed permanently");
                    let event = JobEvent::Failed {
                        job_id: job_id.to_string(),
                        message: e.user_message(),
                        job: None,
                    };
                    if !shared.transition(Some(PollState::Failed), Some(event)) {
                        return Err(ClientError::Cancelled);
                    }
                    return Err(e);
                }
            };

            attempt = attempt.saturating_add(1);
            if self.policy.exhausted(attempt) {
                continue;
            }

            tokio::select! {
                biased;
                _ = shared.token.cancelled() => return Err(ClientError::Cancelled),
                _ = self.timer.sleep(delay) => {}
            }
        }
    }

    fn settle(&self, shared: &PollShared, job: Job) -> Result<Job> {
        let event = match job.failure_message() {
            None => JobEvent::Completed { job: job.clone() },
            Some(message) => JobEvent::Failed {
                job_id: job.id.clone(),
                message: message.to_string(),
                job: Some(job.clone()),
            },
        };

        if !shared.transition(Some(PollState::settled(&job)), Some(event)) {
            return Err(ClientError::Cancelled);
        }

        info!(status = %job.status, attempts = job.attempt, "Job settled");
        self.terminal.insert(job.id.clone(), job.clone());
        Ok(job)
    }
}

impl std::fmt::Debug for JobPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobPoller")
            .field("policy", &self.policy)
            .field("active", &self.active.len())
            .field("settled", &self.terminal.len())
            .finish()
    }
}

struct ActiveGuard<'a> {
    poller: &'a JobPoller,
    job_id: &'a str,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.poller.active.remove(self.job_id);
    }
}

/// Handle to one poll. Dropping it cancels the poll.
pub struct PollHandle {
    shared: Arc<PollShared>,
    task: Option<JoinHandle<Result<Job>>>,
    cached: Option<Job>,
}

impl PollHandle {
    pub fn job_id(&self) -> &str {
        &self.shared.job_id
    }

    /// Stop polling. Safe in any state; returns whether this call cancelled it.
    pub fn cancel(&self) -> bool {
        let cancelled = self.shared.cancel();
        if cancelled {
            info!(job_id = %self.shared.job_id, "Polling cancelled");
        }
        cancelled
    }

    pub fn state(&self) -> PollState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<PollState> {
        self.shared.state.subscribe()
    }

    /// Wait for the poll to settle.
    ///
    /// A job that finished with status `Failed` is `Ok`; errors are reserved
    /// for polling itself failing, timing out or being cancelled.
    pub async fn wait(mut self) -> Result<Job> {
        if let Some(job) = self.cached.take() {
            return Ok(job);
        }
        let Some(task) = self.task.as_mut() else {
            return Err(ClientError::Cancelled);
        };

        let outcome = task.await;
        self.task = None;
        match outcome {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(_) => Err(ClientError::Cancelled),
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.shared.cancel();
        }
    }
}

impl std::fmt::Debug for PollHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollHandle")
            .field("job_id", &self.shared.job_id)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::RecordingTimer;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    enum Step {
        Status(JobStatus),
        Failed(&'static str),
        Transient,
        Fatal,
    }

    /// Replays scripted status responses, optionally holding each fetch.
    struct ScriptedSource {
        steps: Mutex<VecDeque<Step>>,
        calls: AtomicUsize,
        hold: bool,
        started: Notify,
        release: Notify,
    }

    impl ScriptedSource {
        fn new(steps: Vec<Step>) -> Arc<Self> {
            Self::build(steps, false)
        }

        fn held(steps: Vec<Step>) -> Arc<Self> {
            Self::build(steps, true)
        }

        fn build(steps: Vec<Step>, hold: bool) -> Arc<Self> {
            Arc::new(Self {
                steps: Mutex::new(steps.into()),
                calls: AtomicUsize::new(0),
                hold,
                started: Notify::new(),
                release: Notify::new(),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn transient_error() -> ClientError {
        crate::http::ensure_crypto_provider();
        ClientError::Network(
            reqwest::Client::new()
                .get("http://[::1")
                .build()
                .expect_err("malformed url"),
        )
    }

    #[async_trait]
    impl StatusSource for ScriptedSource {
        async fn fetch_status(&self, _job_id: &str) -> Result<AnalysisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hold {
                self.started.notify_one();
                self.release.notified().await;
            }
            let step = self.steps.lock().pop_front().expect("unexpected fetch");
            match step {
                Step::Status(status) => Ok(AnalysisResult {
                    status: Some(status),
                    score: (status == JobStatus::Completed).then_some(78.0),
                    ..Default::default()
                }),
                Step::Failed(message) => Ok(AnalysisResult {
                    status: Some(JobStatus::Failed),
                    processing_error: Some(message.to_string()),
                    ..Default::default()
                }),
                Step::Transient => Err(transient_error()),
                Step::Fatal => Err(ClientError::Upstream {
                    status: reqwest::StatusCode::NOT_FOUND,
                    body: crate::api::ErrorBody::new("job not found"),
                }),
            }
        }
    }

    fn poller(source: Arc<ScriptedSource>, timer: &RecordingTimer, policy: PollPolicy) -> Arc<JobPoller> {
        Arc::new(JobPoller::new(source, policy, Arc::new(timer.clone())))
    }

    fn drain(rx: &mut broadcast::Receiver<JobEvent>) -> Vec<JobEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn processing_ramps_delays_until_completed() {
        let source = ScriptedSource::new(vec![
            Step::Status(JobStatus::Processing),
            Step::Status(JobStatus::Processing),
            Step::Status(JobStatus::Processing),
            Step::Status(JobStatus::Completed),
        ]);
        let timer = RecordingTimer::new();
        let poller = poller(source.clone(), &timer, PollPolicy::default());
        let mut events = poller.subscribe();

        let job = poller.poll("job-123").await.unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.attempt, 4);
        assert_eq!(timer.delays_ms(), vec![2_000, 2_500, 3_000]);
        assert_eq!(source.calls(), 4);

        let events = drain(&mut events);
        assert_eq!(events.iter().filter(|e| matches!(e, JobEvent::Progress { .. })).count(), 3);
        assert!(matches!(events.last(), Some(JobEvent::Completed { .. })));
    }

    #[tokio::test]
    async fn transient_error_uses_fallback_delay_then_fails_once() {
        let source = ScriptedSource::new(vec![Step::Transient, Step::Failed("bad format")]);
        let timer = RecordingTimer::new();
        let poller = poller(source.clone(), &timer, PollPolicy::default());
        let mut events = poller.subscribe();

        let job = poller.poll("job-1").await.unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure_message(), Some("bad format"));
        assert_eq!(timer.delays_ms(), vec![4_000]);
        assert_eq!(source.calls(), 2);

        let events = drain(&mut events);
        assert!(matches!(events[0], JobEvent::Retrying { attempt: 0, next_delay_ms: 4_000, .. }));
        let failed: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, JobEvent::Failed { .. }))
            .collect();
        assert_eq!(failed.len(), 1);
        assert!(matches!(failed[0], JobEvent::Failed { message, .. } if message == "bad format"));
    }

    #[tokio::test]
    async fn settled_job_is_served_from_cache() {
        let source = ScriptedSource::new(vec![Step::Status(JobStatus::Completed)]);
        let timer = RecordingTimer::new();
        let poller = poller(source.clone(), &timer, PollPolicy::default());

        let first = poller.poll("job-1").await.unwrap();
        let mut events = poller.subscribe();
        let handle = poller.start("job-1").unwrap();
        assert_eq!(handle.state(), PollState::Completed);
        let second = handle.wait().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(source.calls(), 1);
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn cleared_cache_fetches_again() {
        let source = ScriptedSource::new(vec![
            Step::Status(JobStatus::Completed),
            Step::Failed("reprocessed"),
        ]);
        let timer = RecordingTimer::new();
        let poller = poller(source.clone(), &timer, PollPolicy::default());

        poller.poll("job-1").await.unwrap();
        poller.clear_settled();
        assert!(poller.cached("job-1").is_none());

        let job = poller.poll("job-1").await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn cancel_during_in_flight_fetch_discards_result() {
        let source = ScriptedSource::held(vec![Step::Status(JobStatus::Completed)]);
        let timer = RecordingTimer::new();
        let poller = poller(source.clone(), &timer, PollPolicy::default());
        let mut events = poller.subscribe();

        let handle = poller.start("job-1").unwrap();
        source.started.notified().await;
        assert_eq!(handle.state(), PollState::Polling { attempt: 0 });

        assert!(handle.cancel());
        source.release.notify_one();
        tokio::task::yield_now().await;

        assert_eq!(handle.state(), PollState::Cancelled);
        assert!(!handle.cancel());
        assert!(matches!(handle.wait().await, Err(ClientError::Cancelled)));
        assert!(poller.cached("job-1").is_none());

        let events = drain(&mut events);
        assert_eq!(events, vec![JobEvent::Cancelled { job_id: "job-1".into() }]);
    }

    #[tokio::test]
    async fn ceiling_times_out() {
        let source = ScriptedSource::new(vec![
            Step::Status(JobStatus::Queued),
            Step::Status(JobStatus::Processing),
        ]);
        let timer = RecordingTimer::new();
        let poller = poller(source.clone(), &timer, PollPolicy::default().with_max_attempts(2));
        let mut events = poller.subscribe();

        let handle = poller.start("job-1").unwrap();
        let mut state = handle.watch_state();
        let err = handle.wait().await.unwrap_err();

        assert!(matches!(err, ClientError::Timeout { attempts: 2, .. }));
        assert_eq!(source.calls(), 2);
        assert_eq!(timer.delays_ms(), vec![2_000]);
        assert_eq!(*state.borrow_and_update(), PollState::TimedOut);
        assert!(matches!(drain(&mut events).last(), Some(JobEvent::TimedOut { attempts: 2, .. })));
    }

    #[tokio::test]
    async fn non_transient_error_stops_polling() {
        let source = ScriptedSource::new(vec![Step::Fatal]);
        let timer = RecordingTimer::new();
        let poller = poller(source.clone(), &timer, PollPolicy::default());
        let mut events = poller.subscribe();

        let err = poller.poll("job-1").await.unwrap_err();

        assert_eq!(err.status(), Some(reqwest::StatusCode::NOT_FOUND));
        assert!(timer.delays().is_empty());
        assert!(matches!(
            drain(&mut events).as_slice(),
            [JobEvent::Failed { job: None, message, .. }] if message == "job not found"
        ));
    }

    #[tokio::test]
    async fn concurrent_poll_of_same_job_is_rejected() {
        let source = ScriptedSource::held(vec![Step::Status(JobStatus::Completed)]);
        let timer = RecordingTimer::new();
        let poller = poller(source.clone(), &timer, PollPolicy::default());

        let first = poller.start("job-1").unwrap();
        assert!(matches!(poller.start("job-1"), Err(ClientError::Validation(_))));

        source.started.notified().await;
        source.release.notify_one();
        assert_eq!(first.wait().await.unwrap().status, JobStatus::Completed);
        assert!(poller.start("job-1").is_ok());
    }
}
