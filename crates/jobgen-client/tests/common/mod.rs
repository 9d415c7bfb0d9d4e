//! In-process mock of the jobgen backend.

#![allow(dead_code)]

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use jobgen_client::{
    ClientConfig, Clock, JobgenClient, ManualClock, RecordingTimer, RefreshMode,
};
use jsonwebtoken::{EncodingKey, Header, encode};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

pub const EMAIL: &str = "ada@example.com";
pub const PASSWORD: &str = "correct horse";
const SECRET: &[u8] = b"integration-test-secret";

#[derive(Serialize)]
struct Claims {
    sub: String,
    exp: i64,
    iat: i64,
    jti: u64,
}

/// Mint an HS256 token expiring at `exp_secs`.
pub fn mint_token(exp_secs: i64, jti: u64) -> String {
    let claims = Claims {
        sub: "user-1".to_string(),
        exp: exp_secs,
        iat: exp_secs - 60,
        jti,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET)).expect("mint token")
}

/// One scripted answer of the status routes.
pub enum StatusStep {
    Reply(StatusCode, Value),
    /// Sleep before answering `Processing`, long enough to trip the client timeout.
    Stall(Duration),
    /// Wait for [`MockState::release`], then answer `Completed`.
    Hold,
}

impl StatusStep {
    pub fn status(status: &str) -> Self {
        Self::Reply(StatusCode::OK, json!({"id": "job-123", "status": status}))
    }

    pub fn completed(score: u32) -> Self {
        Self::Reply(
            StatusCode::OK,
            json!({
                "id": "job-123",
                "status": "Completed",
                "score": score,
                "suggestions": [{"id": "s1", "type": "skills", "content": "List Rust first", "applied": false}]
            }),
        )
    }

    pub fn failed(message: &str) -> Self {
        Self::Reply(
            StatusCode::OK,
            json!({"id": "job-123", "status": "Failed", "processingError": message}),
        )
    }
}

pub struct MockState {
    pub clock: Arc<ManualClock>,
    /// Omit `refresh_token` from bodies; it only travels as a cookie.
    pub cookie_only: bool,

    pub login_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub logout_calls: AtomicUsize,
    pub submit_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
    pub matches_calls: AtomicUsize,

    issued: AtomicU64,
    pub valid_tokens: Mutex<HashSet<String>>,
    pub refresh_token: Mutex<Option<String>>,
    pub status_script: Mutex<VecDeque<StatusStep>>,
    pub submit_reply: Mutex<Option<(StatusCode, Value)>>,
    pub uploads: Mutex<Vec<(String, usize)>>,
    pub matches_query: Mutex<Vec<(u32, u32)>>,
    pub release: Notify,
}

impl MockState {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            cookie_only: false,
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
            matches_calls: AtomicUsize::new(0),
            issued: AtomicU64::new(0),
            valid_tokens: Mutex::new(HashSet::new()),
            refresh_token: Mutex::new(None),
            status_script: Mutex::new(VecDeque::new()),
            submit_reply: Mutex::new(None),
            uploads: Mutex::new(Vec::new()),
            matches_query: Mutex::new(Vec::new()),
            release: Notify::new(),
        }
    }

    /// Issue a fresh pair. Every access token expires strictly later than the last.
    fn issue(&self) -> (String, String) {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let exp = self.clock.now_ms() / 1000 + 60 + n as i64;
        let access = mint_token(exp, n);
        let refresh = format!("refresh-{n}");
        self.valid_tokens.lock().insert(access.clone());
        *self.refresh_token.lock() = Some(refresh.clone());
        (access, refresh)
    }

    /// Make the backend reject every access token issued so far.
    pub fn revoke_access_tokens(&self) {
        self.valid_tokens.lock().clear();
    }

    pub fn revoke_refresh_token(&self) {
        *self.refresh_token.lock() = None;
    }

    pub fn script(&self, steps: impl IntoIterator<Item = StatusStep>) {
        self.status_script.lock().extend(steps);
    }

    fn authorize(&self, headers: &HeaderMap) -> Result<(), Response> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        match token {
            Some(token) if self.valid_tokens.lock().contains(token) => Ok(()),
            _ => Err(error_response(
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Invalid or expired token",
            )),
        }
    }

    fn token_response(&self, access: String, refresh: String, user: Option<Value>) -> Response {
        let mut data = json!({ "access_token": access });
        if !self.cookie_only {
            data["refresh_token"] = json!(refresh);
        }
        if let Some(user) = user {
            data["user"] = user;
        }
        let cookie = format!("refresh_token={refresh}; Path=/; HttpOnly");
        (
            [(header::SET_COOKIE, cookie)],
            Json(json!({"success": true, "message": "ok", "data": data})),
        )
            .into_response()
    }
}

fn error_response(status: StatusCode, code: &str, message: &str) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "message": "Request failed",
            "error": {"code": code, "message": message}
        })),
    )
        .into_response()
}

#[derive(Deserialize)]
struct LoginBody {
    email: String,
    password: String,
}

async fn login(State(state): State<Arc<MockState>>, Json(body): Json<LoginBody>) -> Response {
    state.login_calls.fetch_add(1, Ordering::SeqCst);
    if body.email != EMAIL || body.password != PASSWORD {
        return error_response(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Invalid credentials");
    }
    let (access, refresh) = state.issue();
    let user = json!({"id": "user-1", "email": EMAIL, "full_name": "Ada Lovelace", "role": "user"});
    state.token_response(access, refresh, Some(user))
}

async fn refresh(State(state): State<Arc<MockState>>, headers: HeaderMap, body: Bytes) -> Response {
    state.refresh_calls.fetch_add(1, Ordering::SeqCst);

    let from_body = serde_json::from_slice::<Value>(&body)
        .ok()
        .and_then(|v| v.get("refresh_token").and_then(Value::as_str).map(str::to_string));
    let from_cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .filter_map(|c| c.trim().strip_prefix("refresh_token="))
                .next()
                .map(str::to_string)
        });

    let presented = from_body.or(from_cookie);
    let expected = state.refresh_token.lock().clone();
    if presented.is_none() || presented != expected {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Invalid or expired refresh token",
        );
    }

    let (access, refresh) = state.issue();
    state.token_response(access, refresh, None)
}

async fn logout(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    state.logout_calls.fetch_add(1, Ordering::SeqCst);
    if let Err(rejection) = state.authorize(&headers) {
        return rejection;
    }
    state.revoke_access_tokens();
    state.revoke_refresh_token();
    Json(json!({"success": true, "message": "Logged out successfully"})).into_response()
}

async fn submit(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    state.submit_calls.fetch_add(1, Ordering::SeqCst);
    if let Err(rejection) = state.authorize(&headers) {
        return rejection;
    }

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("file") {
            let name = field.file_name().unwrap_or_default().to_string();
            let len = field.bytes().await.map(|b| b.len()).unwrap_or_default();
            state.uploads.lock().push((name, len));
        }
    }

    match state.submit_reply.lock().clone() {
        Some((status, body)) => (status, Json(body)).into_response(),
        None => (
            StatusCode::ACCEPTED,
            Json(json!({"message": "CV parsing job accepted.", "jobId": "job-123"})),
        )
            .into_response(),
    }
}

async fn status(state: Arc<MockState>, headers: HeaderMap) -> Response {
    state.status_calls.fetch_add(1, Ordering::SeqCst);
    if let Err(rejection) = state.authorize(&headers) {
        return rejection;
    }

    let step = state.status_script.lock().pop_front();
    match step {
        Some(StatusStep::Reply(status, body)) => (status, Json(body)).into_response(),
        Some(StatusStep::Stall(delay)) => {
            tokio::time::sleep(delay).await;
            Json(json!({"id": "job-123", "status": "Processing"})).into_response()
        }
        Some(StatusStep::Hold) => {
            state.release.notified().await;
            Json(json!({"id": "job-123", "status": "Completed", "score": 99})).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(json!({"error": "job not found"}))).into_response(),
    }
}

async fn status_by_resource(
    State(state): State<Arc<MockState>>,
    Path(_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    status(state, headers).await
}

async fn status_by_parse_route(
    State(state): State<Arc<MockState>>,
    Path(_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    status(state, headers).await
}

#[derive(Deserialize)]
struct MatchesQuery {
    page: u32,
    limit: u32,
}

async fn matches(
    State(state): State<Arc<MockState>>,
    Query(query): Query<MatchesQuery>,
    headers: HeaderMap,
) -> Response {
    state.matches_calls.fetch_add(1, Ordering::SeqCst);
    if let Err(rejection) = state.authorize(&headers) {
        return rejection;
    }
    state.matches_query.lock().push((query.page, query.limit));

    Json(json!({
        "success": true,
        "message": "Matched jobs retrieved successfully",
        "data": {
            "items": [{
                "id": "listing-1",
                "title": "Rust Engineer",
                "company_name": "Acme",
                "location": "Remote",
                "posted_at": "2024-05-01T10:00:00Z",
                "apply_url": "https://acme.example/apply",
                "source": "RemoteOK",
                "match_score": 0.87,
                "extracted_skills": ["rust", "tokio"]
            }],
            "page": query.page,
            "limit": query.limit,
            "total": 1,
            "total_pages": 1,
            "has_next": false,
            "has_prev": query.page > 1
        }
    }))
    .into_response()
}

fn router(state: Arc<MockState>) -> Router {
    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
        .route("/auth/logout", post(logout))
        .route("/cv/parse", post(submit))
        .route("/cv/parse/{id}/status", get(status_by_parse_route))
        .route("/cv/{id}", get(status_by_resource))
        .route("/jobs/matched", get(matches));

    Router::new().nest("/api/v1", api).with_state(state)
}

pub struct MockBackend {
    pub state: Arc<MockState>,
    pub clock: Arc<ManualClock>,
    pub timer: RecordingTimer,
    pub base_url: String,
    task: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(configure: impl FnOnce(&mut MockState)) -> Self {
        let clock = Arc::new(ManualClock::starting_now());
        let mut state = MockState::new(Arc::clone(&clock));
        configure(&mut state);
        let state = Arc::new(state);

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock backend");
        let addr = listener.local_addr().expect("local addr");
        let app = router(Arc::clone(&state));
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.expect("mock backend");
        });

        Self {
            state,
            clock,
            timer: RecordingTimer::new(),
            base_url: format!("http://{addr}"),
            task,
        }
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::with_base_url(&self.base_url)
    }

    pub fn client(&self) -> JobgenClient {
        self.client_with(self.config())
    }

    pub fn cookie_client(&self) -> JobgenClient {
        let mut config = self.config();
        config.refresh_mode = RefreshMode::Cookie;
        self.client_with(config)
    }

    pub fn client_with(&self, config: ClientConfig) -> JobgenClient {
        JobgenClient::builder(config)
            .clock(Arc::clone(&self.clock) as Arc<dyn Clock>)
            .timer(Arc::new(self.timer.clone()))
            .build()
            .expect("build client")
    }

    /// Push the client clock past every token issued so far.
    pub fn expire_tokens(&self) {
        self.clock.advance(Duration::from_secs(3_600));
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
