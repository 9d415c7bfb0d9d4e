//! Authenticated request gateway.
//!
//! Attaches the bearer credential, normalises non-2xx bodies into
//! [`ErrorBody`] and never retries. A 401 is handed back to the caller;
//! [`super::BackendApi`] owns the single re-authentication attempt.

use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};
use url::Url;

use super::envelope::ErrorBody;
use crate::credentials::{Credential, CredentialStore};
use crate::error::{ClientError, Result};
use crate::jobs::Document;

/// Request payload.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    /// Sent as `multipart/form-data` under the `file` field.
    Document(Document),
}

/// A request relative to the API root.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub segments: Vec<String>,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: &str) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: &str) -> Self {
        Self::new(Method::POST, path)
    }

    /// Append one path segment. The value is percent-encoded, so opaque ids
    /// containing `/` stay a single segment.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body)
            .map_err(|e| ClientError::decode(format!("failed to encode request body: {e}")))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    pub fn document(mut self, document: Document) -> Self {
        self.body = RequestBody::Document(document);
        self
    }

    /// Path relative to the API root, for logging.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl ApiResponse {
    /// Deserialize the body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ClientError::decode(format!("unexpected response body ({}): {e}", self.status))
        })
    }

    /// Body as a JSON value; an empty body is `null`.
    pub fn value(&self) -> Result<Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        self.json()
    }
}

/// Sends requests on behalf of the current session.
#[derive(Debug, Clone)]
pub struct ApiGateway {
    http: Client,
    api_root: Url,
    credentials: Arc<CredentialStore>,
}

impl ApiGateway {
    pub fn new(http: Client, api_root: Url, credentials: Arc<CredentialStore>) -> Self {
        Self {
            http,
            api_root,
            credentials,
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    /// Absolute URL for a path relative to the API root.
    pub fn endpoint<S: AsRef<str>>(&self, segments: &[S]) -> Url {
        let mut url = self.api_root.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            path.extend(segments.iter().map(AsRef::as_ref));
        }
        url
    }

    /// Send `request` with a valid credential, refreshing it first if it expired.
    ///
    /// Fails with [`ClientError::Unauthenticated`] before any network call
    /// when no session exists.
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let credential = self.credentials.get_valid_credential().await?;
        self.send_with(&credential, request).await
    }

    /// Send `request` with an explicit credential.
    #[instrument(skip_all, fields(method = %request.method, path = %request.path()))]
    pub async fn send_with(
        &self,
        credential: &Credential,
        request: &ApiRequest,
    ) -> Result<ApiResponse> {
        let mut auth = HeaderValue::from_str(&credential.authorization_header())
            .map_err(|_| ClientError::unauthenticated("access token is not a valid header value"))?;
        auth.set_sensitive(true);

        let builder = self.build(request)?.header(AUTHORIZATION, auth);
        self.execute(builder).await
    }

    /// Send `request` without credentials (login, registration).
    #[instrument(skip_all, fields(method = %request.method, path = %request.path()))]
    pub async fn send_anonymous(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let builder = self.build(request)?;
        self.execute(builder).await
    }

    fn build(&self, request: &ApiRequest) -> Result<RequestBuilder> {
        let url = self.endpoint(&request.segments);
        let mut builder = self.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }

        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            // Multipart forms are single-use; rebuild per send so a retried
            // request carries the full document again.
            RequestBody::Document(document) => builder.multipart(document_form(document)?),
        };
        Ok(builder)
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<ApiResponse> {
        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if status.is_success() {
            debug!(%status, bytes = body.len(), "Request succeeded");
            return Ok(ApiResponse { status, body });
        }

        let body = ErrorBody::from_response_text(status, &String::from_utf8_lossy(&body));
        warn!(%status, message = %body.message, code = ?body.code, "Request rejected");
        Err(ClientError::Upstream { status, body })
    }
}

fn document_form(document: &Document) -> Result<Form> {
    let part = Part::bytes(document.bytes.to_vec())
        .file_name(document.file_name.clone())
        .mime_str(&document.content_type)
        .map_err(|e| ClientError::validation(format!("invalid content type: {e}")))?;
    Ok(Form::new().part("file", part))
}
