//! Response envelope handling and error body normalisation.
//!
//! The backend answers with `{success, message, data}` on success and
//! `{error: {code, message, details}}` on failure, but older handlers reply
//! with `{error: "text"}`, `{message: "text"}` or plain text. Every failure
//! is folded into one [`ErrorBody`] so callers never branch on content type.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Longest raw text body kept as an error message.
const MAX_RAW_MESSAGE_LEN: usize = 512;

/// Uniform error payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            details: None,
        }
    }

    /// Normalise a non-2xx response body.
    pub fn from_response_text(status: StatusCode, text: &str) -> Self {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Self::new(fallback_message(status));
        }

        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => Self::from_value(status, &value),
            Err(_) => Self::new(truncate(trimmed)),
        }
    }

    /// Normalise an already-parsed JSON error body.
    pub fn from_value(status: StatusCode, value: &Value) -> Self {
        let text = |v: Option<&Value>| {
            v.and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        match value.get("error") {
            Some(Value::Object(error)) => Self {
                message: text(error.get("message"))
                    .or_else(|| text(value.get("message")))
                    .unwrap_or_else(|| fallback_message(status)),
                code: text(error.get("code")),
                details: error.get("details").filter(|d| !d.is_null()).cloned(),
            },
            Some(Value::String(message)) if !message.trim().is_empty() => Self {
                message: message.trim().to_string(),
                code: None,
                details: value.get("details").filter(|d| !d.is_null()).cloned(),
            },
            _ => match text(value.get("message")) {
                Some(message) => Self::new(message),
                None if value.is_string() => Self::new(truncate(value.as_str().unwrap_or_default())),
                None => Self::new(fallback_message(status)),
            },
        }
    }
}

/// Strip the `{success, data}` envelope if present.
pub fn unwrap_data(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn fallback_message(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()))
}

fn truncate(text: &str) -> String {
    if text.len() <= MAX_RAW_MESSAGE_LEN {
        return text.to_string();
    }
    let mut end = MAX_RAW_MESSAGE_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &text[..end])
}
