use jobgen_client::{ClientError, ErrorTag};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to write configuration: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Interrupted")]
    Interrupted,
}

impl CliError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Message printed to the user; client errors use their user-facing form.
    pub fn user_message(&self) -> String {
        match self {
            Self::Client(e) => e.user_message(),
            other => other.to_string(),
        }
    }

    pub fn tag(&self) -> Option<ErrorTag> {
        match self {
            Self::Client(e) => Some(e.tag()),
            Self::Interrupted => Some(ErrorTag::Cancelled),
            _ => None,
        }
    }
}

#[cfg(feature = "interactive")]
impl From<inquire::InquireError> for CliError {
    fn from(err: inquire::InquireError) -> Self {
        match err {
            inquire::InquireError::OperationCanceled
            | inquire::InquireError::OperationInterrupted => Self::Interrupted,
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, CliError>;
