use shared::error::ValidationError;
use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Failures of request/response calls. Transport errors, non-success
/// statuses and undecodable bodies all surface as `Request`; the status is
/// kept whenever a response was received.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{}", describe_request_failure(.status, .message))]
    Request {
        status: Option<u16>,
        message: String,
    },
    #[error("invalid base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    #[error("invalid generation request: {0}")]
    InvalidRequest(#[from] ValidationError),
}

fn describe_request_failure(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("request failed with status {status}: {message}"),
        None => format!("request failed: {message}"),
    }
}

impl ClientError {
    pub fn request(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Request {
            status,
            message: message.into(),
        }
    }

    /// HTTP status of the failed call, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request {
            status: err.status().map(|status| status.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Failures observed on a progress stream. These never reach the progress
/// callback; they are logged and optionally handed to an error callback.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    #[error("malformed progress event {data:?}: {reason}")]
    Parse { data: String, reason: String },
    #[error("{}", describe_transport_failure(.status, .message))]
    Transport {
        status: Option<u16>,
        message: String,
    },
}

fn describe_transport_failure(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(status) => format!("event stream failed with status {status}: {message}"),
        None => format!("event stream failed: {message}"),
    }
}

impl StreamError {
    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: message.into(),
        }
    }
}
