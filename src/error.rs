use serde_json::Value;
use thiserror::Error;

use crate::transport::TransportError;

/// Failure delivered to listeners and submit callbacks.
///
/// Outcomes fan out to every waiter of a fetch, so the error is `Clone` and
/// carries only owned text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// No response was received (connection failure, timeout, injected fault).
    #[error("transport error: {message}")]
    Transport { message: String, timeout: bool },
    /// A response arrived with a non-success status.
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    /// The response body could not be decoded.
    #[error("failed to decode response body: {message}")]
    Decode { message: String },
    #[error("invalid URL `{href}`: {reason}")]
    InvalidUrl { href: String, reason: String },
}

impl ClientError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            timeout: false,
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn invalid_url(href: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidUrl {
            href: href.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a status error, preferring the structured `error.message` field
    /// of a JSON body and falling back to the raw response text.
    pub fn from_status(status: u16, text: &str) -> Self {
        let message = serde_json::from_str::<Value>(text)
            .ok()
            .and_then(|body| {
                body.get("error")
                    .and_then(|error| error.get("message"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| text.to_string());

        Self::Status { status, message }
    }

    /// HTTP status code, when a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { timeout: true, .. })
    }
}

impl From<TransportError> for ClientError {
    fn from(error: TransportError) -> Self {
        Self::Transport {
            timeout: error.is_timeout(),
            message: error.to_string(),
        }
    }
}

/// Failure while assembling a [`crate::Client`].
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid API root `{root}`: {source}")]
    InvalidRoot {
        root: String,
        source: url::ParseError,
    },
    #[error("no tokio runtime available; build the client inside a runtime or supply a handle")]
    NoRuntime,
    #[error("http transport error: {0}")]
    Http(#[from] reqwest::Error),
}
