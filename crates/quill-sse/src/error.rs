//! Error types for quill-sse

use thiserror::Error;

/// Result type alias using quill-sse Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the chat backend
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned a non-2xx response
    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Stream exceeded its maximum allowed duration
    #[error("Stream timed out")]
    Timeout,
}

/// Coarse failure classes used to pick a user-facing message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Timeout,
    NoConnection,
    RateLimited,
    Server,
    Generic,
}

/// Shape of the backend's error body, when it bothers to send one
#[derive(serde::Deserialize)]
struct ErrorBody {
    detail: String,
}

impl Error {
    /// Build an `Api` error from a non-2xx status and raw response body.
    ///
    /// The body is parsed as `{ "detail": "..." }` when possible;
    /// otherwise a generic `HTTP <status>` message is used.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.detail)
            .unwrap_or_else(|_| format!("HTTP {status}"));
        Error::Api { status, message }
    }

    /// Classify this error into a coarse failure class
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Http(e) if e.is_timeout() => ErrorKind::Timeout,
            Error::Http(e) if e.is_connect() => ErrorKind::NoConnection,
            Error::Http(_) => ErrorKind::Generic,
            Error::Api { status: 429, .. } => ErrorKind::RateLimited,
            Error::Api { status, .. } if *status >= 500 => ErrorKind::Server,
            Error::Api { .. } => ErrorKind::Generic,
            Error::Timeout => ErrorKind::Timeout,
        }
    }

    /// Human-readable message shown to the end user for this error class
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Timeout => "The request timed out. Please try again.",
            ErrorKind::NoConnection => {
                "Unable to reach the server. Check your connection and try again."
            }
            ErrorKind::RateLimited => "Too many requests. Please wait a moment and try again.",
            ErrorKind::Server => "The server encountered an error. Please try again later.",
            ErrorKind::Generic => "Something went wrong. Please try again.",
        }
    }
}
