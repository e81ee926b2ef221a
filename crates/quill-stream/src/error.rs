//! Error types for quill-stream

use thiserror::Error;

/// Result type alias using quill-stream Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the stream reception layer
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer
    #[error(transparent)]
    Wire(#[from] quill_sse::Error),

    /// A generic reception-layer error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Human-readable message shown to the end user for this error
    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Wire(e) => e.user_message(),
            Error::Other(_) => "Something went wrong. Please try again.",
        }
    }
}
