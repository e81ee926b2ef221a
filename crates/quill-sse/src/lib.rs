//! quill-sse: wire layer for the quill chat backend
//!
//! This crate consumes the backend's newline-delimited SSE contract:
//! raw byte chunks are framed into lines, each line is adapted into a
//! typed [`ChatEvent`], and [`ChatClient`] ties both to an HTTP request.

pub mod client;
pub mod error;
pub mod event;
pub mod framing;

pub use client::{ChatClient, ChatRequest};
pub use error::{Error, ErrorKind, Result};
pub use event::{ChatEvent, ChatEventStream, SourceRef};
pub use framing::LineFramer;
