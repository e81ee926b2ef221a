//! Typed events carried on the chat stream

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Prefix marking an event-bearing line; anything else is ignored
pub const DATA_PREFIX: &str = "data:";

/// A reference document attached to an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub id: String,
    pub title: String,
    pub category: String,
    pub score: f64,
}

/// Events emitted by the backend while it generates an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    /// Backend accepted the question; may carry the canonical session id
    Start { session_id: Option<String> },
    /// Reference documents the answer draws on
    Sources { sources: Vec<SourceRef> },
    /// Confidence score in [0, 1]
    Confidence { confidence: f64 },
    /// A fragment of generated answer text
    Token { content: String },
    /// Auxiliary info about the in-progress answer
    Metadata {
        model_used: Option<String>,
        session_id: Option<String>,
        confidence: Option<f64>,
    },
    /// Explicit end-of-answer terminator
    Done,
    /// Backend-reported failure
    Error { message: String },
}

impl ChatEvent {
    /// Check if this event ends the stream (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChatEvent::Done | ChatEvent::Error { .. })
    }
}

/// A stream of chat events; `Err` items are transport-level failures
pub type ChatEventStream = Pin<Box<dyn Stream<Item = Result<ChatEvent>> + Send>>;

/// Adapt one raw line into a typed event.
///
/// Strips the `data:` prefix and parses the remainder as JSON. Lines
/// without the prefix, with malformed JSON, or with an unrecognized event
/// type are logged and dropped — partial output beats a dead stream.
pub fn parse_event_line(line: &str) -> Option<ChatEvent> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim_start();
    match serde_json::from_str::<ChatEvent>(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!("dropping malformed event line: {e}");
            None
        }
    }
}
