//! Per-conversation stream state

use quill_sse::SourceRef;
use serde::{Deserialize, Serialize};

/// Where a stream is in its lifecycle.
///
/// `Loading` and `Streaming` replace the reference implementation's pair
/// of booleans; the two can no longer be true at the same time because
/// the phase is a single value. The absence of an entry in the store is
/// the implicit idle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    /// Request sent, no content token yet
    Loading,
    /// At least one content token received, not yet finalized
    Streaming,
    /// No longer active; kept in the store until explicitly cleared
    Finalized,
}

/// Observable state of one answer stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamState {
    pub phase: StreamPhase,
    /// Accumulated answer text; append-only while streaming
    pub content: String,
    /// Reference documents for the answer; set at most once per stream
    pub sources: Vec<SourceRef>,
    /// Confidence score in [0, 1], when the backend reports one
    pub confidence: Option<f64>,
    /// Identifier of the generation model, when reported
    pub model_used: Option<String>,
    /// User-facing failure message; `None` for benign completions
    pub error: Option<String>,
    /// True when the user explicitly stopped generation
    pub stopped_by_user: bool,
    /// Opaque id correlating this stream to a UI message
    pub message_id: String,
    /// Server-assigned session id; may differ from the client-chosen
    /// conversation id when a new conversation is created
    pub backend_session_id: Option<String>,
}

impl StreamState {
    /// Fresh state for a just-started stream
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            phase: StreamPhase::Loading,
            content: String::new(),
            sources: Vec::new(),
            confidence: None,
            model_used: None,
            error: None,
            stopped_by_user: false,
            message_id: message_id.into(),
            backend_session_id: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase == StreamPhase::Loading
    }

    pub fn is_streaming(&self) -> bool {
        self.phase == StreamPhase::Streaming
    }

    /// Whether the stream still occupies its conversation slot
    pub fn is_active(&self) -> bool {
        self.phase != StreamPhase::Finalized
    }
}
