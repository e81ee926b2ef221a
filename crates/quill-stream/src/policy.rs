//! Completion policy: when is a stream finished, and how did it end
//!
//! Token delivery and the explicit terminator are not reliably observed
//! under all network and proxy conditions, so three redundant signals
//! bound the worst-case hang time: the `done` event, reader exhaustion,
//! and a metadata-gated inactivity timeout. A ceiling timeout caps total
//! stream duration regardless of activity.

use std::time::Duration;

use crate::state::{StreamPhase, StreamState};
use quill_sse::Error as WireError;

/// Timing knobs for the completion policy
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Silence window after which a metadata-confirmed stream finalizes.
    /// Restarted on every token.
    pub inactivity_window: Duration,
    /// Absolute maximum duration for a single stream
    pub ceiling: Duration,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            inactivity_window: Duration::from_secs(3),
            ceiling: Duration::from_secs(120),
        }
    }
}

impl StreamConfig {
    /// Set the per-token inactivity window
    pub fn with_inactivity_window(mut self, window: Duration) -> Self {
        self.inactivity_window = window;
        self
    }

    /// Set the overall ceiling timeout
    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }
}

/// The signal that ended a stream; exactly one finalizes each stream
#[derive(Debug, Clone, PartialEq)]
pub enum FinishSignal {
    /// Explicit `done` event; authoritative
    Done,
    /// The byte reader ran out of chunks without a `done` event
    ReaderClosed,
    /// The inactivity window elapsed after metadata was observed
    InactivityTimeout,
    /// The ceiling timer fired; surfaced as a timeout error
    CeilingTimeout,
    /// The caller aborted the stream
    CancelRequested,
    /// The backend sent an `error` event
    BackendError(String),
    /// The request or a chunk read failed
    TransportError(String),
}

impl FinishSignal {
    /// Finalize a stream state with this signal.
    ///
    /// Sets the phase to `Finalized` and fills `error` and
    /// `stopped_by_user`; accumulated content, sources, and metadata are
    /// left untouched for later inspection.
    pub fn apply(self, state: &mut StreamState) {
        state.phase = StreamPhase::Finalized;
        match self {
            FinishSignal::Done | FinishSignal::ReaderClosed | FinishSignal::InactivityTimeout => {}
            FinishSignal::CancelRequested => {
                state.stopped_by_user = true;
            }
            FinishSignal::CeilingTimeout => {
                state.error = Some(WireError::Timeout.user_message().to_string());
            }
            FinishSignal::BackendError(message) | FinishSignal::TransportError(message) => {
                state.error = Some(message);
            }
        }
    }
}
