//! Stream state store and driver
//!
//! One [`StreamManager`] owns a map from conversation id to the mutable
//! state of its in-flight stream. Each started stream gets a driver task
//! that pulls wire events, funnels every mutation through a single
//! commit path (which re-publishes the full state), and finalizes on the
//! first completion signal to fire. The manager is an ordinary value:
//! construct one per backend, clone it freely, drop it to shut down.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use quill_sse::{ChatEvent, ChatRequest};

use crate::{
    error::{Error, Result},
    policy::{FinishSignal, StreamConfig},
    state::{StreamPhase, StreamState},
    transport::ChatTransport,
    update::{StreamUpdate, StreamUpdates},
};

const UPDATE_CHANNEL_CAPACITY: usize = 256;

/// Caller-facing request to start a stream
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub question: String,
    /// Client-side key grouping the exchange; at most one active stream
    /// per conversation id
    pub conversation_id: String,
    /// Backend session to continue, if any
    pub session_id: Option<String>,
    /// Opaque id correlating the stream to a UI message
    pub message_id: String,
}

/// Delivered once, when the stream finalizes
#[derive(Debug, Clone)]
pub struct StreamOutcome {
    pub backend_session_id: Option<String>,
    pub error: Option<String>,
    pub stopped_by_user: bool,
}

/// Handle for one started stream
pub struct StreamHandle {
    pub conversation_id: String,
    finished: oneshot::Receiver<StreamOutcome>,
}

impl StreamHandle {
    /// Wait for the stream to finalize (by any completion signal)
    pub async fn finished(self) -> Result<StreamOutcome> {
        self.finished
            .await
            .map_err(|_| Error::Other("stream driver dropped before finalizing".to_string()))
    }
}

struct StreamEntry {
    state: StreamState,
    cancel: CancellationToken,
    generation: u64,
}

struct Inner {
    streams: Mutex<HashMap<String, StreamEntry>>,
    updates: broadcast::Sender<StreamUpdate>,
    transport: Arc<dyn ChatTransport>,
    config: StreamConfig,
    generations: AtomicU64,
}

impl Inner {
    fn publish(&self, conversation_id: &str, state: Option<StreamState>) {
        // No receivers is fine; send only fails when nobody listens.
        let _ = self.updates.send(StreamUpdate {
            conversation_id: conversation_id.to_string(),
            state,
        });
    }

    /// Single update path for driver mutations.
    ///
    /// Copies the driver's state into the store and re-publishes it in
    /// full, unless the entry was replaced or cleared in the meantime —
    /// a stale generation means this stream no longer owns the slot and
    /// its update is discarded.
    fn commit(&self, conversation_id: &str, generation: u64, state: &StreamState) -> bool {
        {
            let mut streams = self.streams.lock();
            match streams.get_mut(conversation_id) {
                Some(entry) if entry.generation == generation => {
                    entry.state = state.clone();
                }
                _ => return false,
            }
        }
        self.publish(conversation_id, Some(state.clone()));
        true
    }
}

/// Manages every in-flight answer stream for one backend
#[derive(Clone)]
pub struct StreamManager {
    inner: Arc<Inner>,
}

impl StreamManager {
    /// Create a manager with the default completion policy
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self::with_config(transport, StreamConfig::default())
    }

    /// Create a manager with explicit policy timings
    pub fn with_config(transport: Arc<dyn ChatTransport>, config: StreamConfig) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                streams: Mutex::new(HashMap::new()),
                updates,
                transport,
                config,
                generations: AtomicU64::new(1),
            }),
        }
    }

    /// Start a stream for a conversation.
    ///
    /// Replace, not merge: if the conversation already has an active
    /// stream, its request is aborted and its slot handed to the new
    /// stream before any event of the new one is processed. Updates from
    /// the replaced stream are discarded from then on.
    pub fn start_stream(&self, request: StreamRequest) -> StreamHandle {
        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let state = StreamState::new(request.message_id.clone());

        {
            let mut streams = self.inner.streams.lock();
            if let Some(prev) = streams.get(&request.conversation_id) {
                prev.cancel.cancel();
            }
            streams.insert(
                request.conversation_id.clone(),
                StreamEntry {
                    state: state.clone(),
                    cancel: cancel.clone(),
                    generation,
                },
            );
        }
        self.inner.publish(&request.conversation_id, Some(state));

        let (tx, rx) = oneshot::channel();
        let conversation_id = request.conversation_id.clone();
        tokio::spawn(drive(
            Arc::clone(&self.inner),
            request,
            generation,
            cancel,
            tx,
        ));

        StreamHandle {
            conversation_id,
            finished: rx,
        }
    }

    /// Current state for a conversation, if any
    pub fn state(&self, conversation_id: &str) -> Option<StreamState> {
        self.inner
            .streams
            .lock()
            .get(conversation_id)
            .map(|entry| entry.state.clone())
    }

    /// Whether a conversation has a loading or streaming entry
    pub fn has_active(&self, conversation_id: &str) -> bool {
        self.inner
            .streams
            .lock()
            .get(conversation_id)
            .is_some_and(|entry| entry.state.is_active())
    }

    /// Stop generation for a conversation.
    ///
    /// Aborts the in-flight request; the stream finalizes with
    /// `stopped_by_user` set and no error. A no-op when the conversation
    /// is idle or already finalized.
    pub fn cancel(&self, conversation_id: &str) {
        let streams = self.inner.streams.lock();
        if let Some(entry) = streams.get(conversation_id) {
            if entry.state.is_active() {
                entry.cancel.cancel();
            }
        }
    }

    /// Drop a conversation's entry, cancelling it first if active.
    ///
    /// Publishes a `None` state so subscribers forget the entry too.
    pub fn clear(&self, conversation_id: &str) {
        let removed = {
            let mut streams = self.inner.streams.lock();
            match streams.remove(conversation_id) {
                Some(entry) => {
                    entry.cancel.cancel();
                    true
                }
                None => false,
            }
        };
        if removed {
            self.inner.publish(conversation_id, None);
        }
    }

    /// Drop every entry (logout, full reset)
    pub fn clear_all(&self) {
        let ids: Vec<String> = {
            let mut streams = self.inner.streams.lock();
            streams
                .drain()
                .map(|(id, entry)| {
                    entry.cancel.cancel();
                    id
                })
                .collect()
        };
        for id in &ids {
            self.inner.publish(id, None);
        }
    }

    /// Observe every state change; dropping the value unsubscribes
    pub fn subscribe(&self) -> StreamUpdates {
        StreamUpdates::new(self.inner.updates.subscribe())
    }
}

/// Fold one wire event into the state; returns the finish signal for
/// terminal events.
fn apply_event(
    event: ChatEvent,
    state: &mut StreamState,
    saw_metadata: &mut bool,
) -> Option<FinishSignal> {
    match event {
        ChatEvent::Start { session_id } => {
            if let Some(id) = session_id {
                state.backend_session_id = Some(id);
            }
            None
        }
        ChatEvent::Sources { sources } => {
            // Set at most once per stream
            if state.sources.is_empty() {
                state.sources = sources;
            }
            None
        }
        ChatEvent::Confidence { confidence } => {
            state.confidence = Some(confidence);
            None
        }
        ChatEvent::Token { content } => {
            state.content.push_str(&content);
            if state.phase == StreamPhase::Loading {
                state.phase = StreamPhase::Streaming;
            }
            None
        }
        ChatEvent::Metadata {
            model_used,
            session_id,
            confidence,
        } => {
            if let Some(model) = model_used {
                state.model_used = Some(model);
            }
            if let Some(id) = session_id {
                state.backend_session_id = Some(id);
            }
            if let Some(score) = confidence {
                state.confidence = Some(score);
            }
            *saw_metadata = true;
            None
        }
        ChatEvent::Done => Some(FinishSignal::Done),
        ChatEvent::Error { message } => Some(FinishSignal::BackendError(message)),
    }
}

/// Driver task for one stream: opens the transport, processes events in
/// arrival order, and races them against the policy timers.
async fn drive(
    inner: Arc<Inner>,
    request: StreamRequest,
    generation: u64,
    cancel: CancellationToken,
    outcome: oneshot::Sender<StreamOutcome>,
) {
    let StreamRequest {
        question,
        conversation_id,
        session_id,
        message_id,
    } = request;

    let mut state = StreamState::new(message_id);
    let config = inner.config.clone();
    let wire_request = ChatRequest {
        question,
        session_id,
    };

    let signal: FinishSignal = 'run: {
        // The ceiling bounds the whole stream, including a request that
        // hangs before producing response headers.
        let ceiling = tokio::time::sleep(config.ceiling);
        tokio::pin!(ceiling);

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => break 'run FinishSignal::CancelRequested,
            _ = &mut ceiling => break 'run FinishSignal::CeilingTimeout,
            result = inner.transport.open(&wire_request) => result,
        };

        let mut events = match opened {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!("failed to open stream for {conversation_id}: {e}");
                break 'run FinishSignal::TransportError(e.user_message().to_string());
            }
        };

        let mut saw_metadata = false;
        let mut last_activity = Instant::now();

        loop {
            // The inactivity fallback arms only once metadata confirms
            // the backend has committed to a response.
            let inactivity_due =
                saw_metadata.then(|| last_activity + config.inactivity_window);
            let inactivity = async move {
                match inactivity_due {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            // `biased` gives events precedence over simultaneously
            // expired timers, so an observed `done` always wins the race.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break 'run FinishSignal::CancelRequested,
                item = events.next() => match item {
                    Some(Ok(event)) => {
                        if matches!(event, ChatEvent::Token { .. } | ChatEvent::Metadata { .. }) {
                            last_activity = Instant::now();
                        }
                        if let Some(signal) = apply_event(event, &mut state, &mut saw_metadata) {
                            break 'run signal;
                        }
                        inner.commit(&conversation_id, generation, &state);
                    }
                    Some(Err(e)) => {
                        tracing::warn!("transport failure on stream {conversation_id}: {e}");
                        break 'run FinishSignal::TransportError(e.user_message().to_string());
                    }
                    None => break 'run FinishSignal::ReaderClosed,
                },
                _ = &mut ceiling => break 'run FinishSignal::CeilingTimeout,
                _ = inactivity => break 'run FinishSignal::InactivityTimeout,
            }
        }
    };

    signal.apply(&mut state);
    inner.commit(&conversation_id, generation, &state);

    let _ = outcome.send(StreamOutcome {
        backend_session_id: state.backend_session_id.clone(),
        error: state.error.clone(),
        stopped_by_user: state.stopped_by_user,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_stream::stream;
    use quill_sse::{ChatEventStream, Error as WireError, SourceRef};
    use std::collections::VecDeque;
    use std::time::Duration;

    enum Step {
        Event(ChatEvent),
        Wait(Duration),
        Hang,
    }

    enum Script {
        Events(Vec<Step>),
        Fail(WireError),
        /// Accept the request but never produce a response
        HangOpen,
    }

    struct ScriptedTransport {
        scripts: Mutex<VecDeque<Script>>,
    }

    impl ScriptedTransport {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
            })
        }
    }

    #[async_trait::async_trait]
    impl ChatTransport for ScriptedTransport {
        async fn open(&self, _request: &ChatRequest) -> Result<ChatEventStream> {
            let script = self
                .scripts
                .lock()
                .pop_front()
                .expect("no script left for open()");
            match script {
                Script::Fail(e) => Err(e.into()),
                Script::HangOpen => std::future::pending().await,
                Script::Events(steps) => {
                    let events: ChatEventStream = Box::pin(stream! {
                        for step in steps {
                            match step {
                                Step::Event(event) => yield Ok(event),
                                Step::Wait(duration) => tokio::time::sleep(duration).await,
                                Step::Hang => std::future::pending::<()>().await,
                            }
                        }
                    });
                    Ok(events)
                }
            }
        }
    }

    fn token(text: &str) -> Step {
        Step::Event(ChatEvent::Token {
            content: text.to_string(),
        })
    }

    fn request(conversation_id: &str) -> StreamRequest {
        StreamRequest {
            question: "what is the leave policy?".to_string(),
            conversation_id: conversation_id.to_string(),
            session_id: None,
            message_id: "msg-1".to_string(),
        }
    }

    fn manager_with(scripts: Vec<Script>) -> StreamManager {
        StreamManager::new(ScriptedTransport::new(scripts))
    }

    /// Pull updates for one conversation until `pred` matches, returning
    /// the matching state.
    async fn wait_for(
        updates: &mut StreamUpdates,
        conversation_id: &str,
        pred: impl Fn(&StreamState) -> bool,
    ) -> StreamState {
        loop {
            let update = updates.next().await.expect("update channel closed");
            if update.conversation_id != conversation_id {
                continue;
            }
            if let Some(state) = update.state {
                if pred(&state) {
                    return state;
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_event_finalizes_with_full_state() {
        let manager = manager_with(vec![Script::Events(vec![
            Step::Event(ChatEvent::Start {
                session_id: Some("s1".to_string()),
            }),
            Step::Event(ChatEvent::Sources {
                sources: vec![SourceRef {
                    id: "d1".to_string(),
                    title: "Handbook".to_string(),
                    category: "hr".to_string(),
                    score: 0.9,
                }],
            }),
            token("Hel"),
            token("lo"),
            Step::Event(ChatEvent::Metadata {
                model_used: Some("m1".to_string()),
                session_id: Some("s2".to_string()),
                confidence: Some(0.8),
            }),
            Step::Event(ChatEvent::Done),
        ])]);

        let outcome = manager
            .start_stream(request("c1"))
            .finished()
            .await
            .unwrap();

        assert_eq!(outcome.backend_session_id.as_deref(), Some("s2"));
        assert!(outcome.error.is_none());
        assert!(!outcome.stopped_by_user);

        let state = manager.state("c1").unwrap();
        assert_eq!(state.phase, StreamPhase::Finalized);
        assert_eq!(state.content, "Hello");
        assert_eq!(state.sources.len(), 1);
        assert_eq!(state.model_used.as_deref(), Some("m1"));
        assert_eq!(state.confidence, Some(0.8));
        assert!(!manager.has_active("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reader_exhaustion_finalizes_without_error() {
        let manager = manager_with(vec![Script::Events(vec![token("partial")])]);

        let outcome = manager
            .start_stream(request("c1"))
            .finished()
            .await
            .unwrap();

        assert!(outcome.error.is_none());
        let state = manager.state("c1").unwrap();
        assert_eq!(state.content, "partial");
        assert_eq!(state.phase, StreamPhase::Finalized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_after_metadata_finalizes() {
        let manager = manager_with(vec![Script::Events(vec![
            Step::Event(ChatEvent::Start {
                session_id: Some("s1".to_string()),
            }),
            token("Hel"),
            token("lo"),
            Step::Event(ChatEvent::Metadata {
                model_used: Some("m1".to_string()),
                session_id: None,
                confidence: None,
            }),
            Step::Hang,
        ])]);

        let outcome = manager
            .start_stream(request("c1"))
            .finished()
            .await
            .unwrap();

        assert!(outcome.error.is_none());
        assert_eq!(outcome.backend_session_id.as_deref(), Some("s1"));

        let state = manager.state("c1").unwrap();
        assert_eq!(state.content, "Hello");
        assert!(!state.is_loading());
        assert!(!state.is_streaming());
        assert_eq!(state.model_used.as_deref(), Some("m1"));
        assert!(state.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_does_not_fire_without_metadata() {
        // A 10s gap dwarfs the 3s window; without metadata the stream
        // must survive it and still apply the late token.
        let manager = manager_with(vec![Script::Events(vec![
            token("a"),
            Step::Wait(Duration::from_secs(10)),
            token("b"),
            Step::Event(ChatEvent::Done),
        ])]);

        let outcome = manager
            .start_stream(request("c1"))
            .finished()
            .await
            .unwrap();

        assert!(outcome.error.is_none());
        assert_eq!(manager.state("c1").unwrap().content, "ab");
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_finalizes_with_timeout_error() {
        let manager = StreamManager::with_config(
            ScriptedTransport::new(vec![Script::Events(vec![token("a"), Step::Hang])]),
            StreamConfig::default().with_ceiling(Duration::from_secs(30)),
        );

        let outcome = manager
            .start_stream(request("c1"))
            .finished()
            .await
            .unwrap();

        let error = outcome.error.expect("ceiling must surface an error");
        assert!(error.contains("timed out"));

        let state = manager.state("c1").unwrap();
        assert_eq!(state.content, "a");
        assert_eq!(state.phase, StreamPhase::Finalized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_bounds_request_that_never_responds() {
        // The server accepts the connection and goes silent before
        // sending response headers; the ceiling must still fire.
        let manager = StreamManager::with_config(
            ScriptedTransport::new(vec![Script::HangOpen]),
            StreamConfig::default().with_ceiling(Duration::from_secs(30)),
        );

        let outcome = manager
            .start_stream(request("c1"))
            .finished()
            .await
            .unwrap();

        let error = outcome.error.expect("hung request must time out");
        assert!(error.contains("timed out"));

        let state = manager.state("c1").unwrap();
        assert_eq!(state.phase, StreamPhase::Finalized);
        assert_eq!(state.content, "");
        assert!(!manager.has_active("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_fires_after_metadata_without_tokens() {
        // Metadata confirms the backend committed to a response; silence
        // afterwards closes the stream within the inactivity window even
        // when no token ever arrived.
        let manager = manager_with(vec![Script::Events(vec![
            Step::Event(ChatEvent::Metadata {
                model_used: Some("m1".to_string()),
                session_id: None,
                confidence: None,
            }),
            Step::Hang,
        ])]);

        let outcome = manager
            .start_stream(request("c1"))
            .finished()
            .await
            .unwrap();

        assert!(outcome.error.is_none());

        let state = manager.state("c1").unwrap();
        assert_eq!(state.phase, StreamPhase::Finalized);
        assert_eq!(state.content, "");
        assert_eq!(state.model_used.as_deref(), Some("m1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_http_500_on_open() {
        let manager = manager_with(vec![Script::Fail(WireError::from_status(500, ""))]);

        let outcome = manager
            .start_stream(request("c1"))
            .finished()
            .await
            .unwrap();

        assert!(outcome.error.is_some());

        let state = manager.state("c1").unwrap();
        assert_eq!(state.content, "");
        assert!(!state.is_loading());
        assert!(!state.is_streaming());
        assert!(state.error.as_deref().unwrap().contains("server"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_replace_not_merge() {
        let manager = manager_with(vec![
            Script::Events(vec![token("old"), Step::Hang]),
            Script::Events(vec![token("new"), Step::Event(ChatEvent::Done)]),
        ]);
        let mut updates = manager.subscribe();

        let first = manager.start_stream(request("c1"));
        wait_for(&mut updates, "c1", |s| s.content == "old").await;

        let second = manager.start_stream(request("c1"));

        let final_state = wait_for(&mut updates, "c1", |s| !s.is_active()).await;
        assert_eq!(final_state.content, "new");

        // No update from the replaced stream is observed after the swap
        let outcome = second.finished().await.unwrap();
        assert!(outcome.error.is_none());
        assert_eq!(manager.state("c1").unwrap().content, "new");

        let old_outcome = first.finished().await.unwrap();
        assert!(old_outcome.stopped_by_user);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_stream() {
        let manager = manager_with(vec![Script::Events(vec![token("a"), Step::Hang])]);
        let mut updates = manager.subscribe();

        let handle = manager.start_stream(request("c1"));
        wait_for(&mut updates, "c1", |s| s.is_streaming()).await;
        assert!(manager.has_active("c1"));

        manager.cancel("c1");
        let outcome = handle.finished().await.unwrap();

        assert!(outcome.stopped_by_user);
        assert!(outcome.error.is_none());
        assert!(!manager.has_active("c1"));
        // Partial content survives cancellation
        assert_eq!(manager.state("c1").unwrap().content, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_idle_is_noop() {
        let manager = manager_with(vec![Script::Events(vec![Step::Event(ChatEvent::Done)])]);

        // Never-started conversation
        manager.cancel("missing");
        assert!(manager.state("missing").is_none());

        // Already-finalized conversation
        let handle = manager.start_stream(request("c1"));
        handle.finished().await.unwrap();
        manager.cancel("c1");
        let state = manager.state("c1").unwrap();
        assert!(!state.stopped_by_user);
        assert_eq!(state.phase, StreamPhase::Finalized);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_removes_entry_and_publishes_none() {
        let manager = manager_with(vec![Script::Events(vec![Step::Event(ChatEvent::Done)])]);
        let mut updates = manager.subscribe();

        manager.start_stream(request("c1")).finished().await.unwrap();
        assert!(manager.state("c1").is_some());

        manager.clear("c1");
        assert!(manager.state("c1").is_none());

        loop {
            let update = updates.next().await.expect("update channel closed");
            if update.conversation_id == "c1" && update.state.is_none() {
                break;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all() {
        let manager = manager_with(vec![
            Script::Events(vec![Step::Event(ChatEvent::Done)]),
            Script::Events(vec![Step::Event(ChatEvent::Done)]),
        ]);

        manager.start_stream(request("c1")).finished().await.unwrap();
        manager.start_stream(request("c2")).finished().await.unwrap();

        manager.clear_all();
        assert!(manager.state("c1").is_none());
        assert!(manager.state("c2").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_are_full_state_and_append_only() {
        let manager = manager_with(vec![Script::Events(vec![
            token("a"),
            token("b"),
            token("c"),
            Step::Event(ChatEvent::Done),
        ])]);
        let mut updates = manager.subscribe();

        let handle = manager.start_stream(request("c1"));

        let first = loop {
            let update = updates.next().await.unwrap();
            if update.conversation_id == "c1" {
                break update.state.unwrap();
            }
        };
        assert!(first.is_loading());

        let mut previous = first.content;
        loop {
            let update = updates.next().await.unwrap();
            if update.conversation_id != "c1" {
                continue;
            }
            let state = update.state.unwrap();
            assert!(
                state.content.starts_with(&previous),
                "content must only grow by appending"
            );
            previous = state.content.clone();
            if !state.is_active() {
                break;
            }
        }
        assert_eq!(previous, "abc");

        handle.finished().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_token_moves_loading_to_streaming() {
        let manager = manager_with(vec![Script::Events(vec![token("x"), Step::Hang])]);
        let mut updates = manager.subscribe();

        let _handle = manager.start_stream(request("c1"));
        let state = wait_for(&mut updates, "c1", |s| !s.content.is_empty()).await;

        assert!(state.is_streaming());
        assert!(!state.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sources_set_at_most_once() {
        let source = |id: &str| SourceRef {
            id: id.to_string(),
            title: "t".to_string(),
            category: "c".to_string(),
            score: 0.5,
        };
        let manager = manager_with(vec![Script::Events(vec![
            Step::Event(ChatEvent::Sources {
                sources: vec![source("first")],
            }),
            Step::Event(ChatEvent::Sources {
                sources: vec![source("second")],
            }),
            Step::Event(ChatEvent::Done),
        ])]);

        manager.start_stream(request("c1")).finished().await.unwrap();

        let state = manager.state("c1").unwrap();
        assert_eq!(state.sources.len(), 1);
        assert_eq!(state.sources[0].id, "first");
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_error_event_populates_error() {
        let manager = manager_with(vec![Script::Events(vec![
            token("partial"),
            Step::Event(ChatEvent::Error {
                message: "model unavailable".to_string(),
            }),
        ])]);

        let outcome = manager
            .start_stream(request("c1"))
            .finished()
            .await
            .unwrap();

        assert_eq!(outcome.error.as_deref(), Some("model unavailable"));
        // Partial progress is never deleted on failure
        assert_eq!(manager.state("c1").unwrap().content, "partial");
    }
}
