//! HTTP client for the chat streaming endpoint

use async_stream::stream;
use futures::StreamExt;
use serde::Serialize;
use tokio_stream::Stream;

use crate::{
    error::{Error, Result},
    event::{ChatEventStream, parse_event_line},
    framing::LineFramer,
};

/// Request body for a streamed question
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub question: String,
    /// Server-side conversation id; `None` starts a new conversation
    pub session_id: Option<String>,
}

/// Client for the backend's `POST /chat/stream` endpoint
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl ChatClient {
    /// Create a new client against the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            auth_token: None,
        }
    }

    /// Attach a bearer token sent with every request
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Send a question and open the event stream for its answer.
    ///
    /// A non-2xx response is surfaced as [`Error::Api`] with the backend's
    /// `detail` message when present. Transport failures after the stream
    /// is open appear as `Err` items on the returned stream.
    pub async fn ask(&self, request: &ChatRequest) -> Result<ChatEventStream> {
        let url = format!("{}/chat/stream", self.base_url);

        let mut builder = self
            .client
            .post(&url)
            .header("accept", "text/event-stream")
            .json(request);
        if let Some(token) = &self.auth_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), &body));
        }

        Ok(decode_events(response.bytes_stream()))
    }
}

/// Frame and adapt a raw byte stream into typed chat events.
///
/// Lines that do not parse are dropped by the adapter; a failed chunk
/// read ends the stream after yielding the error.
fn decode_events<B, E, S>(bytes: S) -> ChatEventStream
where
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Error> + Send + 'static,
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
{
    Box::pin(stream! {
        let mut bytes = Box::pin(bytes);
        let mut framer = LineFramer::new();

        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for line in framer.push(chunk.as_ref()) {
                        if let Some(event) = parse_event_line(&line) {
                            yield Ok(event);
                        }
                    }
                }
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            }
        }

        if let Some(line) = framer.finish() {
            if let Some(event) = parse_event_line(&line) {
                yield Ok(event);
            }
        }
    })
}
