//! Transport abstraction between the manager and the wire layer
//!
//! The manager only needs "give me an event stream for this request";
//! putting that behind a trait lets tests script event sequences without
//! a network.

use async_trait::async_trait;
use quill_sse::{ChatClient, ChatEventStream, ChatRequest};

use crate::error::Result;

/// Opens an event stream for a chat request
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open(&self, request: &ChatRequest) -> Result<ChatEventStream>;
}

/// Production transport backed by [`ChatClient`]
pub struct HttpTransport {
    client: ChatClient,
}

impl HttpTransport {
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest) -> Result<ChatEventStream> {
        Ok(self.client.ask(request).await?)
    }
}
