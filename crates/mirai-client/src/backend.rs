//! # Chat backend
//!
//! Abstraction over the chat server. The session controller and the
//! history directory only ever talk to a [`ChatBackend`]; the HTTP
//! implementation lives in [`crate::http`] and a scripted one in
//! [`crate::mock`].

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use mirai_core::{
    ClientError, ConversationDetail, ConversationId, HistoryEntry, StreamEvent, WireMessage,
};
use serde::Serialize;

use crate::health::HealthReport;

/// Boxed stream of decoded events returned by [`ChatBackend::open_stream`].
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ClientError>> + Send>>;

/// Body of `POST /api/chat/stream`.
///
/// Only the newly entered message is sent; the server rebuilds history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StreamRequest {
    /// `0` asks the server to create a conversation.
    pub conversation_id: i64,
    pub messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl StreamRequest {
    pub fn new(conversation_id: Option<ConversationId>, text: impl Into<String>) -> Self {
        Self {
            conversation_id: ConversationId::wire(conversation_id),
            messages: vec![WireMessage::user(text)],
            model: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

/// An opened stream: the header-assigned id (if any) plus the event stream.
pub struct StreamResponse {
    /// Parsed `X-Conversation-Id`; `None` when absent or not a positive integer.
    pub conversation_id: Option<ConversationId>,
    pub events: EventStream,
}

impl std::fmt::Debug for StreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("conversation_id", &self.conversation_id)
            .finish_non_exhaustive()
    }
}

/// Operations the client needs from the chat server.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Start a streamed reply. Resolves once response headers are in; the
    /// body is consumed through [`StreamResponse::events`].
    async fn open_stream(&self, request: StreamRequest) -> Result<StreamResponse, ClientError>;

    /// Conversation directory in server order.
    async fn list_conversations(&self) -> Result<Vec<HistoryEntry>, ClientError>;

    async fn get_conversation(&self, id: ConversationId) -> Result<ConversationDetail, ClientError>;

    async fn create_conversation(&self) -> Result<HistoryEntry, ClientError>;

    async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<HistoryEntry, ClientError>;

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), ClientError>;

    async fn health(&self) -> Result<HealthReport, ClientError>;
}
