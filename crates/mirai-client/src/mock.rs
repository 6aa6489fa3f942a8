//! Scripted [`ChatBackend`] for tests and offline runs.
//!
//! Stream responses are consumed in FIFO order, one per `open_stream` call.
//! Conversation records live in an in-memory table.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use mirai_core::{
    ClientError, ConversationDetail, ConversationId, HistoryEntry, StreamEvent, WireMessage,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::backend::{ChatBackend, StreamRequest, StreamResponse};
use crate::health::HealthReport;
use crate::sse::{decode_stream, DecoderOptions};

/// Sender half of a [`MockResponse::Channel`] stream.
pub type EventSender = mpsc::UnboundedSender<Result<StreamEvent, ClientError>>;

/// One scripted answer to `open_stream`.
pub enum MockResponse {
    /// Pre-decoded events, yielded immediately.
    Events {
        conversation_id: Option<ConversationId>,
        events: Vec<Result<StreamEvent, ClientError>>,
    },
    /// Raw body fed through the real decoder as a single chunk.
    Body {
        conversation_id: Option<ConversationId>,
        body: String,
    },
    /// Events pushed by the test while the stream is open. Ends when the
    /// sender is dropped.
    Channel {
        conversation_id: Option<ConversationId>,
        receiver: mpsc::UnboundedReceiver<Result<StreamEvent, ClientError>>,
    },
    /// `open_stream` never resolves.
    Pending,
    /// `open_stream` fails.
    Error(ClientError),
}

impl MockResponse {
    /// Deltas followed by `Done`.
    pub fn text(deltas: &[&str]) -> Self {
        let mut events: Vec<_> = deltas
            .iter()
            .map(|d| {
                Ok(StreamEvent::ContentDelta {
                    delta: (*d).to_string(),
                })
            })
            .collect();
        events.push(Ok(StreamEvent::Done));
        Self::Events {
            conversation_id: None,
            events,
        }
    }

    pub fn sse(body: impl Into<String>) -> Self {
        Self::Body {
            conversation_id: None,
            body: body.into(),
        }
    }

    pub fn channel() -> (Self, EventSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self::Channel {
                conversation_id: None,
                receiver: rx,
            },
            tx,
        )
    }

    /// Attach an `X-Conversation-Id` header value.
    #[must_use]
    pub fn with_header_id(mut self, id: i64) -> Self {
        let header = ConversationId::new(id);
        match &mut self {
            Self::Events {
                conversation_id, ..
            }
            | Self::Body {
                conversation_id, ..
            }
            | Self::Channel {
                conversation_id, ..
            } => *conversation_id = header,
            Self::Pending | Self::Error(_) => {}
        }
        self
    }
}

pub struct MockBackend {
    responses: Mutex<VecDeque<MockResponse>>,
    requests: Mutex<Vec<StreamRequest>>,
    details: Mutex<HashMap<ConversationId, ConversationDetail>>,
    entries: Mutex<Vec<HistoryEntry>>,
    list_error: Mutex<Option<ClientError>>,
    health_body: Mutex<serde_json::Value>,
    detail_calls: AtomicUsize,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            details: Mutex::new(HashMap::new()),
            entries: Mutex::new(Vec::new()),
            list_error: Mutex::new(None),
            health_body: Mutex::new(serde_json::json!({"status": "ok"})),
            detail_calls: AtomicUsize::new(0),
        }
    }

    pub fn push_response(&self, response: MockResponse) {
        self.responses.lock().push_back(response);
    }

    /// Register a conversation record served by `get_conversation` and listed
    /// by `list_conversations`.
    pub fn insert_conversation(&self, id: i64, title: Option<&str>, messages: Vec<WireMessage>) {
        let Some(id) = ConversationId::new(id) else {
            return;
        };
        let count = u32::try_from(messages.len()).unwrap_or(u32::MAX);
        let _ = self.details.lock().insert(
            id,
            ConversationDetail {
                id,
                title: title.map(str::to_string),
                messages,
            },
        );
        let mut entries = self.entries.lock();
        entries.retain(|e| e.id != id);
        entries.push(HistoryEntry {
            id,
            title: title.map(str::to_string),
            message_count: count,
            updated_at: Utc::now(),
        });
    }

    pub fn fail_listing(&self, error: ClientError) {
        *self.list_error.lock() = Some(error);
    }

    pub fn set_health_body(&self, body: serde_json::Value) {
        *self.health_body.lock() = body;
    }

    /// Every stream request received so far.
    pub fn requests(&self) -> Vec<StreamRequest> {
        self.requests.lock().clone()
    }

    pub fn detail_calls(&self) -> usize {
        self.detail_calls.load(Ordering::SeqCst)
    }

    fn not_found() -> ClientError {
        ClientError::Status {
            status: 404,
            body: r#"{"message":"Conversation not found"}"#.to_string(),
        }
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn open_stream(&self, request: StreamRequest) -> Result<StreamResponse, ClientError> {
        self.requests.lock().push(request);
        let next = self.responses.lock().pop_front();
        match next {
            Some(MockResponse::Events {
                conversation_id,
                events,
            }) => Ok(StreamResponse {
                conversation_id,
                events: Box::pin(futures::stream::iter(events)),
            }),
            Some(MockResponse::Body {
                conversation_id,
                body,
            }) => {
                let chunks = futures::stream::iter([Ok::<_, ClientError>(Bytes::from(body))]);
                Ok(StreamResponse {
                    conversation_id,
                    events: Box::pin(decode_stream(chunks, DecoderOptions::default())),
                })
            }
            Some(MockResponse::Channel {
                conversation_id,
                receiver,
            }) => Ok(StreamResponse {
                conversation_id,
                events: Box::pin(UnboundedReceiverStream::new(receiver)),
            }),
            Some(MockResponse::Pending) => futures::future::pending().await,
            Some(MockResponse::Error(e)) => Err(e),
            None => Err(ClientError::Network("no scripted response".to_string())),
        }
    }

    async fn list_conversations(&self) -> Result<Vec<HistoryEntry>, ClientError> {
        if let Some(e) = self.list_error.lock().clone() {
            return Err(e);
        }
        Ok(self.entries.lock().clone())
    }

    async fn get_conversation(&self, id: ConversationId) -> Result<ConversationDetail, ClientError> {
        let _ = self.detail_calls.fetch_add(1, Ordering::SeqCst);
        self.details.lock().get(&id).cloned().ok_or_else(Self::not_found)
    }

    async fn create_conversation(&self) -> Result<HistoryEntry, ClientError> {
        let next = {
            let entries = self.entries.lock();
            entries.iter().map(|e| e.id.get()).max().unwrap_or(0) + 1
        };
        self.insert_conversation(next, None, Vec::new());
        let entries = self.entries.lock();
        entries
            .iter()
            .find(|e| e.id.get() == next)
            .cloned()
            .ok_or_else(Self::not_found)
    }

    async fn rename_conversation(
        &self,
        id: ConversationId,
        title: &str,
    ) -> Result<HistoryEntry, ClientError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(ClientError::InvalidRequest(
                "title must be a non-empty string".to_string(),
            ));
        }
        if let Some(detail) = self.details.lock().get_mut(&id) {
            detail.title = Some(title.to_string());
        }
        let mut entries = self.entries.lock();
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(Self::not_found)?;
        entry.title = Some(title.to_string());
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn delete_conversation(&self, id: ConversationId) -> Result<(), ClientError> {
        let removed = self.details.lock().remove(&id).is_some();
        self.entries.lock().retain(|e| e.id != id);
        if removed {
            Ok(())
        } else {
            Err(Self::not_found())
        }
    }

    async fn health(&self) -> Result<HealthReport, ClientError> {
        Ok(HealthReport::from_body(self.health_body.lock().clone()))
    }
}
