use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::messages::{ChatMessage, WireMessage};

/// Server-assigned conversation identifier. Always positive.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct ConversationId(i64);

impl ConversationId {
    /// Wire value asking the backend to create a new conversation.
    pub const CREATE_NEW: i64 = 0;

    pub fn new(raw: i64) -> Option<Self> {
        (raw > 0).then_some(Self(raw))
    }

    pub fn get(self) -> i64 {
        self.0
    }

    /// Value for the `conversation_id` request field.
    pub fn wire(id: Option<Self>) -> i64 {
        id.map_or(Self::CREATE_NEW, Self::get)
    }

    /// Parse the `X-Conversation-Id` header value.
    pub fn parse_header(value: &str) -> Option<Self> {
        value.trim().parse::<i64>().ok().and_then(Self::new)
    }
}

impl TryFrom<i64> for ConversationId {
    type Error = String;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw).ok_or_else(|| format!("conversation id must be positive, got {raw}"))
    }
}

impl From<ConversationId> for i64 {
    fn from(id: ConversationId) -> Self {
        id.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The active conversation as the client renders it.
///
/// Serializes as `{"conversationId", "title", "messages"}`, which is also the
/// draft-cache snapshot format.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub conversation_id: Option<ConversationId>,
    pub title: Option<String>,
    pub messages: Vec<ChatMessage>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.conversation_id.is_none() && self.title.is_none() && self.messages.is_empty()
    }

    pub fn display_title(&self) -> String {
        match (&self.title, self.conversation_id) {
            (Some(title), _) if !title.trim().is_empty() => title.clone(),
            (_, Some(id)) => format!("Conversation #{id}"),
            _ => "New Conversation".to_string(),
        }
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

/// Row of the conversation directory (`GET /api/chat/conversations`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: ConversationId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub message_count: u32,
    pub updated_at: DateTime<Utc>,
}

fn null_as_zero<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(Option::<u32>::deserialize(deserializer)?.unwrap_or_default())
}

impl HistoryEntry {
    pub fn label(&self) -> String {
        match &self.title {
            Some(title) if !title.trim().is_empty() => title.clone(),
            _ => format!("Conversation #{}", self.id),
        }
    }
}

/// Full conversation record (`GET /api/chat/conversations/{id}`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub id: ConversationId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
}

impl ConversationDetail {
    /// Server title if it carries any text.
    pub fn non_empty_title(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Project into a fresh session state. Server message ids are never reused.
    pub fn into_state(self) -> ConversationState {
        let title = self.non_empty_title().map(str::to_string);
        ConversationState {
            conversation_id: Some(self.id),
            title,
            messages: self
                .messages
                .into_iter()
                .map(WireMessage::into_chat_message)
                .collect(),
        }
    }
}
