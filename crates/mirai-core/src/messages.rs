use serde::{Deserialize, Serialize};

use crate::ids::MessageId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    /// Stored by the backend for tool turns; only ever seen in loaded history.
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rendered chat turn. `id` is fixed at creation; only the in-flight
/// assistant message ever has its `content` grown.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Synthetic assistant message for a failed send.
    pub fn transport_error(description: impl std::fmt::Display) -> Self {
        Self::assistant(format!("Error: {description}"))
    }

    /// Assistant message for an error payload reported inside the stream.
    pub fn provider_error(message: &str) -> Self {
        Self::assistant(format!("Provider error: {message}"))
    }
}

/// `{role, content}` pair as exchanged with the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Map into a local message with a freshly generated id.
    pub fn into_chat_message(self) -> ChatMessage {
        ChatMessage::new(self.role, self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
        let role: Role = serde_json::from_str("\"tool\"").unwrap();
        assert_eq!(role, Role::Tool);
    }

    #[test]
    fn unknown_role_rejected() {
        assert!(serde_json::from_str::<Role>("\"narrator\"").is_err());
    }

    #[test]
    fn error_messages_are_prefixed() {
        assert_eq!(ChatMessage::transport_error("HTTP 502").content, "Error: HTTP 502");
        let msg = ChatMessage::provider_error("quota exceeded");
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content, "Provider error: quota exceeded");
    }

    #[test]
    fn wire_messages_get_fresh_ids() {
        let wire = WireMessage::user("hi");
        let a = wire.clone().into_chat_message();
        let b = wire.into_chat_message();
        assert_ne!(a.id, b.id);
        assert_eq!(a.content, "hi");
        assert_eq!(a.role, Role::User);
    }
}
