//! Pure state transitions for [`ConversationState`].
//!
//! Every writer (session controller, history loader, reset) expresses its
//! change as a [`StateAction`] and folds it through
//! [`ConversationState::apply`].

use crate::conversation::{ConversationId, ConversationState};
use crate::ids::MessageId;
use crate::messages::ChatMessage;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StateAction {
    /// Append a message at the end of the list.
    Append(ChatMessage),
    /// Grow the content of the message with this id.
    AppendContent { id: MessageId, delta: String },
    /// Adopt a server id unless one is already set (first writer wins).
    AssignConversation(ConversationId),
    /// Adopt a server title. Blank titles are ignored.
    SetTitle(String),
    /// Swap in a loaded conversation wholesale.
    Replace(ConversationState),
    /// Back to `{absent, absent, empty}`.
    Reset,
}

impl ConversationState {
    #[must_use]
    pub fn apply(mut self, action: StateAction) -> Self {
        match action {
            StateAction::Append(message) => {
                self.messages.push(message);
                self
            }
            StateAction::AppendContent { id, delta } => {
                if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
                    message.content.push_str(&delta);
                }
                self
            }
            StateAction::AssignConversation(id) => {
                if self.conversation_id.is_none() {
                    self.conversation_id = Some(id);
                }
                self
            }
            StateAction::SetTitle(title) => {
                if !title.trim().is_empty() {
                    self.title = Some(title);
                }
                self
            }
            StateAction::Replace(next) => next,
            StateAction::Reset => Self::default(),
        }
    }
}

/// Tracks the single in-flight assistant message of a send.
///
/// The placeholder is created once with empty content; each delta becomes an
/// [`StateAction::AppendContent`] addressed by the placeholder's stable id.
#[derive(Clone, Debug)]
pub struct AssistantAccumulator {
    id: MessageId,
    text: String,
}

impl AssistantAccumulator {
    pub fn new() -> Self {
        Self {
            id: MessageId::new(),
            text: String::new(),
        }
    }

    pub fn id(&self) -> &MessageId {
        &self.id
    }

    /// The empty assistant message to append before the first delta.
    pub fn placeholder(&self) -> StateAction {
        StateAction::Append(ChatMessage {
            id: self.id.clone(),
            role: crate::messages::Role::Assistant,
            content: String::new(),
        })
    }

    pub fn push(&mut self, delta: &str) -> StateAction {
        self.text.push_str(delta);
        StateAction::AppendContent {
            id: self.id.clone(),
            delta: delta.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

impl Default for AssistantAccumulator {
    fn default() -> Self {
        Self::new()
    }
}
