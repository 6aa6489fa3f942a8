//! Best-effort snapshot of the active conversation.
//!
//! Writes happen on every state change; failures are logged and dropped.
//! Nothing restores a session from here at startup.

use mirai_core::ConversationState;
use tracing::{debug, warn};

use crate::database::Database;
use crate::error::StoreError;
use crate::kv::KvRepo;

/// Fixed key of the snapshot row.
pub const DRAFT_KEY: &str = "miraiChatState";

#[derive(Clone)]
pub struct DraftCache {
    repo: KvRepo,
}

impl DraftCache {
    pub fn new(db: Database) -> Self {
        Self {
            repo: KvRepo::new(db),
        }
    }

    /// Persist `state` as `{"conversationId", "title", "messages"}`.
    /// Never fails from the caller's point of view.
    pub fn save(&self, state: &ConversationState) {
        if let Err(e) = self.try_save(state) {
            warn!(error = %e, key = DRAFT_KEY, "draft cache write failed");
        }
    }

    fn try_save(&self, state: &ConversationState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        self.repo.put(DRAFT_KEY, &json)?;
        debug!(messages = state.messages.len(), bytes = json.len(), "draft saved");
        Ok(())
    }

    /// Read the last snapshot, if any.
    pub fn load(&self) -> Result<Option<ConversationState>, StoreError> {
        match self.repo.get(DRAFT_KEY)? {
            Some(entry) => Ok(Some(serde_json::from_str(&entry.value)?)),
            None => Ok(None),
        }
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        let _ = self.repo.delete(DRAFT_KEY)?;
        Ok(())
    }
}
