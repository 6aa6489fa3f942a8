//! # History Directory Client
//!
//! Read-only access to past conversations plus the view-model of the history
//! selector. Listings are never cached: every open fetches again.

use std::sync::Arc;

use mirai_core::{ClientError, ConversationDetail, ConversationId, HistoryEntry};
use tracing::{debug, warn};

use crate::backend::ChatBackend;
use crate::session::SessionController;

#[derive(Clone)]
pub struct HistoryDirectory {
    backend: Arc<dyn ChatBackend>,
}

impl HistoryDirectory {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self { backend }
    }

    /// Entries in server order.
    pub async fn list(&self) -> Result<Vec<HistoryEntry>, ClientError> {
        self.backend.list_conversations().await
    }

    pub async fn load(&self, id: ConversationId) -> Result<ConversationDetail, ClientError> {
        self.backend.get_conversation(id).await
    }
}

/// State of the history dropdown.
#[derive(Clone)]
pub struct HistorySelector {
    directory: HistoryDirectory,
    pub open: bool,
    pub loading: bool,
    /// Last listing or selection failure, shown inline.
    pub error: Option<String>,
    pub entries: Vec<HistoryEntry>,
}

impl HistorySelector {
    pub fn new(directory: HistoryDirectory) -> Self {
        Self {
            directory,
            open: false,
            loading: false,
            error: None,
            entries: Vec::new(),
        }
    }

    /// Close if open; otherwise open and fetch a fresh listing. A failed
    /// fetch leaves the selector open with an empty list and the error.
    pub async fn toggle(&mut self) {
        if self.open {
            self.open = false;
            return;
        }
        self.open = true;
        self.loading = true;
        self.error = None;
        self.entries.clear();

        match self.directory.list().await {
            Ok(entries) => {
                debug!(count = entries.len(), "history listed");
                self.entries = entries;
            }
            Err(e) => {
                warn!(error_kind = e.error_kind(), error = %e, "history listing failed");
                self.error = Some(e.to_string());
            }
        }
        self.loading = false;
    }

    /// Load `id` into `controller` and close on success. On failure the
    /// controller state is untouched and the error is recorded.
    pub async fn select(
        &mut self,
        id: ConversationId,
        controller: &SessionController,
    ) -> Result<(), ClientError> {
        self.error = None;
        match controller.load_conversation(id).await {
            Ok(()) => {
                self.open = false;
                Ok(())
            }
            Err(e) => {
                self.error = Some(e.to_string());
                Err(e)
            }
        }
    }
}
