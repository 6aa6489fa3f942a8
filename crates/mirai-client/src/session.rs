//! # Conversation Session Controller
//!
//! Owns the active [`ConversationState`] and drives one send at a time:
//!
//! 1. Optimistically append the user message and clear the composer
//! 2. Open the stream with the known conversation id (`0` for a new one)
//! 3. Fold decoded events into a single placeholder assistant message
//! 4. Reconcile the conversation id, first writer wins (header or `meta`)
//! 5. Clear the in-flight flag, then refresh the title best-effort
//!
//! Every state change goes through [`ConversationState::apply`] and is
//! published to subscribers. With a draft cache attached, a background task
//! follows the published states and saves the latest one on the blocking
//! pool; bursts of deltas collapse into one write.
//!
//! `reset` and `load_conversation` cancel an in-flight send and bump the
//! session generation. Writes tagged with an older generation are dropped,
//! so a cancelled send can never leak into the next conversation.

use std::sync::Arc;

use mirai_core::{
    AssistantAccumulator, ChatMessage, ClientError, ConversationId, ConversationState,
    IgnoreReason, SendOutcome, StateAction, StreamEvent,
};
use mirai_store::DraftCache;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::{ChatBackend, StreamRequest};

#[derive(Default)]
struct Shared {
    state: ConversationState,
    in_flight: bool,
    cancel: Option<CancellationToken>,
    generation: u64,
    input: String,
}

/// Cheap to clone; clones drive the same session.
#[derive(Clone)]
pub struct SessionController {
    backend: Arc<dyn ChatBackend>,
    shared: Arc<Mutex<Shared>>,
    updates: Arc<watch::Sender<ConversationState>>,
    drafts_saved: Option<watch::Receiver<ConversationState>>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        let (updates, _) = watch::channel(ConversationState::default());
        Self {
            backend,
            shared: Arc::new(Mutex::new(Shared::default())),
            updates: Arc::new(updates),
            drafts_saved: None,
        }
    }

    /// Persist state changes to `drafts`. Must be called inside a Tokio
    /// runtime.
    #[must_use]
    pub fn with_drafts(mut self, drafts: DraftCache) -> Self {
        self.drafts_saved = Some(spawn_draft_writer(drafts, self.updates.subscribe()));
        self
    }

    /// Wait until the draft cache holds the current state. Returns at once
    /// without a draft cache.
    pub async fn drafts_settled(&self) {
        let Some(mut saved) = self.drafts_saved.clone() else {
            return;
        };
        let target = self.state();
        let _ = saved.wait_for(|state| *state == target).await;
    }

    pub fn backend(&self) -> &Arc<dyn ChatBackend> {
        &self.backend
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> ConversationState {
        self.shared.lock().state.clone()
    }

    /// Receiver that observes every published state.
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.updates.subscribe()
    }

    pub fn is_sending(&self) -> bool {
        self.shared.lock().in_flight
    }

    pub fn input(&self) -> String {
        self.shared.lock().input.clone()
    }

    pub fn set_input(&self, text: impl Into<String>) {
        self.shared.lock().input = text.into();
    }

    /// Send the composer contents. The buffer is cleared only if the send is
    /// accepted.
    pub async fn submit(&self) -> SendOutcome {
        let text = self.input();
        self.send(&text).await
    }

    /// Send one user message and stream the reply into the state.
    ///
    /// Returns once the send has left the `Sending` state and the title
    /// refresh has settled.
    pub async fn send(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored(IgnoreReason::EmptyMessage);
        }

        let (generation, token, conversation_id) = {
            let mut shared = self.shared.lock();
            if shared.in_flight {
                debug!("send ignored, another send is in flight");
                return SendOutcome::Ignored(IgnoreReason::AlreadySending);
            }
            let token = CancellationToken::new();
            shared.in_flight = true;
            shared.cancel = Some(token.clone());
            shared.input.clear();
            self.apply_locked(&mut shared, StateAction::Append(ChatMessage::user(text)));
            (shared.generation, token, shared.state.conversation_id)
        };

        info!(
            conversation_id = ConversationId::wire(conversation_id),
            chars = text.len(),
            "send started"
        );
        let outcome = self.stream_reply(generation, &token, conversation_id, text).await;
        self.finish_send(generation);

        match &outcome {
            SendOutcome::Completed { reply } => info!(reply_chars = reply.len(), "send completed"),
            SendOutcome::Cancelled => info!("send cancelled"),
            SendOutcome::Failed(e) => warn!(error_kind = e.error_kind(), error = %e, "send failed"),
            SendOutcome::Ignored(_) => {}
        }

        self.refresh_title(generation).await;
        outcome
    }

    /// Signal cancellation of the in-flight send. Returns whether one existed.
    pub fn cancel(&self) -> bool {
        let token = self.shared.lock().cancel.clone();
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Start a new conversation: `{absent, absent, empty}`.
    pub fn reset(&self) {
        let mut shared = self.shared.lock();
        Self::abandon_send(&mut shared);
        self.apply_locked(&mut shared, StateAction::Reset);
        info!("session reset");
    }

    /// Swap in a conversation state wholesale.
    pub fn replace(&self, state: ConversationState) {
        let mut shared = self.shared.lock();
        Self::abandon_send(&mut shared);
        self.apply_locked(&mut shared, StateAction::Replace(state));
    }

    /// Fetch a conversation and make it the active one. On failure the
    /// current state is left untouched.
    pub async fn load_conversation(&self, id: ConversationId) -> Result<(), ClientError> {
        let detail = self.backend.get_conversation(id).await.map_err(|e| {
            warn!(conversation_id = %id, error_kind = e.error_kind(), error = %e, "conversation load failed");
            e
        })?;
        let state = detail.into_state();
        info!(conversation_id = %id, messages = state.messages.len(), "conversation loaded");
        self.replace(state);
        Ok(())
    }

    /// Create an empty conversation on the server and make it the active one.
    pub async fn create_conversation(&self) -> Result<ConversationId, ClientError> {
        let entry = self.backend.create_conversation().await.map_err(|e| {
            warn!(error_kind = e.error_kind(), error = %e, "conversation create failed");
            e
        })?;
        info!(conversation_id = %entry.id, "conversation created");
        let title = entry.title.filter(|t| !t.trim().is_empty());
        self.replace(ConversationState {
            conversation_id: Some(entry.id),
            title,
            messages: Vec::new(),
        });
        Ok(entry.id)
    }

    /// Rename the active conversation on the server and adopt the stored title.
    pub async fn rename(&self, title: &str) -> Result<(), ClientError> {
        let (generation, conversation_id) = {
            let shared = self.shared.lock();
            (shared.generation, shared.state.conversation_id)
        };
        let id = conversation_id.ok_or_else(|| {
            ClientError::InvalidRequest("conversation has not been saved yet".to_string())
        })?;
        let entry = self.backend.rename_conversation(id, title).await?;
        if let Some(title) = entry.title {
            let _ = self.commit(generation, StateAction::SetTitle(title));
        }
        Ok(())
    }

    async fn stream_reply(
        &self,
        generation: u64,
        token: &CancellationToken,
        conversation_id: Option<ConversationId>,
        text: &str,
    ) -> SendOutcome {
        let request = StreamRequest::new(conversation_id, text);
        let opened = tokio::select! {
            biased;
            () = token.cancelled() => return SendOutcome::Cancelled,
            result = self.backend.open_stream(request) => result,
        };
        let mut response = match opened {
            Ok(response) => response,
            Err(e) => return self.fail(generation, e),
        };

        if let Some(id) = response.conversation_id {
            debug!(conversation_id = %id, "conversation id from header");
            if !self.commit(generation, StateAction::AssignConversation(id)) {
                return SendOutcome::Cancelled;
            }
        }

        let mut accumulator = AssistantAccumulator::new();
        if !self.commit(generation, accumulator.placeholder()) {
            return SendOutcome::Cancelled;
        }

        loop {
            let next = tokio::select! {
                biased;
                () = token.cancelled() => return SendOutcome::Cancelled,
                next = response.events.next() => next,
            };

            let action = match next {
                None | Some(Ok(StreamEvent::Done)) => break,
                Some(Ok(StreamEvent::ContentDelta { delta })) => accumulator.push(&delta),
                Some(Ok(StreamEvent::ConversationAssigned { conversation_id })) => {
                    match ConversationId::new(conversation_id) {
                        Some(id) => StateAction::AssignConversation(id),
                        None => {
                            debug!(conversation_id, "ignoring non-positive conversation id");
                            continue;
                        }
                    }
                }
                Some(Ok(StreamEvent::ProviderError { message })) => {
                    warn!(message = %message, "provider error in stream");
                    StateAction::Append(ChatMessage::provider_error(&message))
                }
                Some(Err(e)) => return self.fail(generation, e),
            };

            if !self.commit(generation, action) {
                return SendOutcome::Cancelled;
            }
        }

        SendOutcome::Completed {
            reply: accumulator.into_text(),
        }
    }

    /// Surface a transport failure as one synthetic assistant message.
    fn fail(&self, generation: u64, error: ClientError) -> SendOutcome {
        let _ = self.commit(
            generation,
            StateAction::Append(ChatMessage::transport_error(&error)),
        );
        SendOutcome::Failed(error)
    }

    fn finish_send(&self, generation: u64) {
        let mut shared = self.shared.lock();
        if shared.generation == generation {
            shared.in_flight = false;
            shared.cancel = None;
        }
    }

    /// Adopt the server title if the conversation has one. Every failure is
    /// a silent no-op.
    async fn refresh_title(&self, generation: u64) {
        let conversation_id = {
            let shared = self.shared.lock();
            if shared.generation != generation {
                return;
            }
            shared.state.conversation_id
        };
        let Some(id) = conversation_id else {
            return;
        };

        match self.backend.get_conversation(id).await {
            Ok(detail) => {
                if let Some(title) = detail.non_empty_title() {
                    let _ = self.commit(generation, StateAction::SetTitle(title.to_string()));
                }
            }
            Err(e) => debug!(conversation_id = %id, error = %e, "title refresh skipped"),
        }
    }

    fn abandon_send(shared: &mut Shared) {
        if let Some(token) = shared.cancel.take() {
            token.cancel();
        }
        shared.in_flight = false;
        shared.generation += 1;
    }

    /// Apply `action` if `generation` is still current.
    fn commit(&self, generation: u64, action: StateAction) -> bool {
        let mut shared = self.shared.lock();
        if shared.generation != generation {
            debug!(generation, current = shared.generation, "dropping stale update");
            return false;
        }
        self.apply_locked(&mut shared, action);
        true
    }

    fn apply_locked(&self, shared: &mut Shared, action: StateAction) {
        let state = std::mem::take(&mut shared.state).apply(action);
        shared.state = state.clone();
        let _ = self.updates.send_replace(state);
    }
}

/// Save each newly published state, skipping any superseded while a write
/// was running. Ends when every controller clone is dropped.
fn spawn_draft_writer(
    drafts: DraftCache,
    mut updates: watch::Receiver<ConversationState>,
) -> watch::Receiver<ConversationState> {
    let (saved_tx, saved_rx) = watch::channel(updates.borrow().clone());
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            let drafts = drafts.clone();
            let snapshot = state.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || drafts.save(&snapshot)).await {
                warn!(error = %e, "draft save task failed");
            }
            let _ = saved_tx.send_replace(state);
        }
        debug!("draft writer stopped");
    });
    saved_rx
}

#[cfg(test)]
mod tests {
    use mirai_core::{Role, WireMessage};
    use mirai_store::Database;

    use super::*;
    use crate::mock::{MockBackend, MockResponse};

    fn setup() -> (Arc<MockBackend>, SessionController) {
        let mock = Arc::new(MockBackend::new());
        let controller = SessionController::new(mock.clone());
        (mock, controller)
    }

    fn contents(state: &ConversationState) -> Vec<(Role, String)> {
        state
            .messages
            .iter()
            .map(|m| (m.role, m.content.clone()))
            .collect()
    }

    async fn wait_for_messages(controller: &SessionController, count: usize) {
        let mut rx = controller.subscribe();
        let _ = rx.wait_for(|s| s.messages.len() >= count).await.unwrap();
    }

    #[tokio::test]
    async fn hello_streams_into_one_assistant_message() {
        let (mock, controller) = setup();
        mock.push_response(MockResponse::sse(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n",
            "data: [DONE]\n",
        )));

        let outcome = controller.send("hello").await;

        assert_eq!(outcome, SendOutcome::Completed { reply: "hi there".into() });
        assert_eq!(
            contents(&controller.state()),
            vec![
                (Role::User, "hello".to_string()),
                (Role::Assistant, "hi there".to_string())
            ]
        );
        assert!(!controller.is_sending());
        let request = &mock.requests()[0];
        assert_eq!(request.conversation_id, 0);
        assert_eq!(request.messages, vec![WireMessage::user("hello")]);
    }

    #[tokio::test]
    async fn header_id_is_adopted() {
        let (mock, controller) = setup();
        mock.push_response(MockResponse::text(&["ok"]).with_header_id(42));

        let _ = controller.send("hi").await;
        assert_eq!(controller.state().conversation_id, ConversationId::new(42));
    }

    #[tokio::test]
    async fn header_wins_over_later_meta() {
        let (mock, controller) = setup();
        mock.push_response(
            MockResponse::sse(concat!(
                "data: {\"meta\":{\"conversation_id\":99}}\n",
                "data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n",
                "data: [DONE]\n",
            ))
            .with_header_id(42),
        );

        let _ = controller.send("hi").await;
        assert_eq!(controller.state().conversation_id, ConversationId::new(42));
    }

    #[tokio::test]
    async fn first_meta_wins_and_title_refreshes() {
        let (mock, controller) = setup();
        mock.insert_conversation(7, Some("Greetings"), Vec::new());
        mock.push_response(MockResponse::sse(concat!(
            "data: {\"meta\":{\"conversation_id\":7}}\n",
            "data: {\"meta\":{\"conversation_id\":8}}\n",
            "data: [DONE]\n",
        )));

        let _ = controller.send("hi").await;
        let state = controller.state();
        assert_eq!(state.conversation_id, ConversationId::new(7));
        assert_eq!(state.title.as_deref(), Some("Greetings"));
    }

    #[tokio::test]
    async fn known_id_is_sent_on_next_turn() {
        let (mock, controller) = setup();
        mock.push_response(MockResponse::text(&["one"]).with_header_id(5));
        mock.push_response(MockResponse::text(&["two"]));

        let _ = controller.send("first").await;
        let _ = controller.send("second").await;

        let requests = mock.requests();
        assert_eq!(requests[1].conversation_id, 5);
        assert_eq!(requests[1].messages.len(), 1);
        assert_eq!(controller.state().messages.len(), 4);
    }

    #[tokio::test]
    async fn blank_text_is_ignored() {
        let (mock, controller) = setup();
        let outcome = controller.send("   \n").await;
        assert_eq!(outcome, SendOutcome::Ignored(IgnoreReason::EmptyMessage));
        assert!(controller.state().messages.is_empty());
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn second_send_while_sending_is_ignored() {
        let (mock, controller) = setup();
        let (response, tx) = MockResponse::channel();
        mock.push_response(response);

        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.send("first").await }
        });
        wait_for_messages(&controller, 2).await;

        let before = controller.state().messages.len();
        let outcome = controller.send("second").await;
        assert_eq!(outcome, SendOutcome::Ignored(IgnoreReason::AlreadySending));
        assert_eq!(controller.state().messages.len(), before);

        tx.send(Ok(StreamEvent::Done)).unwrap();
        assert!(task.await.unwrap().is_completed());
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn cancel_keeps_partial_content_without_error() {
        let (mock, controller) = setup();
        let (response, tx) = MockResponse::channel();
        mock.push_response(response);

        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.send("tell me").await }
        });
        tx.send(Ok(StreamEvent::ContentDelta { delta: "par".into() })).unwrap();
        let mut rx = controller.subscribe();
        let _ = rx
            .wait_for(|s| s.last_message().is_some_and(|m| m.content == "par"))
            .await
            .unwrap();

        assert!(controller.cancel());
        assert_eq!(task.await.unwrap(), SendOutcome::Cancelled);
        let _ = tx.send(Ok(StreamEvent::ContentDelta { delta: "tial".into() }));

        assert_eq!(
            contents(&controller.state()),
            vec![
                (Role::User, "tell me".to_string()),
                (Role::Assistant, "par".to_string())
            ]
        );
        assert!(!controller.is_sending());
        assert!(!controller.cancel());
    }

    #[tokio::test]
    async fn cancel_while_opening() {
        let (mock, controller) = setup();
        mock.push_response(MockResponse::Pending);

        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.send("hi").await }
        });
        wait_for_messages(&controller, 1).await;
        assert!(controller.cancel());

        assert_eq!(task.await.unwrap(), SendOutcome::Cancelled);
        assert_eq!(controller.state().messages.len(), 1);
    }

    #[tokio::test]
    async fn open_failure_appends_one_error_message() {
        let (mock, controller) = setup();
        mock.push_response(MockResponse::Error(ClientError::Status {
            status: 500,
            body: String::new(),
        }));

        let outcome = controller.send("hi").await;
        assert!(matches!(outcome, SendOutcome::Failed(ref e) if e.status() == Some(500)));
        assert_eq!(
            contents(&controller.state()),
            vec![
                (Role::User, "hi".to_string()),
                (Role::Assistant, "Error: HTTP 500".to_string())
            ]
        );
        assert!(!controller.is_sending());
    }

    #[tokio::test]
    async fn mid_stream_failure_keeps_partial_reply() {
        let (mock, controller) = setup();
        mock.push_response(MockResponse::Events {
            conversation_id: None,
            events: vec![
                Ok(StreamEvent::ContentDelta { delta: "half".into() }),
                Err(ClientError::StreamInterrupted("reset".into())),
            ],
        });

        let outcome = controller.send("hi").await;
        assert!(matches!(outcome, SendOutcome::Failed(ClientError::StreamInterrupted(_))));
        let state = controller.state();
        assert_eq!(state.messages.len(), 3);
        assert_eq!(state.messages[1].content, "half");
        assert!(state.messages[2].content.starts_with("Error: "));
    }

    #[tokio::test]
    async fn provider_error_is_separate_message_and_stream_continues() {
        let (mock, controller) = setup();
        mock.push_response(MockResponse::sse(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\n",
            "data: {\"error\":{\"message\":\"rate limited\"}}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n",
            "data: [DONE]\n",
        )));

        let outcome = controller.send("hi").await;
        assert_eq!(outcome, SendOutcome::Completed { reply: "ab".into() });
        assert_eq!(
            contents(&controller.state()),
            vec![
                (Role::User, "hi".to_string()),
                (Role::Assistant, "ab".to_string()),
                (Role::Assistant, "Provider error: rate limited".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn malformed_record_does_not_interrupt() {
        let (mock, controller) = setup();
        mock.push_response(MockResponse::sse(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n",
            "data: {not-json}\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" there\"}}]}\n",
            "data: [DONE]\n",
        )));

        let outcome = controller.send("hello").await;
        assert_eq!(outcome, SendOutcome::Completed { reply: "hi there".into() });
    }

    #[tokio::test]
    async fn title_refresh_failure_is_swallowed() {
        let (mock, controller) = setup();
        mock.push_response(MockResponse::text(&["ok"]).with_header_id(3));

        let outcome = controller.send("hi").await;
        assert!(outcome.is_completed());
        assert_eq!(mock.detail_calls(), 1);
        assert!(controller.state().title.is_none());
    }

    #[tokio::test]
    async fn no_title_refresh_without_id() {
        let (mock, controller) = setup();
        mock.push_response(MockResponse::text(&["ok"]));
        let _ = controller.send("hi").await;
        assert_eq!(mock.detail_calls(), 0);
    }

    #[tokio::test]
    async fn blank_server_title_keeps_none() {
        let (mock, controller) = setup();
        mock.insert_conversation(4, Some("   "), Vec::new());
        mock.push_response(MockResponse::text(&["ok"]).with_header_id(4));
        let _ = controller.send("hi").await;
        assert!(controller.state().title.is_none());
    }

    #[tokio::test]
    async fn reset_during_send_discards_late_events() {
        let (mock, controller) = setup();
        let (response, tx) = MockResponse::channel();
        mock.push_response(response.with_header_id(12));

        let task = tokio::spawn({
            let controller = controller.clone();
            async move { controller.send("hi").await }
        });
        wait_for_messages(&controller, 2).await;

        controller.reset();
        let _ = tx.send(Ok(StreamEvent::ContentDelta { delta: "late".into() }));
        assert_eq!(task.await.unwrap(), SendOutcome::Cancelled);

        assert_eq!(controller.state(), ConversationState::default());
        assert!(!controller.is_sending());
        assert_eq!(mock.detail_calls(), 0);
    }

    #[tokio::test]
    async fn reset_clears_everything() {
        let (mock, controller) = setup();
        mock.insert_conversation(2, Some("Old"), vec![WireMessage::user("q")]);
        controller.load_conversation(ConversationId::new(2).unwrap()).await.unwrap();
        assert!(!controller.state().is_empty());

        controller.reset();
        assert!(controller.state().is_empty());
        assert_eq!(controller.subscribe().borrow().clone(), ConversationState::default());
    }

    #[tokio::test]
    async fn load_conversation_replaces_state_with_fresh_ids() {
        let (mock, controller) = setup();
        mock.insert_conversation(
            6,
            Some("Trip"),
            vec![
                WireMessage::user("plan"),
                WireMessage {
                    role: Role::Assistant,
                    content: "sure".into(),
                },
            ],
        );
        mock.push_response(MockResponse::text(&["x"]));
        let _ = controller.send("unrelated").await;

        controller.load_conversation(ConversationId::new(6).unwrap()).await.unwrap();
        let state = controller.state();
        assert_eq!(state.conversation_id, ConversationId::new(6));
        assert_eq!(state.title.as_deref(), Some("Trip"));
        assert_eq!(
            contents(&state),
            vec![
                (Role::User, "plan".to_string()),
                (Role::Assistant, "sure".to_string())
            ]
        );
        assert_ne!(state.messages[0].id, state.messages[1].id);
    }

    #[tokio::test]
    async fn failed_load_leaves_state() {
        let (mock, controller) = setup();
        mock.push_response(MockResponse::text(&["x"]));
        let _ = controller.send("keep me").await;
        let before = controller.state();

        let err = controller
            .load_conversation(ConversationId::new(404).unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
        assert_eq!(controller.state(), before);
    }

    #[tokio::test]
    async fn created_conversation_is_used_by_next_send() {
        let (mock, controller) = setup();
        mock.push_response(MockResponse::text(&["x"]));
        let _ = controller.send("old").await;

        let id = controller.create_conversation().await.unwrap();
        let state = controller.state();
        assert_eq!(state.conversation_id, Some(id));
        assert!(state.messages.is_empty());
        assert_eq!(state.title, None);

        mock.push_response(MockResponse::text(&["y"]));
        let _ = controller.send("first").await;
        assert_eq!(mock.requests()[1].conversation_id, id.get());
        assert_eq!(controller.state().messages.len(), 2);
    }

    #[tokio::test]
    async fn rename_requires_saved_conversation() {
        let (mock, controller) = setup();
        let err = controller.rename("Title").await.unwrap_err();
        assert!(matches!(err, ClientError::InvalidRequest(_)));

        mock.insert_conversation(3, None, Vec::new());
        controller.load_conversation(ConversationId::new(3).unwrap()).await.unwrap();
        controller.rename(" Weekly sync ").await.unwrap();
        assert_eq!(controller.state().title.as_deref(), Some("Weekly sync"));
    }

    #[tokio::test]
    async fn submit_uses_and_clears_input() {
        let (mock, controller) = setup();
        mock.push_response(MockResponse::text(&["ok"]));

        controller.set_input("  from the composer ");
        let outcome = controller.submit().await;
        assert!(outcome.is_completed());
        assert_eq!(controller.input(), "");
        assert_eq!(mock.requests()[0].messages[0].content, "from the composer");
    }

    #[tokio::test]
    async fn ignored_submit_keeps_input() {
        let (_mock, controller) = setup();
        controller.set_input("   ");
        assert!(controller.submit().await.is_ignored());
        assert_eq!(controller.input(), "   ");
    }

    #[tokio::test]
    async fn every_change_reaches_draft_cache() {
        let mock = Arc::new(MockBackend::new());
        let drafts = DraftCache::new(Database::in_memory().unwrap());
        let controller = SessionController::new(mock.clone()).with_drafts(drafts.clone());
        mock.push_response(MockResponse::text(&["saved"]).with_header_id(1));

        let _ = controller.send("persist").await;
        controller.drafts_settled().await;
        assert_eq!(drafts.load().unwrap(), Some(controller.state()));

        controller.reset();
        controller.drafts_settled().await;
        assert_eq!(drafts.load().unwrap(), Some(ConversationState::default()));
    }

    #[tokio::test]
    async fn burst_of_deltas_settles_on_latest_state() {
        let mock = Arc::new(MockBackend::new());
        let drafts = DraftCache::new(Database::in_memory().unwrap());
        let controller = SessionController::new(mock.clone()).with_drafts(drafts.clone());
        let words: Vec<String> = (0..200).map(|i| format!("w{i} ")).collect();
        let chunks: Vec<&str> = words.iter().map(String::as_str).collect();
        mock.push_response(MockResponse::text(&chunks));

        let outcome = controller.send("long reply").await;
        assert!(outcome.is_completed());
        controller.drafts_settled().await;

        let saved = drafts.load().unwrap().unwrap();
        assert_eq!(saved, controller.state());
        assert_eq!(saved.messages[1].content, words.concat());
    }

    #[tokio::test]
    async fn broken_draft_store_never_blocks_sends() {
        let mock = Arc::new(MockBackend::new());
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE kv_entries")?;
            Ok(())
        })
        .unwrap();
        let controller = SessionController::new(mock.clone()).with_drafts(DraftCache::new(db));
        mock.push_response(MockResponse::text(&["fine"]));

        assert!(controller.send("hi").await.is_completed());
        controller.drafts_settled().await;
        assert_eq!(controller.state().messages.len(), 2);
    }

    #[tokio::test]
    async fn settled_without_drafts_returns_immediately() {
        let (_mock, controller) = setup();
        controller.drafts_settled().await;
    }
}
