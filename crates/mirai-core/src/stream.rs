/// Discrete update decoded from one chat stream.
///
/// Produced in arrival order; the decoder never reorders. Exists only for the
/// duration of one decode pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamEvent {
    /// Next fragment of assistant text. Never empty.
    ContentDelta { delta: String },
    /// `meta.conversation_id` seen in a record. Emitted for every occurrence;
    /// the consumer decides whether to adopt it.
    ConversationAssigned { conversation_id: i64 },
    /// Structured error payload reported inside the stream.
    ProviderError { message: String },
    /// Terminal sentinel observed.
    Done,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn is_content_delta(&self) -> bool {
        matches!(self, Self::ContentDelta { .. })
    }
}
