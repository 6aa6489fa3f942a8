use crate::errors::ClientError;

/// How one `send` left the `Sending` state.
///
/// Cancellation is its own variant rather than an error: it is a clean stop
/// that surfaces no message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// The stream finished (sentinel or end of body). `reply` is the text
    /// accumulated into the assistant placeholder.
    Completed { reply: String },
    /// A transport failure ended the send; one synthetic error message was
    /// appended.
    Failed(ClientError),
    /// Stopped by the user; partial content is kept as-is.
    Cancelled,
    /// The call was a no-op and did not touch state.
    Ignored(IgnoreReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    EmptyMessage,
    AlreadySending,
}

impl SendOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_ignored(&self) -> bool {
        matches!(self, Self::Ignored(_))
    }
}
