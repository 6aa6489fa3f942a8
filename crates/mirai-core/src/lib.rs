pub mod conversation;
pub mod errors;
pub mod ids;
pub mod messages;
pub mod outcome;
pub mod reducer;
pub mod stream;

pub use conversation::{ConversationDetail, ConversationId, ConversationState, HistoryEntry};
pub use errors::ClientError;
pub use ids::MessageId;
pub use messages::{ChatMessage, Role, WireMessage};
pub use outcome::{IgnoreReason, SendOutcome};
pub use reducer::{AssistantAccumulator, StateAction};
pub use stream::StreamEvent;
