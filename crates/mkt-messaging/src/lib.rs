//! mkt-messaging
//!
//! Participant-scoped conversations and their messages.
//!
//! Ordering comes from the store's `(createdAt, seq)` key: conversation
//! listings are newest-first (inbox), message listings oldest-first (chat).

mod conversations;
mod messages;

pub use conversations::{ConversationService, NewConversation, PageLimits};
pub use messages::MessageService;
