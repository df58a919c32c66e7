//! Conversation store abstraction.
//!
//! The orchestrator and fallback engine only see this trait, so tests can
//! swap the SQLite repository for anything that keeps insertion order.

use crate::error::Result;
use crate::types::{Message, MessageId, NewMessage, Scope};

/// Append-only, insertion-ordered log of conversation messages.
///
/// Implementations must make an appended message visible to the next
/// `read` issued through the same handle.
pub trait ConversationStore: Send + Sync {
    /// Append a message and return its sequence identifier.
    fn append(&self, message: &NewMessage) -> Result<MessageId>;

    /// Read messages for `scope` in ascending insertion order.
    ///
    /// With `limit = Some(n)` only the last `n` messages are returned.
    fn read(&self, scope: Scope, limit: Option<usize>) -> Result<Vec<Message>>;
}

impl<T: ConversationStore + ?Sized> ConversationStore for std::sync::Arc<T> {
    fn append(&self, message: &NewMessage) -> Result<MessageId> {
        (**self).append(message)
    }

    fn read(&self, scope: Scope, limit: Option<usize>) -> Result<Vec<Message>> {
        (**self).read(scope, limit)
    }
}
