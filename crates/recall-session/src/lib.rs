//! Per-session conversation history and the reply-correlation index.

mod history;
mod reply;

pub use history::{ConversationLog, DEFAULT_PERSIST_LIMIT, StoredMessage};
pub use reply::ReplyIndex;
