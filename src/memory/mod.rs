//! 记忆层：对话消息与会话持久化

pub mod conversation;
pub mod persistence;

pub use conversation::{Message, Role};
pub use persistence::ConversationPersistence;
