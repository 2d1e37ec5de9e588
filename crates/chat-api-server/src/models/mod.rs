pub mod chat;

pub use chat::{ChatMessage, ConversationId, Role, Turn};
