//! 记忆层：会话消息日志

pub mod conversation;

pub use conversation::{Message, MessageStore, Role, ToolCallRequest};
