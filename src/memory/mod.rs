//! 记忆层：单通电话内的对话历史（不跨通话持久化）

pub mod conversation;

pub use conversation::{CallTranscript, Message, Role};
