//! 对话层：槽位定义、意图识别、槽位抽取与对话策略

pub mod extraction;
pub mod intent;
pub mod policy;
pub mod schema;

pub use extraction::{Extraction, ExtractionEngine};
pub use intent::{CallerIntent, GeneratedReply};
pub use policy::{DialogueIntent, DialoguePolicy, PolicySettings, Utterance, TERMINATION_MARKER};
pub use schema::{SlotName, Slots, Step};
