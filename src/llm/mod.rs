//! LLM 层：生成服务客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockLlmClient, SUGGESTED_WORDING_PREFIX};
pub use openai::OpenAiClient;
pub use traits::LlmClient;
