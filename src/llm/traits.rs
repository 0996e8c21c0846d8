//! 生成服务客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient::complete（非流式，电话场景一次取整句）。

use async_trait::async_trait;

use crate::memory::Message;

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；错误以字符串返回，由调用方包装为 CallError::GenerationFailure
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;
}
