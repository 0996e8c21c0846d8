//! Mock 生成服务（用于测试与无 API Key 的本地演示）
//!
//! 优先返回预置回复；没有预置时，取最后一条 System 消息里 "Suggested wording:" 后的话术原样返回，
//! 这样不接 LLM 也能把整通电话走完。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::{Message, Role};

pub const SUGGESTED_WORDING_PREFIX: &str = "Suggested wording:";

#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 按顺序返回给定回复，用完后回到话术回显
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// 被调用次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let queued = self
            .replies
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front();
        if let Some(reply) = queued {
            return Ok(reply);
        }

        let wording = messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::System)
            .find_map(|m| {
                m.content.lines().find_map(|line| {
                    line.trim()
                        .strip_prefix(SUGGESTED_WORDING_PREFIX)
                        .map(|w| w.trim().to_string())
                })
            })
            .unwrap_or_else(|| "Could you say that once more?".to_string());

        Ok(serde_json::json!({ "text": wording }).to_string())
    }
}
