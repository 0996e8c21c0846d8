//! 通话记录：按顺序追加的 (说话人, 话语) 序列
//!
//! 只在通话期间存在，不做剪枝；送入生成服务时只取最近 N 轮（见 `recent`）。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致；User 即来电者）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 单通电话的完整对话历史（只追加）
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CallTranscript {
    messages: Vec<Message>,
}

impl CallTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 最近 max_turns 轮（每轮含来电者 + 前台，故最多 max_turns*2 条）
    pub fn recent(&self, max_turns: usize) -> &[Message] {
        let keep = max_turns * 2;
        &self.messages[self.messages.len().saturating_sub(keep)..]
    }

    /// 前台最后说的一句话（用于判断上一轮在问什么）
    pub fn last_assistant(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .map(|m| m.content.as_str())
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
