//! 通话错误类型与降级动作
//!
//! 与 RecoveryEngine 配合：根据 CallError 决定道歉挂断 / 改用内置音色 / 记录后继续 / 拒接等。
//! 任何错误都不会让进程退出，最终都落到来电者能听到的一句话上。

use thiserror::Error;

/// 一轮通话处理中可能出现的错误（生成、合成、投递、容量）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    #[error("Generation timed out after {0} ms")]
    GenerationTimeout(u64),

    #[error("Speech rendering failed: {0}")]
    RenderingFailure(String),

    #[error("Booking delivery failed: {0}")]
    DeliveryFailure(String),

    /// 内存中的通话数已达上限
    #[error("Call store exhausted ({limit} active calls)")]
    ResourceExhausted { limit: usize },

    /// 通话已结束，后续轮次一律拒绝
    #[error("Call already ended: {0}")]
    CallEnded(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

/// 恢复引擎根据错误类型给出的降级动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackAction {
    /// 说一句固定的道歉并结束通话（生成失败时不能让通话原地打转）
    ApologizeAndEnd,
    /// 改用电话平台内置音色朗读文本
    UseBuiltinVoice,
    /// 记录日志，通话照常进行
    LogAndContinue,
    /// 拒接新来电（附道歉）
    RejectCall,
    /// 直接挂断，不再说话
    Hangup,
}
