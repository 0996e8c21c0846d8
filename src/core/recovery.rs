//! 错误恢复引擎
//!
//! 根据 CallError 类型返回 FallbackAction，供 TurnOrchestrator 决定本轮如何降级。

use crate::core::{CallError, FallbackAction};

/// 语义化错误恢复：将错误映射为可执行的降级动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &CallError) -> FallbackAction {
        match err {
            CallError::GenerationFailure(_) | CallError::GenerationTimeout(_) => {
                FallbackAction::ApologizeAndEnd
            }
            CallError::RenderingFailure(_) => FallbackAction::UseBuiltinVoice,
            CallError::DeliveryFailure(_) => FallbackAction::LogAndContinue,
            CallError::ResourceExhausted { .. } => FallbackAction::RejectCall,
            CallError::CallEnded(_) => FallbackAction::Hangup,
            CallError::ConfigError(_) => FallbackAction::ApologizeAndEnd,
        }
    }
}
