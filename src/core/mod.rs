//! 核心编排层：错误与恢复、通话状态、构建器、单轮编排、优雅关闭

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod shutdown;
pub mod state;

pub use builder::OrchestratorBuilder;
pub use error::{CallError, FallbackAction};
pub use orchestrator::{create_orchestrator, CallAction, InboundTurn, TurnOrchestrator, TurnResponse};
pub use recovery::RecoveryEngine;
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::{CallFlags, CallSnapshot, CallState};
