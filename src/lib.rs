//! Receptionist - CPA 事务所电话前台
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 通话状态、错误与恢复、单轮编排、优雅关闭
//! - **dialogue**: 槽位定义、意图识别、槽位抽取、对话策略
//! - **store**: 通话状态存储（内存，按 call_id 加锁，过期清理）
//! - **booking**: 预约事件构造与恰好一次投递
//! - **speech**: 语音合成（HTTP 合成 / 平台自带音色）
//! - **llm**: 生成服务客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 单通电话的对话记录
//! - **observability**: 日志初始化
//! - **integrations**: 电话平台 Webhook（Twilio）

pub mod booking;
pub mod config;
pub mod core;
pub mod dialogue;
pub mod integrations;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod speech;
pub mod store;

pub use crate::core::{create_orchestrator, InboundTurn, OrchestratorBuilder, TurnOrchestrator, TurnResponse};
