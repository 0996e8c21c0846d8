//! 外部集成：电话平台 Webhook（需对应 feature 与公网域名）

#[cfg(feature = "twilio")]
pub mod twilio;
