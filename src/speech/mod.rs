//! 语音合成层
//!
//! 把前台话语渲染成可播放音频。合成失败或未配置时退回电话平台自带音色（直接 `<Say>` 文本），
//! 通话不会因此中断。

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SpeechSection;
use crate::core::CallError;

pub use http::HttpSpeechRenderer;

/// 渲染结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechAudio {
    /// 可直接 `<Play>` 的音频地址
    Hosted { url: String },
    /// 使用电话平台自带音色朗读文本
    BuiltinVoice,
}

#[async_trait]
pub trait SpeechRenderer: Send + Sync {
    async fn render(&self, text: &str) -> Result<SpeechAudio, CallError>;
}

/// 始终使用自带音色
pub struct BuiltinVoiceRenderer;

#[async_trait]
impl SpeechRenderer for BuiltinVoiceRenderer {
    async fn render(&self, _text: &str) -> Result<SpeechAudio, CallError> {
        Ok(SpeechAudio::BuiltinVoice)
    }
}

/// provider = "http" 且配置了 endpoint 时走 HTTP 合成，否则自带音色
pub fn create_renderer_from_config(cfg: &SpeechSection) -> Arc<dyn SpeechRenderer> {
    match (cfg.provider.as_str(), cfg.endpoint.as_deref()) {
        ("http", Some(endpoint)) if !endpoint.trim().is_empty() => {
            tracing::info!(endpoint = %endpoint, "Using HTTP speech renderer");
            Arc::new(HttpSpeechRenderer::new(
                endpoint,
                cfg.voice.clone(),
                std::time::Duration::from_millis(cfg.timeout_ms),
            ))
        }
        ("http", _) => {
            tracing::warn!("speech.provider is http but no endpoint is set, using built-in voice");
            Arc::new(BuiltinVoiceRenderer)
        }
        _ => Arc::new(BuiltinVoiceRenderer),
    }
}
