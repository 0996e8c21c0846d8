//! 编排器构建器：统一的组件初始化逻辑
//!
//! 默认按配置创建各个协作方（生成服务、通话存储、预约投递、语音合成）；
//! 测试或嵌入方可以用 with_* 替换其中任意一个。

use std::sync::Arc;
use std::time::Duration;

use crate::booking::{create_booking_sink_from_config, BookingDispatcher, BookingSink};
use crate::config::AppConfig;
use crate::core::orchestrator::{create_llm_from_config, TurnOrchestrator};
use crate::dialogue::{DialoguePolicy, PolicySettings};
use crate::llm::LlmClient;
use crate::speech::{create_renderer_from_config, SpeechRenderer};
use crate::store::{create_call_store, CallStore};

pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    store: Option<Arc<dyn CallStore>>,
    booking_sink: Option<Arc<dyn BookingSink>>,
    renderer: Option<Arc<dyn SpeechRenderer>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            store: None,
            booking_sink: None,
            renderer: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn CallStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_booking_sink(mut self, sink: Arc<dyn BookingSink>) -> Self {
        self.booking_sink = Some(sink);
        self
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn SpeechRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// 策略参数：事务所名称、生成超时、回复长度、历史轮数
    pub fn policy_settings(&self) -> PolicySettings {
        PolicySettings {
            firm_name: self.config.app.firm_name.clone(),
            generation_timeout: Duration::from_millis(self.config.call.generation_timeout_ms),
            max_reply_chars: self.config.call.max_reply_chars,
            max_context_turns: self.config.app.max_context_turns,
            max_silent_reprompts: self.config.call.max_silent_reprompts,
        }
    }

    pub fn build(self) -> TurnOrchestrator {
        let cfg = &self.config;
        let llm = self.llm.clone().unwrap_or_else(|| create_llm_from_config(cfg));
        let store = self
            .store
            .clone()
            .unwrap_or_else(|| create_call_store(cfg.call.max_active_calls, cfg.call.call_ttl_secs));
        let sink = self
            .booking_sink
            .clone()
            .unwrap_or_else(|| create_booking_sink_from_config(&cfg.booking));
        let renderer = self
            .renderer
            .clone()
            .unwrap_or_else(|| create_renderer_from_config(&cfg.speech));

        let policy = DialoguePolicy::new(llm, self.policy_settings());
        let dispatcher =
            BookingDispatcher::new(sink, Duration::from_millis(cfg.booking.timeout_ms))
                .with_selected_slot(cfg.booking.selected_slot.clone());

        TurnOrchestrator::new(
            store,
            policy,
            dispatcher,
            renderer,
            cfg.call.gather_timeout_secs,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_settings_follow_config() {
        let mut cfg = AppConfig::default();
        cfg.app.firm_name = "Test CPA".to_string();
        cfg.call.generation_timeout_ms = 1200;
        let builder = OrchestratorBuilder::new(cfg);
        let settings = builder.policy_settings();
        assert_eq!(settings.firm_name, "Test CPA");
        assert_eq!(settings.generation_timeout, Duration::from_millis(1200));
    }
}
