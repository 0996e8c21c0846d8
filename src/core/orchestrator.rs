//! 通话编排器：把一轮来电从头到尾串起来
//!
//! 顺序：取 / 建通话状态 → 槽位抽取 → 对话策略 → 预约派发 → 结束判定 → 语音合成。
//! 同一通话的各轮由通话锁串行化；锁在整轮期间持有，状态在副本上修改，结束时整体写回。

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::booking::{BookingDispatcher, DispatchOutcome};
use crate::config::AppConfig;
use crate::core::builder::OrchestratorBuilder;
use crate::core::{CallError, FallbackAction, RecoveryEngine};
use crate::dialogue::{DialoguePolicy, ExtractionEngine, Utterance};
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient};
use crate::speech::{SpeechAudio, SpeechRenderer};
use crate::store::CallStore;

/// 电话平台送来的一轮
#[derive(Debug, Clone, Default)]
pub struct InboundTurn {
    pub call_id: String,
    /// 语音识别结果；来电者没说话时为空
    pub transcript: String,
    pub caller_address: Option<String>,
}

/// 给电话平台的指令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallAction {
    /// 说完继续听，超时后回到本服务重新提示
    SpeakAndListen { timeout_secs: u64 },
    /// 说完挂断
    SpeakAndEnd,
    /// 不说话直接挂断
    Hangup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnResponse {
    pub call_id: String,
    pub text: String,
    pub audio: SpeechAudio,
    pub action: CallAction,
}

impl TurnResponse {
    fn hangup(call_id: &str) -> Self {
        Self {
            call_id: call_id.to_string(),
            text: String::new(),
            audio: SpeechAudio::BuiltinVoice,
            action: CallAction::Hangup,
        }
    }
}

/// 根据配置与环境变量选择生成服务（OpenAI 兼容 / Mock）
pub(crate) fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let api_key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());

    match (provider.as_str(), api_key) {
        ("mock", _) => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
        (_, Some(key)) => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                Some(&key),
                cfg.llm.max_reply_tokens,
            ))
        }
        (_, None) => {
            tracing::warn!("OPENAI_API_KEY not set, using Mock LLM (scripted wording only)");
            Arc::new(MockLlmClient::new())
        }
    }
}

/// 按配置创建编排器
pub fn create_orchestrator(cfg: &AppConfig) -> TurnOrchestrator {
    OrchestratorBuilder::new(cfg.clone()).build()
}

pub struct TurnOrchestrator {
    store: Arc<dyn CallStore>,
    extraction: ExtractionEngine,
    policy: DialoguePolicy,
    dispatcher: BookingDispatcher,
    renderer: Arc<dyn SpeechRenderer>,
    recovery: RecoveryEngine,
    gather_timeout_secs: u64,
}

impl TurnOrchestrator {
    pub fn new(
        store: Arc<dyn CallStore>,
        policy: DialoguePolicy,
        dispatcher: BookingDispatcher,
        renderer: Arc<dyn SpeechRenderer>,
        gather_timeout_secs: u64,
    ) -> Self {
        Self {
            store,
            extraction: ExtractionEngine::new(),
            policy,
            dispatcher,
            renderer,
            recovery: RecoveryEngine::new(),
            gather_timeout_secs,
        }
    }

    pub fn store(&self) -> &Arc<dyn CallStore> {
        &self.store
    }

    /// 处理一轮；任何失败都落到一句来电者能听到的话或一次挂断上
    pub async fn handle_turn(&self, turn: InboundTurn) -> TurnResponse {
        let call_id = turn.call_id.as_str();
        let handle = match self.store.get_or_create(call_id).await {
            Ok(handle) => handle,
            Err(e) => return self.reject(call_id, e).await,
        };

        let mut guard = handle.lock().await;
        if guard.flags.ended {
            let action = self.recovery.handle(&CallError::CallEnded(call_id.to_string()));
            debug!(call_id, ?action, "Turn for ended call");
            return TurnResponse::hangup(call_id);
        }

        let mut state = guard.clone();
        if state.caller_address.is_none() {
            state.caller_address = turn.caller_address.clone();
        }

        let transcript = turn.transcript.trim();
        let extraction = self.extraction.extract(&mut state, transcript);
        if !transcript.is_empty() {
            state.record_caller(transcript);
        }

        let utterance = match self.policy.respond(&mut state, transcript, &extraction).await {
            Ok(utterance) => utterance,
            Err(e) => match self.recovery.handle(&e) {
                FallbackAction::ApologizeAndEnd => {
                    error!(call_id, error = %e, "Generation failed, apologizing and ending call");
                    Utterance::apology()
                }
                action => {
                    error!(call_id, error = %e, ?action, "Unexpected policy error");
                    Utterance::apology()
                }
            },
        };

        if let DispatchOutcome::Failed(e) =
            self.dispatcher.dispatch_if_complete(&mut state, &utterance.text).await
        {
            if self.recovery.handle(&e) == FallbackAction::LogAndContinue {
                warn!(call_id, "Booking delivery failed, call continues");
            }
        }

        if utterance.ends_call() && state.mark_ended() {
            info!(
                call_id,
                turns = state.turn_index + 1,
                booked = state.flags.booking_dispatched,
                "Call ended"
            );
        }
        state.record_assistant(&utterance.text);
        state.turn_index += 1;
        state.touch();
        *guard = state;
        drop(guard);

        self.speak(call_id, utterance).await
    }

    /// 通话状态回调（挂断、失败等）：释放通话状态
    pub async fn end_call(&self, call_id: &str) -> bool {
        let evicted = self.store.evict(call_id).await;
        if evicted {
            info!(call_id, "Call state evicted");
        }
        evicted
    }

    async fn reject(&self, call_id: &str, err: CallError) -> TurnResponse {
        match self.recovery.handle(&err) {
            FallbackAction::RejectCall => {
                warn!(call_id, error = %err, "Rejecting call");
                self.speak(call_id, Utterance::busy()).await
            }
            action => {
                error!(call_id, error = %err, ?action, "Call store error");
                TurnResponse::hangup(call_id)
            }
        }
    }

    async fn speak(&self, call_id: &str, utterance: Utterance) -> TurnResponse {
        let audio = match self.renderer.render(&utterance.text).await {
            Ok(audio) => audio,
            Err(e) => {
                let action = self.recovery.handle(&e);
                warn!(call_id, error = %e, ?action, "Speech rendering failed, using built-in voice");
                SpeechAudio::BuiltinVoice
            }
        };
        let action = if utterance.ends_call() {
            CallAction::SpeakAndEnd
        } else {
            CallAction::SpeakAndListen {
                timeout_secs: self.gather_timeout_secs,
            }
        };
        TurnResponse {
            call_id: call_id.to_string(),
            text: utterance.text,
            audio,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryCallStore;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FailingRenderer;

    #[async_trait]
    impl SpeechRenderer for FailingRenderer {
        async fn render(&self, _: &str) -> Result<SpeechAudio, CallError> {
            Err(CallError::RenderingFailure("tts down".to_string()))
        }
    }

    fn orchestrator() -> TurnOrchestrator {
        OrchestratorBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient::new()))
            .build()
    }

    fn turn(call_id: &str, transcript: &str) -> InboundTurn {
        InboundTurn {
            call_id: call_id.to_string(),
            transcript: transcript.to_string(),
            caller_address: Some("+15550001111".to_string()),
        }
    }

    #[tokio::test]
    async fn test_first_turn_greets_and_listens() {
        let orch = orchestrator();
        let resp = orch.handle_turn(turn("CA1", "")).await;
        assert!(resp.text.starts_with("Thanks for calling Ahad and Co CPA Firm"));
        assert_eq!(resp.action, CallAction::SpeakAndListen { timeout_secs: 5 });

        let handle = orch.store().get("CA1").await.unwrap();
        let state = handle.lock().await;
        assert_eq!(state.turn_index, 1);
        assert_eq!(state.caller_address.as_deref(), Some("+15550001111"));
        assert_eq!(state.history.len(), 1);
    }

    #[tokio::test]
    async fn test_rendering_failure_falls_back_to_builtin_voice() {
        let orch = OrchestratorBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient::new()))
            .with_renderer(Arc::new(FailingRenderer))
            .build();
        let resp = orch.handle_turn(turn("CA2", "")).await;
        assert_eq!(resp.audio, SpeechAudio::BuiltinVoice);
        assert!(!resp.text.is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_store_rejects_with_apology() {
        let orch = OrchestratorBuilder::new(AppConfig::default())
            .with_llm(Arc::new(MockLlmClient::new()))
            .with_store(Arc::new(MemoryCallStore::new(1, Duration::from_secs(60))))
            .build();
        orch.handle_turn(turn("CA-a", "")).await;
        let resp = orch.handle_turn(turn("CA-b", "")).await;
        assert_eq!(resp.action, CallAction::SpeakAndEnd);
        assert!(resp.text.contains("lines are busy"));
        assert!(orch.store().get("CA-b").await.is_none());
    }

    #[tokio::test]
    async fn test_end_call_evicts() {
        let orch = orchestrator();
        orch.handle_turn(turn("CA3", "")).await;
        assert!(orch.end_call("CA3").await);
        assert!(!orch.end_call("CA3").await);
        assert_eq!(orch.store().active_count().await, 0);
    }
}
