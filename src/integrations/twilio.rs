//! Twilio 语音 Webhook 集成
//!
//! 每次来电者说完一句，Twilio 把识别结果 POST 到 /voice，这里交给 TurnOrchestrator 处理，
//! 再把结果渲染成 TwiML 返回。通话结束时 Twilio 回调 /status，释放通话状态。

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use tower::limit::GlobalConcurrencyLimitLayer;

use crate::config::CallSection;
use crate::core::{CallAction, InboundTurn, TurnOrchestrator, TurnResponse};
use crate::speech::SpeechAudio;

pub const VOICE_PATH: &str = "/voice";

/// 这些状态表示通话已经结束
const TERMINAL_STATUSES: [&str; 5] = ["completed", "failed", "busy", "no-answer", "canceled"];

/// 语音服务状态
pub struct VoiceState {
    pub orchestrator: Arc<TurnOrchestrator>,
    pub say: SayOptions,
}

/// 内置音色的 <Say> 参数
#[derive(Debug, Clone)]
pub struct SayOptions {
    pub voice: String,
    pub language: String,
    pub rate: Option<String>,
}

impl From<&CallSection> for SayOptions {
    fn from(call: &CallSection) -> Self {
        Self {
            voice: call.voice.clone(),
            language: call.language.clone(),
            rate: call.speech_rate.clone().filter(|r| !r.trim().is_empty()),
        }
    }
}

impl VoiceState {
    pub fn new(orchestrator: Arc<TurnOrchestrator>, call: &CallSection) -> Self {
        Self {
            orchestrator,
            say: SayOptions::from(call),
        }
    }
}

/// Twilio 语音回调表单（只取用到的字段）
#[derive(Debug, Deserialize)]
pub struct VoiceForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
    #[serde(rename = "From")]
    pub from: Option<String>,
}

/// Twilio 通话状态回调表单
#[derive(Debug, Deserialize)]
pub struct StatusForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: Option<String>,
}

/// 创建语音路由；max_concurrent_turns 限制同时处理的请求数
pub fn create_router(state: Arc<VoiceState>, max_concurrent_turns: usize) -> Router {
    Router::new()
        .route(VOICE_PATH, post(voice_webhook))
        .route("/status", post(status_webhook))
        .route("/health", get(|| async { "OK" }))
        .layer(GlobalConcurrencyLimitLayer::new(max_concurrent_turns.max(1)))
        .with_state(state)
}

/// POST /voice - 处理一轮来电
async fn voice_webhook(
    State(state): State<Arc<VoiceState>>,
    Form(form): Form<VoiceForm>,
) -> impl IntoResponse {
    let turn = InboundTurn {
        call_id: form.call_sid,
        transcript: form.speech_result.unwrap_or_default(),
        caller_address: form.from.filter(|f| !f.is_empty()),
    };
    tracing::debug!(call_id = %turn.call_id, transcript = %turn.transcript, "Voice webhook");

    let response = state.orchestrator.handle_turn(turn).await;
    let twiml = render_twiml(&response, &state.say);
    ([(header::CONTENT_TYPE, "application/xml")], twiml)
}

/// POST /status - 通话结束时释放状态
async fn status_webhook(
    State(state): State<Arc<VoiceState>>,
    Form(form): Form<StatusForm>,
) -> StatusCode {
    let status = form.call_status.as_deref().unwrap_or_default();
    if TERMINAL_STATUSES.contains(&status) {
        tracing::info!(call_id = %form.call_sid, status, "Call status callback");
        state.orchestrator.end_call(&form.call_sid).await;
    }
    StatusCode::NO_CONTENT
}

/// 把一轮结果渲染成 TwiML
pub fn render_twiml(response: &TurnResponse, say: &SayOptions) -> String {
    let language = say.language.as_str();
    let speech = match &response.audio {
        SpeechAudio::Hosted { url } => format!("<Play>{}</Play>", escape_xml(url)),
        SpeechAudio::BuiltinVoice => {
            let text = escape_xml(&response.text);
            let text = match &say.rate {
                Some(rate) => format!(r#"<prosody rate="{}">{}</prosody>"#, escape_xml(rate), text),
                None => text,
            };
            format!(
                r#"<Say voice="{}" language="{}">{}</Say>"#,
                escape_xml(&say.voice),
                escape_xml(language),
                text
            )
        }
    };

    let body = match response.action {
        CallAction::SpeakAndListen { timeout_secs } => format!(
            r#"<Gather input="speech" action="{path}" method="POST" timeout="{timeout}" speechTimeout="auto" language="{lang}">{speech}</Gather><Redirect method="POST">{path}</Redirect>"#,
            path = VOICE_PATH,
            timeout = timeout_secs,
            lang = escape_xml(language),
            speech = speech,
        ),
        CallAction::SpeakAndEnd => format!("{}<Hangup/>", speech),
        CallAction::Hangup => "<Hangup/>".to_string(),
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response>{}</Response>"#,
        body
    )
}

pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
