//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `RECEPTIONIST__*` 覆盖（双下划线表示嵌套，如 `RECEPTIONIST__CALL__MAX_ACTIVE_CALLS=200`）。
//! 兼容旧部署的环境变量：`N8N_WEBHOOK`（预约 Webhook）、`PORT`（监听端口）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub call: CallSection,
    pub booking: BookingSection,
    pub speech: SpeechSection,
}

/// [app] 段：事务所名称、监听地址、生成时携带的历史轮数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// 开场白与结束语中使用的事务所名称
    pub firm_name: String,
    pub bind_addr: String,
    /// 送入生成服务的最近对话轮数（完整历史仍保存在通话状态中）
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "receptionist".to_string(),
            firm_name: "Ahad and Co CPA Firm".to_string(),
            bind_addr: "0.0.0.0:3000".to_string(),
            max_context_turns: 12,
        }
    }
}

/// [llm] 段：生成服务后端与输出长度上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / mock；openai 需 OPENAI_API_KEY
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 单次回复的 token 上限（电话里的话要短）
    pub max_reply_tokens: u32,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            max_reply_tokens: 120,
        }
    }
}

/// [call] 段：单通电话的超时、容量与语音参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CallSection {
    /// 生成服务的单轮截止时间（毫秒）
    pub generation_timeout_ms: u64,
    /// 同时在内存中的通话上限，超出时拒接新来电
    pub max_active_calls: usize,
    /// 通话状态存活时间（秒），超时由后台清理
    pub call_ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// 等待来电者说话的秒数
    pub gather_timeout_secs: u64,
    pub max_reply_chars: usize,
    /// 同时处理的 Webhook 请求上限
    pub max_concurrent_turns: usize,
    pub voice: String,
    pub language: String,
    /// 内置音色的语速（SSML prosody rate），报邮箱和电话时放慢
    pub speech_rate: Option<String>,
    /// 连续沉默几次后结束通话
    pub max_silent_reprompts: u32,
}

impl Default for CallSection {
    fn default() -> Self {
        Self {
            generation_timeout_ms: 2500,
            max_active_calls: 1000,
            call_ttl_secs: 3600,
            sweep_interval_secs: 60,
            gather_timeout_secs: 5,
            max_reply_chars: 320,
            max_concurrent_turns: 256,
            voice: "Polly.Joanna-Neural".to_string(),
            language: "en-US".to_string(),
            speech_rate: Some("slow".to_string()),
            max_silent_reprompts: 2,
        }
    }
}

/// [booking] 段：预约事件投递目标
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BookingSection {
    /// 未配置时仅记录日志，不投递
    pub webhook_url: Option<String>,
    pub timeout_ms: u64,
    /// 预约事件的 selected_slot；不设置时发 null
    pub selected_slot: Option<String>,
}

impl Default for BookingSection {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: 3000,
            selected_slot: None,
        }
    }
}

/// [speech] 段：语音合成。builtin 直接使用电话平台自带音色
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechSection {
    /// builtin / http
    pub provider: String,
    /// http 合成端点：POST {"text", "voice"}，返回 {"url"}
    pub endpoint: Option<String>,
    pub voice: Option<String>,
    pub timeout_ms: u64,
}

impl Default for SpeechSection {
    fn default() -> Self {
        Self {
            provider: "builtin".to_string(),
            endpoint: None,
            voice: None,
            timeout_ms: 2000,
        }
    }
}

impl AppConfig {
    /// 旧部署只设置了 N8N_WEBHOOK / PORT，这里补齐到配置里
    fn apply_legacy_env(mut self) -> Self {
        if self.booking.webhook_url.is_none() {
            self.booking.webhook_url = std::env::var("N8N_WEBHOOK").ok().filter(|u| !u.is_empty());
        }
        if let Ok(port) = std::env::var("PORT") {
            if port.parse::<u16>().is_ok() {
                let host = self
                    .app
                    .bind_addr
                    .rsplit_once(':')
                    .map(|(h, _)| h.to_string())
                    .unwrap_or_else(|| "0.0.0.0".to_string());
                self.app.bind_addr = format!("{}:{}", host, port);
            }
        }
        self
    }
}

/// 从 config 目录加载配置，环境变量 RECEPTIONIST__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 RECEPTIONIST__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RECEPTIONIST")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    let cfg: AppConfig = c.try_deserialize()?;
    Ok(cfg.apply_legacy_env())
}
