//! Receptionist 电话 Webhook 服务
//!
//! 入口：初始化日志、加载配置、创建编排器与过期清理任务，启动 Twilio 语音 Webhook。
//!
//! 环境变量:
//! - OPENAI_API_KEY: 生成服务 API Key（未设置时使用 Mock，只说预置话术）
//! - N8N_WEBHOOK: 预约事件 Webhook（也可用 RECEPTIONIST__BOOKING__WEBHOOK_URL）
//! - PORT: 监听端口（覆盖 app.bind_addr 的端口）
//!
//! 启动: cargo run（Twilio 语音 URL 指向 http://YOUR_HOST:PORT/voice，状态回调指向 /status）

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use receptionist::config::load_config;
use receptionist::core::{create_orchestrator, ShutdownManager};
use receptionist::integrations::twilio::{create_router, VoiceState};
use receptionist::observability;
use receptionist::store::spawn_eviction_sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let orchestrator = Arc::new(create_orchestrator(&cfg));

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let sweeper = spawn_eviction_sweeper(
        orchestrator.store().clone(),
        Duration::from_secs(cfg.call.sweep_interval_secs.max(1)),
        shutdown.token(),
    );

    let state = Arc::new(VoiceState::new(orchestrator, &cfg.call));
    let app = create_router(state, cfg.call.max_concurrent_turns);

    let listener = tokio::net::TcpListener::bind(&cfg.app.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.app.bind_addr))?;
    tracing::info!(
        "{} ({}) listening on http://{}",
        cfg.app.name,
        cfg.app.firm_name,
        cfg.app.bind_addr
    );
    tracing::info!("Voice webhook: http://YOUR_HOST{}", receptionist::integrations::twilio::VOICE_PATH);

    let token = shutdown.token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await
        .context("Server error")?;

    shutdown.shutdown(receptionist::core::ShutdownReason::UserInitiated);
    let _ = sweeper.await;
    tracing::info!("Receptionist stopped");
    Ok(())
}
