//! 优雅关闭
//!
//! 收到 Ctrl+C / SIGTERM 后取消统一的 CancellationToken：HTTP 服务停止接新请求，
//! 过期清理任务退出，进行中的一轮处理完再结束。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// 关闭信号管理器
#[derive(Clone)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
}

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self {
            shutdown_token: CancellationToken::new(),
        }
    }

    /// 获取关闭 token（用于停止后台任务与 HTTP 服务）
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// 取消 token；重复调用只记录第一次的原因
    pub fn shutdown(&self, reason: ShutdownReason) {
        if self.shutdown_token.is_cancelled() {
            return;
        }
        tracing::info!(?reason, "Shutting down");
        self.shutdown_token.cancel();
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}
