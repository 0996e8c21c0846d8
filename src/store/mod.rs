//! 通话状态存储抽象层
//!
//! 定义统一的通话状态接口；进程内只有内存实现。每个通话一把异步锁，
//! 编排器在整轮处理期间持有它，同一通话的“创建后修改”不会丢更新。

pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::{CallError, CallState};

pub use memory::MemoryCallStore;

/// 单个通话的句柄（按 call_id 隔离）
pub type CallHandle = Arc<Mutex<CallState>>;

/// 通话状态存储接口
#[async_trait]
pub trait CallStore: Send + Sync {
    /// 获取或创建通话（幂等）；容量用尽时返回 ResourceExhausted
    async fn get_or_create(&self, call_id: &str) -> Result<CallHandle, CallError>;

    /// 获取已存在的通话
    async fn get(&self, call_id: &str) -> Option<CallHandle>;

    /// 整体替换通话状态（不存在则插入）
    async fn save(&self, state: CallState) -> Result<(), CallError>;

    /// 移除通话，返回是否存在
    async fn evict(&self, call_id: &str) -> bool;

    /// 清理超过存活时间的通话
    async fn evict_expired(&self) -> usize;

    /// 当前内存中的通话数
    async fn active_count(&self) -> usize;
}

/// 创建通话存储（目前只有内存实现）
pub fn create_call_store(max_active_calls: usize, call_ttl_secs: u64) -> Arc<dyn CallStore> {
    tracing::info!(
        max_active_calls,
        call_ttl_secs,
        "Using in-memory call store"
    );
    Arc::new(MemoryCallStore::new(
        max_active_calls,
        Duration::from_secs(call_ttl_secs),
    ))
}

/// 后台定时清理过期通话，直到 shutdown 被取消
pub fn spawn_eviction_sweeper(
    store: Arc<dyn CallStore>,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!("Eviction sweeper stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let evicted = store.evict_expired().await;
                    if evicted > 0 {
                        tracing::info!(evicted, "Evicted expired calls");
                    }
                }
            }
        }
    })
}
