//! 内存通话存储
//!
//! 外层 RwLock 只保护 call_id -> 句柄 的映射，单个通话的读写走各自的 Mutex，
//! 不同通话之间互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use super::{CallHandle, CallStore};
use crate::core::{CallError, CallState};

pub struct MemoryCallStore {
    calls: RwLock<HashMap<String, CallHandle>>,
    max_calls: usize,
    ttl: Duration,
}

impl MemoryCallStore {
    pub fn new(max_calls: usize, ttl: Duration) -> Self {
        Self {
            calls: RwLock::new(HashMap::new()),
            max_calls,
            ttl,
        }
    }
}

impl Default for MemoryCallStore {
    fn default() -> Self {
        Self::new(1000, Duration::from_secs(3600))
    }
}

#[async_trait]
impl CallStore for MemoryCallStore {
    async fn get_or_create(&self, call_id: &str) -> Result<CallHandle, CallError> {
        if let Some(handle) = self.calls.read().await.get(call_id) {
            return Ok(handle.clone());
        }

        // 写锁内再查一次：两个并发的首轮请求只会建出一份状态
        let mut calls = self.calls.write().await;
        if let Some(handle) = calls.get(call_id) {
            return Ok(handle.clone());
        }
        if calls.len() >= self.max_calls {
            return Err(CallError::ResourceExhausted {
                limit: self.max_calls,
            });
        }
        let handle = Arc::new(Mutex::new(CallState::new(call_id)));
        calls.insert(call_id.to_string(), handle.clone());
        tracing::debug!(call_id, active = calls.len(), "Call state created");
        Ok(handle)
    }

    async fn get(&self, call_id: &str) -> Option<CallHandle> {
        self.calls.read().await.get(call_id).cloned()
    }

    async fn save(&self, state: CallState) -> Result<(), CallError> {
        let existing = self.calls.read().await.get(&state.call_id).cloned();
        if let Some(handle) = existing {
            *handle.lock().await = state;
            return Ok(());
        }

        let mut calls = self.calls.write().await;
        if calls.len() >= self.max_calls && !calls.contains_key(&state.call_id) {
            return Err(CallError::ResourceExhausted {
                limit: self.max_calls,
            });
        }
        calls.insert(state.call_id.clone(), Arc::new(Mutex::new(state)));
        Ok(())
    }

    async fn evict(&self, call_id: &str) -> bool {
        self.calls.write().await.remove(call_id).is_some()
    }

    async fn evict_expired(&self) -> usize {
        let mut calls = self.calls.write().await;
        // 正在处理中的通话（锁被占用）本轮跳过
        let expired: Vec<String> = calls
            .iter()
            .filter(|(_, handle)| {
                handle
                    .try_lock()
                    .map(|state| state.is_expired(self.ttl))
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect();

        for call_id in &expired {
            calls.remove(call_id);
        }
        expired.len()
    }

    async fn active_count(&self) -> usize {
        self.calls.read().await.len()
    }
}
