//! 预约派发器：完整性检查 + 恰好一次派发
//!
//! 先把 booking_dispatched 置为 true 再投递；投递失败只记日志（带完整事件），不在通话内重试。

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use super::{BookingEvent, BookingSink};
use crate::core::{CallError, CallState};

/// 一次派发检查的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 必填信息不全
    Incomplete,
    /// 本通电话已派发过
    AlreadyDispatched,
    Delivered,
    Failed(CallError),
}

pub struct BookingDispatcher {
    sink: Arc<dyn BookingSink>,
    timeout: Duration,
    selected_slot: Option<String>,
}

impl BookingDispatcher {
    pub fn new(sink: Arc<dyn BookingSink>, timeout: Duration) -> Self {
        Self {
            sink,
            timeout,
            selected_slot: None,
        }
    }

    /// 事件里携带的预约时段
    pub fn with_selected_slot(mut self, slot: Option<String>) -> Self {
        self.selected_slot = slot.filter(|s| !s.trim().is_empty());
        self
    }

    /// 必填槽位齐全且尚未派发时投递预约事件；summary 为本轮前台话语
    pub async fn dispatch_if_complete(&self, state: &mut CallState, summary: &str) -> DispatchOutcome {
        if state.flags.booking_dispatched {
            return DispatchOutcome::AlreadyDispatched;
        }
        let Some(mut event) = BookingEvent::from_state(state, summary) else {
            return DispatchOutcome::Incomplete;
        };
        event.selected_slot = self.selected_slot.clone();
        if !state.mark_booking_dispatched() {
            return DispatchOutcome::AlreadyDispatched;
        }

        info!(call_id = %state.call_id, event_id = %event.event_id, "Dispatching booking");
        let result = match tokio::time::timeout(self.timeout, self.sink.deliver(&event)).await {
            Ok(result) => result,
            Err(_) => Err(CallError::DeliveryFailure(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))),
        };

        match result {
            Ok(()) => {
                info!(call_id = %state.call_id, event_id = %event.event_id, "Booking delivered");
                DispatchOutcome::Delivered
            }
            Err(e) => {
                let payload = serde_json::to_string(&event).unwrap_or_default();
                error!(
                    call_id = %state.call_id,
                    error = %e,
                    payload = %payload,
                    "Booking delivery failed, not retrying"
                );
                DispatchOutcome::Failed(e)
            }
        }
    }
}
