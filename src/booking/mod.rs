//! 预约派发：必填信息齐全时构造预约事件，并且每通电话只投递一次
//!
//! 投递目标由 BookingSink 抽象：配置了 Webhook URL 时走 HTTP JSON POST，否则只写日志。

pub mod dispatcher;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::BookingSection;
use crate::core::{CallError, CallState};
use crate::dialogue::SlotName;

pub use dispatcher::{BookingDispatcher, DispatchOutcome};
pub use webhook::{LogOnlyBookingSink, WebhookBookingSink};

pub const EVENT_TYPE: &str = "appointment_booking";
const DEFAULT_CALL_REASON: &str = "Tax consultation";
const DEFAULT_REFERRAL_SOURCE: &str = "Unknown";
const DEFAULT_PREVIOUS_CLIENT: &str = "No";

/// 发往预约 Webhook 的事件（JSON 字段名即下游约定）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub event_id: String,
    pub call_id: String,
    pub first_name: String,
    pub last_name: String,
    /// 来电者报的号码；没有时用来电号码
    pub phone: String,
    pub email_address: String,
    /// 预约时段；来自配置，未配置时为 null，由团队邮件确认
    pub selected_slot: Option<String>,
    pub call_reason: String,
    pub referral_source: String,
    pub previous_client: String,
    pub caller_address: Option<String>,
    /// 派发当轮前台说的话
    pub summary: String,
    /// RFC 3339
    pub timestamp: String,
    pub booking_status: String,
}

impl BookingEvent {
    /// 必填槽位不全时返回 None
    pub fn from_state(state: &CallState, summary: &str) -> Option<Self> {
        if !state.slots.required_complete() {
            return None;
        }
        let slot = |name: SlotName| state.slots.get(name).map(str::to_string);
        let or_default =
            |name: SlotName, default: &str| slot(name).unwrap_or_else(|| default.to_string());

        Some(Self {
            event_type: EVENT_TYPE.to_string(),
            event_id: uuid::Uuid::new_v4().to_string(),
            call_id: state.call_id.clone(),
            first_name: slot(SlotName::FirstName)?,
            last_name: slot(SlotName::LastName)?,
            phone: slot(SlotName::Phone).or_else(|| state.caller_address.clone())?,
            email_address: slot(SlotName::Email)?,
            selected_slot: None,
            call_reason: or_default(SlotName::CallReason, DEFAULT_CALL_REASON),
            referral_source: or_default(SlotName::ReferralSource, DEFAULT_REFERRAL_SOURCE),
            previous_client: or_default(SlotName::PreviousClient, DEFAULT_PREVIOUS_CLIENT),
            caller_address: state.caller_address.clone(),
            summary: summary.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            booking_status: "confirmed".to_string(),
        })
    }
}

/// 预约事件投递目标
#[async_trait]
pub trait BookingSink: Send + Sync {
    async fn deliver(&self, event: &BookingEvent) -> Result<(), CallError>;
}

/// 根据配置创建投递目标：有 webhook_url 用 HTTP，否则只记日志
pub fn create_booking_sink_from_config(cfg: &BookingSection) -> Arc<dyn BookingSink> {
    match cfg.webhook_url.as_deref().filter(|u| !u.trim().is_empty()) {
        Some(url) => {
            tracing::info!(url = %url, "Booking events will be posted to webhook");
            Arc::new(WebhookBookingSink::new(url))
        }
        None => {
            tracing::warn!("No booking webhook configured, booking events will only be logged");
            Arc::new(LogOnlyBookingSink)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_state() -> CallState {
        let mut state = CallState::new("CA-book");
        state.slots.set(SlotName::FirstName, "John");
        state.slots.set(SlotName::LastName, "Smith");
        state.slots.set(SlotName::Email, "john@example.com");
        state.slots.set(SlotName::Phone, "5551234567");
        state
    }

    #[test]
    fn test_event_requires_all_required_slots() {
        let mut state = CallState::new("CA-book");
        state.slots.set(SlotName::FirstName, "John");
        assert!(BookingEvent::from_state(&state, "").is_none());
        state = complete_state();
        assert!(BookingEvent::from_state(&state, "").is_some());
    }

    #[test]
    fn test_event_defaults_for_optional_slots() {
        let event = BookingEvent::from_state(&complete_state(), "Thanks").unwrap();
        assert_eq!(event.event_type, "appointment_booking");
        assert_eq!(event.call_reason, "Tax consultation");
        assert_eq!(event.referral_source, "Unknown");
        assert_eq!(event.previous_client, "No");
        assert_eq!(event.booking_status, "confirmed");
        assert!(chrono::DateTime::parse_from_rfc3339(&event.timestamp).is_ok());
    }

    #[test]
    fn test_event_json_field_names() {
        let mut state = complete_state();
        state.caller_address = Some("+15550001111".to_string());
        let event = BookingEvent::from_state(&state, "Thanks").unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "appointment_booking");
        assert_eq!(json["email_address"], "john@example.com");
        assert_eq!(json["caller_address"], "+15550001111");
        assert!(json["selected_slot"].is_null());
    }

    #[test]
    fn test_sink_from_config() {
        // 只验证不会 panic；两种分支都能构造
        let _ = create_booking_sink_from_config(&BookingSection::default());
        let _ = create_booking_sink_from_config(&BookingSection {
            webhook_url: Some("http://localhost:5678/webhook/booking".to_string()),
            timeout_ms: 1000,
            ..Default::default()
        });
    }
}
