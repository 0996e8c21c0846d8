//! 预约事件投递实现：HTTP Webhook 与仅日志

use async_trait::async_trait;

use super::{BookingEvent, BookingSink};
use crate::core::CallError;

/// JSON POST 到预约 Webhook（如 n8n）
pub struct WebhookBookingSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookBookingSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl BookingSink for WebhookBookingSink {
    async fn deliver(&self, event: &BookingEvent) -> Result<(), CallError> {
        let resp = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| CallError::DeliveryFailure(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(CallError::DeliveryFailure(format!(
                "webhook returned {}: {}",
                status, body
            )));
        }
        Ok(())
    }
}

/// 未配置 Webhook 时使用：事件只写日志
pub struct LogOnlyBookingSink;

#[async_trait]
impl BookingSink for LogOnlyBookingSink {
    async fn deliver(&self, event: &BookingEvent) -> Result<(), CallError> {
        let payload = serde_json::to_string(event).unwrap_or_default();
        tracing::info!(call_id = %event.call_id, payload = %payload, "Booking event (log only)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CallState;
    use crate::dialogue::SlotName;

    fn event() -> BookingEvent {
        let mut state = CallState::new("CA-webhook");
        state.slots.set(SlotName::FirstName, "Jane");
        state.slots.set(SlotName::LastName, "Doe");
        state.slots.set(SlotName::Email, "jane@example.com");
        state.slots.set(SlotName::Phone, "5559876543");
        BookingEvent::from_state(&state, "Thanks").unwrap()
    }

    #[tokio::test]
    async fn test_log_only_sink_accepts() {
        assert!(LogOnlyBookingSink.deliver(&event()).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_delivery_failure() {
        // 端口 9（discard）通常无人监听，连接被拒
        let sink = WebhookBookingSink::new("http://127.0.0.1:9/webhook");
        let err = sink.deliver(&event()).await.unwrap_err();
        assert!(matches!(err, CallError::DeliveryFailure(_)));
    }

    #[cfg(feature = "twilio")]
    #[tokio::test]
    async fn test_webhook_posts_json() {
        use axum::{routing::post, Json, Router};
        use std::sync::{Arc, Mutex};

        let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
        let sink_received = received.clone();
        let app = Router::new().route(
            "/booking",
            post(move |Json(body): Json<serde_json::Value>| {
                let received = sink_received.clone();
                async move {
                    received.lock().unwrap().push(body);
                    "ok"
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let sink = WebhookBookingSink::new(format!("http://{}/booking", addr));
        sink.deliver(&event()).await.unwrap();

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0]["type"], "appointment_booking");
        assert_eq!(received[0]["first_name"], "Jane");
    }
}
