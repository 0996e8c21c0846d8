//! HTTP 语音合成：POST {"text", "voice"}，期望返回 {"url": "..."}

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{SpeechAudio, SpeechRenderer};
use crate::core::CallError;

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
}

#[derive(Deserialize)]
struct SynthesisResponse {
    url: String,
}

pub struct HttpSpeechRenderer {
    client: reqwest::Client,
    endpoint: String,
    voice: Option<String>,
    timeout: Duration,
}

impl HttpSpeechRenderer {
    pub fn new(endpoint: impl Into<String>, voice: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            voice,
            timeout,
        }
    }

    async fn synthesize(&self, text: &str) -> Result<String, CallError> {
        let request = SynthesisRequest {
            text,
            voice: self.voice.as_deref(),
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| CallError::RenderingFailure(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(CallError::RenderingFailure(format!(
                "synthesis endpoint returned {}",
                resp.status()
            )));
        }

        let body: SynthesisResponse = resp
            .json()
            .await
            .map_err(|e| CallError::RenderingFailure(e.to_string()))?;
        if body.url.trim().is_empty() {
            return Err(CallError::RenderingFailure("empty audio url".to_string()));
        }
        Ok(body.url)
    }
}

#[async_trait]
impl SpeechRenderer for HttpSpeechRenderer {
    async fn render(&self, text: &str) -> Result<SpeechAudio, CallError> {
        match tokio::time::timeout(self.timeout, self.synthesize(text)).await {
            Ok(url) => url.map(|url| SpeechAudio::Hosted { url }),
            Err(_) => Err(CallError::RenderingFailure(format!(
                "timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_endpoint_is_rendering_failure() {
        let renderer =
            HttpSpeechRenderer::new("http://127.0.0.1:9/tts", None, Duration::from_millis(500));
        let err = renderer.render("Hello").await.unwrap_err();
        assert!(matches!(err, CallError::RenderingFailure(_)));
    }

    #[cfg(feature = "twilio")]
    #[tokio::test]
    async fn test_hosted_audio_url() {
        use axum::{routing::post, Json, Router};

        let app = Router::new().route(
            "/tts",
            post(|Json(body): Json<serde_json::Value>| async move {
                assert_eq!(body["text"], "Hello there");
                Json(serde_json::json!({ "url": "https://cdn.example.com/a.mp3" }))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let renderer = HttpSpeechRenderer::new(
            format!("http://{}/tts", addr),
            Some("alloy".to_string()),
            Duration::from_secs(2),
        );
        assert_eq!(
            renderer.render("Hello there").await.unwrap(),
            SpeechAudio::Hosted {
                url: "https://cdn.example.com/a.mp3".to_string()
            }
        );
    }
}
