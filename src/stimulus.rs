//! Stimulus injection
//!
//! Sends the single synthetic event into the forwarder's ingress endpoint.

use crate::error::Result;
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

/// Injects one JSON event into the process-under-test
pub struct StimulusInjector {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl Default for StimulusInjector {
    fn default() -> Self {
        Self::new()
    }
}

impl StimulusInjector {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// POST the payload as JSON and return the HTTP status.
    ///
    /// `.json()` handles serialization and the `Content-Type` header. The
    /// caller treats anything but 200 as a setup failure: the forwarder
    /// rejected the stimulus instead of forwarding it.
    pub async fn send(&self, ingress_url: &str, payload: &Value) -> Result<StatusCode> {
        let response = self
            .client
            .post(ingress_url)
            .json(payload)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        info!(url = ingress_url, status = %status, "Stimulus sent");
        Ok(status)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::collector::{CaptureOutcome, MockCollector};
    use serde_json::json;

    #[tokio::test]
    async fn test_stimulus_is_a_json_post() {
        let mut collector = MockCollector::start("127.0.0.1", 0).await.unwrap();
        let url = format!("http://{}", collector.local_addr());

        let payload = json!({"event": "test", "number": 42});
        let status = StimulusInjector::new().send(&url, &payload).await.unwrap();
        assert_eq!(status, StatusCode::OK);

        let outcome = collector.wait_for_capture(Duration::from_secs(2)).await;
        assert!(matches!(outcome, CaptureOutcome::Received));

        let captured = collector.log().first().unwrap();
        assert_eq!(
            captured.headers.get("content-type").unwrap(),
            "application/json"
        );
        let body: Value = serde_json::from_slice(&captured.body).unwrap();
        assert_eq!(body, payload);

        collector.stop().await;
    }

    #[tokio::test]
    async fn test_unreachable_ingress_is_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let url = format!("http://127.0.0.1:{port}");
        let result = StimulusInjector::new().send(&url, &json!({})).await;
        assert!(result.is_err());
    }
}
