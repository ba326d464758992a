use anyhow::Result;
use reqwest::Client;
use serde_json::{json, Value};

/// Fire-and-forget webhook notifier. Delivery failures are logged and never
/// propagated; a dead webhook must not stall trading.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
}

impl WebhookNotifier {
    pub fn new(webhook_url: String) -> Result<Self> {
        Ok(Self {
            client: Client::new(),
            webhook_url,
        })
    }

    pub async fn send(&self, event_type: &str, message: &str, data: Value) {
        if self.webhook_url.is_empty() {
            tracing::debug!("webhook not configured, skipping notification");
            return;
        }

        let payload = json!({
            "event_type": event_type,
            "message": message,
            "data": data,
            "timestamp": chrono::Utc::now().to_rfc3339(),
            "monitor_source": "mt5-signal-agent",
        });

        match self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(event_type, "webhook notification sent");
            }
            Ok(response) => {
                tracing::warn!(
                    event_type,
                    status = %response.status(),
                    "webhook rejected notification"
                );
            }
            Err(e) => {
                tracing::warn!(event_type, "webhook delivery failed: {}", e);
            }
        }
    }
}
