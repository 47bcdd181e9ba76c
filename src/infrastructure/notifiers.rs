//! Notification sinks.
//!
//! All sinks are fire-and-forget: delivery happens off the trade loop and
//! failures are logged, never propagated.

use crate::domain::repositories::notifier::Notifier;
use async_trait::async_trait;
use tracing::{info, warn};

/// Writes notifications to the log stream.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &str) {
        info!("notification: {}", message);
    }
}

/// Swallows everything.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send(&self, _message: &str) {}
}

/// POSTs notifications to a webhook, and mirrors them to the log.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: &str) -> Self {
        WebhookNotifier {
            client: reqwest::Client::new(),
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &str) {
        info!("notification: {}", message);

        let client = self.client.clone();
        let url = self.url.clone();
        let body = serde_json::json!({ "text": message });
        tokio::spawn(async move {
            if let Err(e) = client.post(&url).json(&body).send().await {
                warn!("Webhook delivery failed: {}", e);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_null_notifier_accepts_messages() {
        NullNotifier.send("ignored").await;
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_messages() {
        LogNotifier.send("bought 0.19 ETH/BTC at 0.0515").await;
    }
}
