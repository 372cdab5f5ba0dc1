//! Failure notifications
//!
//! When a webhook URL is configured, a failed run posts a short message to
//! it (`{"text": "..."}`, the shape chat webhooks accept). A notification
//! that cannot be delivered is logged and otherwise ignored.

use quotaroll_core::error::{QuotarollError, Result};
use serde_json::json;
use tracing::{debug, warn};

/// Posts messages to a chat webhook
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Post `message` to the webhook
    pub async fn notify(&self, message: &str) -> Result<()> {
        self.client
            .post(&self.url)
            .json(&json!({ "text": message }))
            .send()
            .await?
            .error_for_status()?;
        debug!("Notification delivered");
        Ok(())
    }

    /// Report a failed command; delivery problems are only logged
    pub async fn notify_failure(&self, command: &str, error: &QuotarollError) {
        let message = format!(
            "quotaroll {command} failed (exit {}): {error}",
            error.exit_code()
        );
        if let Err(e) = self.notify(&message).await {
            warn!("Failed to deliver failure notification: {}", e);
        }
    }
}
