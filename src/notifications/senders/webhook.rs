use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::{debug, error};

use super::{Notifier, SenderError};
use crate::notifications::models::WebhookPayload;

/// A sender for pushing notifications to a chat webhook.
pub struct WebhookSender {
    client: Client,
    url: Url,
}

impl WebhookSender {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, SenderError> {
        let url = Url::parse(url)
            .map_err(|e| SenderError::InvalidConfiguration(format!("Invalid webhook URL: {e}")))?;
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }

    /// Asks the chat service to confirm the message was stored before replying.
    pub fn wait_for_delivery(mut self) -> Self {
        self.url.query_pairs_mut().append_pair("wait", "true");
        self
    }
}

#[async_trait]
impl Notifier for WebhookSender {
    async fn notify(&self, payload: &WebhookPayload) -> Result<(), SenderError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(payload)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(status = %status, "Webhook rejected notification.");
            return Err(SenderError::SendFailed(format!(
                "Webhook returned non-success status: {status}. Body: {error_body}"
            )));
        }

        debug!(status = %status, embeds = payload.embeds.len(), "Webhook notification delivered.");
        Ok(())
    }
}
