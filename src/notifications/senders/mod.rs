use async_trait::async_trait;
use thiserror::Error;

use super::models::WebhookPayload;

pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("Failed to send notification: {0}")]
    SendFailed(String),
    #[error("Invalid configuration for sender: {0}")]
    InvalidConfiguration(String),
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

/// Delivers a formatted payload to a chat channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, payload: &WebhookPayload) -> Result<(), SenderError>;
}
