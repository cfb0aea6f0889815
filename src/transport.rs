use std::time::Duration;

use async_trait::async_trait;

use crate::models::Notification;

/// A failed delivery attempt. The message becomes the row's `last_error`.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Delivers one notification to the outside world (email, push, webhook...).
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;
    async fn send(&self, notification: &Notification) -> Result<(), TransportError>;
}

/// Stand-in transport: logs the delivery and succeeds.
pub struct LogTransport {
    latency: Duration,
}

impl LogTransport {
    pub fn new(latency: Duration) -> Self {
        Self { latency }
    }
}

impl Default for LogTransport {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[async_trait]
impl Transport for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notification: &Notification) -> Result<(), TransportError> {
        tracing::info!(
            id = notification.id,
            event_type = %notification.event_type,
            workspace_id = %notification.workspace_id,
            retry_count = notification.retry_count,
            "Sending notification"
        );
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(())
    }
}
