use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::events::{EventSink, OutboundEvent, PublishError};

/// Upper bound for a single publish
const PUBLISH_TIMEOUT: Duration = Duration::from_secs(5);

/// POSTs each event as JSON to a fixed URL
pub struct WebhookEventSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookEventSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl EventSink for WebhookEventSink {
    async fn publish(&self, event: &OutboundEvent) -> Result<(), PublishError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(PUBLISH_TIMEOUT)
            .json(event)
            .send()
            .await
            .map_err(|e| PublishError::Delivery(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PublishError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("Published event for message {}", event.message_id);
        Ok(())
    }
}
