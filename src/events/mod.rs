pub mod webhook;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Published after a reply was delivered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundEvent {
    pub chat_id: i64,
    pub user_id: u64,
    /// Id of the reply message
    pub message_id: i32,
    pub content: String,
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to deliver event: {0}")]
    Delivery(String),

    #[error("Event sink rejected event ({status}): {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait EventSink: Send + Sync {
    async fn publish(&self, event: &OutboundEvent) -> Result<(), PublishError>;
}

/// Drops events after logging them
#[derive(Debug, Default)]
pub struct StubEventSink;

#[async_trait]
impl EventSink for StubEventSink {
    async fn publish(&self, event: &OutboundEvent) -> Result<(), PublishError> {
        debug!(
            "Not publishing event for message {} in chat {}",
            event.message_id, event.chat_id
        );
        Ok(())
    }
}
