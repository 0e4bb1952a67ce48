pub mod telegram;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// One unit of activity reported by the chat platform
#[derive(Debug, Clone, PartialEq)]
pub struct InboundUpdate {
    /// Monotonically increasing id, used as the poll cursor
    pub id: u32,
    pub message: Option<InboundMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub message_id: i32,
    pub chat_id: i64,
    /// Absent for channel posts
    pub from_id: Option<u64>,
    /// Unix timestamp in seconds
    pub date: i64,
    pub dice: Option<Dice>,
}

/// Animated dice payload of a message
#[derive(Debug, Clone, PartialEq)]
pub struct Dice {
    pub emoji: String,
    pub value: u8,
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Throttled by platform, retry after {}s", retry_after.as_secs())]
    Throttled { retry_after: Duration },

    #[error("Request timed out")]
    Timeout,

    #[error("Platform API error: {0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Moves bytes to and from the chat platform. Implementations never retry;
/// the caller owns the retry policy.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Long-poll for updates strictly after `after`. A poll that times out
    /// yields an empty batch.
    async fn fetch_updates(&self, after: Option<u32>) -> Result<Vec<InboundUpdate>, TransportError>;

    /// Returns the id of the sent message.
    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
        html: bool,
    ) -> Result<i32, TransportError>;

    /// Sends `image` with `caption`. Returns the id of the sent message.
    async fn send_image(
        &self,
        chat_id: i64,
        caption: &str,
        image: &[u8],
        reply_to: Option<i32>,
        html: bool,
    ) -> Result<i32, TransportError>;
}
