//! In-process fakes of the bot's collaborators, shared by unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::DateTime;
use chrono_tz::Tz;

use crate::content::{ContentProvider, ContentResult};
use crate::events::{EventSink, OutboundEvent, PublishError};
use crate::filter::DiceRollEvent;
use crate::platform::{Dice, InboundMessage, InboundUpdate, Transport, TransportError};
use crate::rate_limit::{RateLimiter, UsageRecord};

pub const CHAT: i64 = -100200;

/// A slot roll from user 7 in [`CHAT`] at 2024-01-15 11:00 UTC
pub fn slot_update(update_id: u32, message_id: i32, value: u8) -> InboundUpdate {
    InboundUpdate {
        id: update_id,
        message: Some(InboundMessage {
            message_id,
            chat_id: CHAT,
            from_id: Some(7),
            date: 1_705_316_400,
            dice: Some(Dice {
                emoji: "🎰".to_string(),
                value,
            }),
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text {
        chat_id: i64,
        text: String,
        reply_to: Option<i32>,
        html: bool,
    },
    Image {
        chat_id: i64,
        caption: String,
        image: Vec<u8>,
        reply_to: Option<i32>,
        html: bool,
    },
}

#[derive(Default)]
pub struct FakeTransport {
    batches: Mutex<VecDeque<Result<Vec<InboundUpdate>, TransportError>>>,
    pub fetches: Mutex<Vec<(Option<u32>, tokio::time::Instant)>>,
    pub sent: Mutex<Vec<Sent>>,
    pub reply_id: i32,
    pub fail_sends: bool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            reply_id: 900,
            ..Self::default()
        }
    }

    pub fn failing_sends() -> Self {
        Self {
            fail_sends: true,
            ..Self::new()
        }
    }

    pub fn push_batch(&self, batch: Result<Vec<InboundUpdate>, TransportError>) {
        self.batches.lock().unwrap().push_back(batch);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    fn deliver(&self, sent: Sent) -> Result<i32, TransportError> {
        if self.fail_sends {
            return Err(TransportError::Api("Bad Request: chat not found".to_string()));
        }
        self.sent.lock().unwrap().push(sent);
        Ok(self.reply_id)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn fetch_updates(&self, after: Option<u32>) -> Result<Vec<InboundUpdate>, TransportError> {
        self.fetches
            .lock()
            .unwrap()
            .push((after, tokio::time::Instant::now()));
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
        html: bool,
    ) -> Result<i32, TransportError> {
        self.deliver(Sent::Text {
            chat_id,
            text: text.to_string(),
            reply_to,
            html,
        })
    }

    async fn send_image(
        &self,
        chat_id: i64,
        caption: &str,
        image: &[u8],
        reply_to: Option<i32>,
        html: bool,
    ) -> Result<i32, TransportError> {
        self.deliver(Sent::Image {
            chat_id,
            caption: caption.to_string(),
            image: image.to_vec(),
            reply_to,
            html,
        })
    }
}

#[derive(Default)]
pub struct FakeRateLimiter {
    pub conflict: Option<UsageRecord>,
    pub fail_records: bool,
    pub recorded: Mutex<Vec<UsageRecord>>,
}

impl FakeRateLimiter {
    pub fn conflicting(usage: UsageRecord) -> Self {
        Self {
            conflict: Some(usage),
            ..Self::default()
        }
    }

    pub fn failing_records() -> Self {
        Self {
            fail_records: true,
            ..Self::default()
        }
    }

    pub fn recorded(&self) -> Vec<UsageRecord> {
        self.recorded.lock().unwrap().clone()
    }
}

#[async_trait]
impl RateLimiter for FakeRateLimiter {
    async fn get_conflict(
        &self,
        _context_id: i64,
        _user_id: u64,
        _at_time: &DateTime<Tz>,
    ) -> Result<Option<UsageRecord>> {
        Ok(self.conflict.clone())
    }

    async fn record_usage(&self, usage: UsageRecord) -> Result<()> {
        if self.fail_records {
            anyhow::bail!("database is locked");
        }
        self.recorded.lock().unwrap().push(usage);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeContent {
    pub result: Option<ContentResult>,
    pub requests: Mutex<Vec<u8>>,
}

impl FakeContent {
    pub fn returning(result: ContentResult) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<u8> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentProvider for FakeContent {
    async fn provide(&self, roll: &DiceRollEvent) -> Result<Option<ContentResult>> {
        self.requests.lock().unwrap().push(roll.roll_value);
        Ok(self.result.clone())
    }
}

#[derive(Default)]
pub struct FakeSink {
    pub fail: bool,
    pub published: Mutex<Vec<OutboundEvent>>,
}

impl FakeSink {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<OutboundEvent> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSink for FakeSink {
    async fn publish(&self, event: &OutboundEvent) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Delivery("connection reset".to_string()));
        }
        self.published.lock().unwrap().push(event.clone());
        Ok(())
    }
}
