use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::content::ContentProvider;
use crate::cooldown::CooldownResponder;
use crate::events::{EventSink, OutboundEvent};
use crate::filter::{Classification, DiceRollEvent, EligibilityFilter};
use crate::platform::{InboundUpdate, Transport};
use crate::poller::UpdateHandler;
use crate::rate_limit::{RateLimiter, UsageRecord};

/// Decides and delivers the reply for each slot-machine roll
pub struct DiceBot {
    transport: Arc<dyn Transport>,
    filter: EligibilityFilter,
    rate_limiter: Arc<dyn RateLimiter>,
    content: Arc<dyn ContentProvider>,
    events: Arc<dyn EventSink>,
    responder: CooldownResponder,
}

impl DiceBot {
    pub fn new(
        transport: Arc<dyn Transport>,
        filter: EligibilityFilter,
        rate_limiter: Arc<dyn RateLimiter>,
        content: Arc<dyn ContentProvider>,
        events: Arc<dyn EventSink>,
        responder: CooldownResponder,
    ) -> Self {
        Self {
            transport,
            filter,
            rate_limiter,
            content,
            events,
            responder,
        }
    }

    async fn handle_roll(&self, roll: DiceRollEvent) -> Result<()> {
        let conflict = self
            .rate_limiter
            .get_conflict(roll.chat_id, roll.user_id, &roll.occurred_at)
            .await
            .context("Failed to check rate limit")?;

        if let Some(usage) = conflict {
            if roll.is_neutral {
                // The platform posts its own notice for this outcome
                return Ok(());
            }
            return self.refuse(&roll, &usage).await;
        }

        let content = if roll.is_neutral {
            None
        } else {
            self.content.provide(&roll).await?
        };

        let mut response = None;
        match content {
            None => debug!("No horoscope for roll value {}", roll.roll_value),
            Some(content) => {
                let reply_id = match &content.image {
                    Some(image) => {
                        self.transport
                            .send_image(
                                roll.chat_id,
                                &content.formatted_message,
                                image,
                                Some(roll.message_id),
                                content.use_html,
                            )
                            .await?
                    }
                    None => {
                        self.transport
                            .send_text(
                                roll.chat_id,
                                &content.formatted_message,
                                Some(roll.message_id),
                                content.use_html,
                            )
                            .await?
                    }
                };
                response = Some((reply_id, content.message));
            }
        }

        self.rate_limiter
            .record_usage(UsageRecord {
                context_id: roll.chat_id,
                user_id: roll.user_id,
                time: roll.occurred_at,
                reference_id: Some(roll.message_id.to_string()),
                response_id: response.as_ref().map(|(id, _)| id.to_string()),
            })
            .await
            .context("Failed to record usage")?;

        if let Some((reply_id, message)) = response {
            self.publish(OutboundEvent {
                chat_id: roll.chat_id,
                user_id: roll.user_id,
                message_id: reply_id,
                content: message,
            })
            .await;
        }

        Ok(())
    }

    async fn refuse(&self, roll: &DiceRollEvent, usage: &UsageRecord) -> Result<()> {
        let response = self
            .responder
            .respond(roll.message_id, &roll.occurred_at, usage);
        let reply_to = response.reply_message_id.unwrap_or(roll.message_id);

        info!(
            "User {} already rolled in chat {}, replying to {}",
            roll.user_id, roll.chat_id, reply_to
        );
        self.transport
            .send_text(roll.chat_id, &response.text, Some(reply_to), false)
            .await?;
        Ok(())
    }

    async fn publish(&self, event: OutboundEvent) {
        if let Err(e) = self.events.publish(&event).await {
            error!("Could not publish event: {}", e);
        }
    }
}

#[async_trait]
impl UpdateHandler for DiceBot {
    async fn handle(&self, update: &InboundUpdate) -> Result<()> {
        match self.filter.classify(update) {
            Classification::Roll(roll) => self.handle_roll(roll).await,
            Classification::Ignored(reason) => {
                debug!("Skipping update {}: {:?}", update.id, reason);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentResult;
    use crate::testing::{
        slot_update, FakeContent, FakeRateLimiter, FakeSink, FakeTransport, Sent, CHAT,
    };
    use chrono::TimeZone;
    use chrono_tz::Europe::Berlin;

    struct Harness {
        transport: Arc<FakeTransport>,
        limiter: Arc<FakeRateLimiter>,
        content: Arc<FakeContent>,
        sink: Arc<FakeSink>,
        bot: DiceBot,
    }

    fn harness(
        transport: FakeTransport,
        limiter: FakeRateLimiter,
        content: FakeContent,
        sink: FakeSink,
    ) -> Harness {
        let transport = Arc::new(transport);
        let limiter = Arc::new(limiter);
        let content = Arc::new(content);
        let sink = Arc::new(sink);
        let bot = DiceBot::new(
            transport.clone(),
            EligibilityFilter::new([CHAT], "🎰", 43, Berlin),
            limiter.clone(),
            content.clone(),
            sink.clone(),
            CooldownResponder::Day,
        );
        Harness {
            transport,
            limiter,
            content,
            sink,
            bot,
        }
    }

    fn horoscope(image: Option<Vec<u8>>) -> ContentResult {
        ContentResult {
            message: "Heute nicht.".to_string(),
            formatted_message: "<i>Heute nicht.</i>".to_string(),
            image,
            use_html: true,
        }
    }

    /// Earlier the same day (roll time is 12:00 Berlin)
    fn morning_usage() -> UsageRecord {
        UsageRecord {
            context_id: CHAT,
            user_id: 7,
            time: Berlin.with_ymd_and_hms(2024, 1, 15, 7, 30, 0).unwrap(),
            reference_id: Some("30".to_string()),
            response_id: Some("31".to_string()),
        }
    }

    #[tokio::test]
    async fn test_neutral_roll_with_conflict_does_nothing() {
        let h = harness(
            FakeTransport::new(),
            FakeRateLimiter::conflicting(morning_usage()),
            FakeContent::returning(horoscope(None)),
            FakeSink::default(),
        );

        h.bot.handle(&slot_update(1, 50, 43)).await.unwrap();

        assert!(h.transport.sent().is_empty());
        assert!(h.limiter.recorded().is_empty());
        assert!(h.content.requests().is_empty());
    }

    #[tokio::test]
    async fn test_conflict_sends_refusal_without_recording() {
        let h = harness(
            FakeTransport::new(),
            FakeRateLimiter::conflicting(morning_usage()),
            FakeContent::returning(horoscope(None)),
            FakeSink::default(),
        );

        h.bot.handle(&slot_update(1, 50, 2)).await.unwrap();

        assert_eq!(
            h.transport.sent(),
            vec![Sent::Text {
                chat_id: CHAT,
                text: "Du hast dein Schicksal doch heute Morgen schon erfahren!".to_string(),
                reply_to: Some(31),
                html: false,
            }]
        );
        assert!(h.limiter.recorded().is_empty());
        assert!(h.content.requests().is_empty());
        assert!(h.sink.published().is_empty());
    }

    #[tokio::test]
    async fn test_refusal_without_target_replies_to_roll() {
        let mut usage = morning_usage();
        usage.time = Berlin.with_ymd_and_hms(2024, 1, 15, 11, 55, 0).unwrap();
        let h = harness(
            FakeTransport::new(),
            FakeRateLimiter::conflicting(usage),
            FakeContent::default(),
            FakeSink::default(),
        );

        h.bot.handle(&slot_update(1, 50, 2)).await.unwrap();

        let sent = h.transport.sent();
        assert!(matches!(&sent[0], Sent::Text { reply_to: Some(50), .. }));
    }

    #[tokio::test]
    async fn test_image_content_is_sent_recorded_and_published() {
        let h = harness(
            FakeTransport::new(),
            FakeRateLimiter::default(),
            FakeContent::returning(horoscope(Some(vec![0x89, 0x50, 0x4e, 0x47]))),
            FakeSink::default(),
        );

        h.bot.handle(&slot_update(1, 50, 2)).await.unwrap();

        assert_eq!(
            h.transport.sent(),
            vec![Sent::Image {
                chat_id: CHAT,
                caption: "<i>Heute nicht.</i>".to_string(),
                image: vec![0x89, 0x50, 0x4e, 0x47],
                reply_to: Some(50),
                html: true,
            }]
        );

        let recorded = h.limiter.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].context_id, CHAT);
        assert_eq!(recorded[0].user_id, 7);
        assert_eq!(recorded[0].reference_id.as_deref(), Some("50"));
        assert_eq!(recorded[0].response_id.as_deref(), Some("900"));

        assert_eq!(
            h.sink.published(),
            vec![OutboundEvent {
                chat_id: CHAT,
                user_id: 7,
                message_id: 900,
                content: "Heute nicht.".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_text_content_uses_send_text() {
        let h = harness(
            FakeTransport::new(),
            FakeRateLimiter::default(),
            FakeContent::returning(horoscope(None)),
            FakeSink::default(),
        );

        h.bot.handle(&slot_update(1, 50, 2)).await.unwrap();

        assert!(matches!(
            &h.transport.sent()[0],
            Sent::Text { html: true, reply_to: Some(50), .. }
        ));
    }

    #[tokio::test]
    async fn test_declined_content_still_records_usage() {
        let h = harness(
            FakeTransport::new(),
            FakeRateLimiter::default(),
            FakeContent::default(),
            FakeSink::default(),
        );

        h.bot.handle(&slot_update(1, 50, 2)).await.unwrap();

        assert!(h.transport.sent().is_empty());
        assert!(h.sink.published().is_empty());
        let recorded = h.limiter.recorded();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].response_id, None);
    }

    #[tokio::test]
    async fn test_neutral_roll_without_conflict_is_recorded_silently() {
        let h = harness(
            FakeTransport::new(),
            FakeRateLimiter::default(),
            FakeContent::returning(horoscope(None)),
            FakeSink::default(),
        );

        h.bot.handle(&slot_update(1, 50, 43)).await.unwrap();

        assert!(h.content.requests().is_empty());
        assert!(h.transport.sent().is_empty());
        assert_eq!(h.limiter.recorded().len(), 1);
    }

    #[tokio::test]
    async fn test_publish_failure_is_swallowed() {
        let h = harness(
            FakeTransport::new(),
            FakeRateLimiter::default(),
            FakeContent::returning(horoscope(None)),
            FakeSink::failing(),
        );

        h.bot.handle(&slot_update(1, 50, 2)).await.unwrap();

        assert_eq!(h.limiter.recorded().len(), 1);
    }

    #[tokio::test]
    async fn test_record_failure_skips_publish() {
        let h = harness(
            FakeTransport::new(),
            FakeRateLimiter::failing_records(),
            FakeContent::returning(horoscope(None)),
            FakeSink::default(),
        );

        assert!(h.bot.handle(&slot_update(1, 50, 2)).await.is_err());
        assert_eq!(h.transport.sent().len(), 1);
        assert!(h.sink.published().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_failure_fails_handler_before_recording() {
        let h = harness(
            FakeTransport::failing_sends(),
            FakeRateLimiter::default(),
            FakeContent::returning(horoscope(None)),
            FakeSink::default(),
        );

        assert!(h.bot.handle(&slot_update(1, 50, 2)).await.is_err());
        assert!(h.limiter.recorded().is_empty());
        assert!(h.sink.published().is_empty());
    }

    #[tokio::test]
    async fn test_ignored_updates_touch_nothing() {
        let h = harness(
            FakeTransport::new(),
            FakeRateLimiter::conflicting(morning_usage()),
            FakeContent::returning(horoscope(None)),
            FakeSink::default(),
        );

        let mut foreign = slot_update(1, 50, 2);
        if let Some(message) = foreign.message.as_mut() {
            message.chat_id = 12345;
        }
        let mut darts = slot_update(2, 51, 2);
        if let Some(message) = darts.message.as_mut() {
            message.dice.as_mut().unwrap().emoji = "🎯".to_string();
        }
        let empty = InboundUpdate { id: 3, message: None };

        for update in [foreign, darts, empty] {
            h.bot.handle(&update).await.unwrap();
        }

        assert!(h.transport.sent().is_empty());
        assert!(h.limiter.recorded().is_empty());
    }
}
