use std::collections::HashSet;

use chrono::{DateTime, TimeZone};
use chrono_tz::Tz;

use crate::platform::InboundUpdate;

/// A slot-machine roll worth a decision
#[derive(Debug, Clone, PartialEq)]
pub struct DiceRollEvent {
    pub chat_id: i64,
    pub user_id: u64,
    pub message_id: i32,
    pub occurred_at: DateTime<Tz>,
    pub roll_value: u8,
    /// The outcome the platform comments on by itself
    pub is_neutral: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoMessage,
    ChatNotEnabled,
    NoDice,
    OtherEmoji,
    NoSender,
    InvalidDate,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Roll(DiceRollEvent),
    Ignored(IgnoreReason),
}

/// Reduces raw updates to slot-machine rolls in enabled chats
#[derive(Debug, Clone)]
pub struct EligibilityFilter {
    enabled_chats: HashSet<i64>,
    emoji: String,
    neutral_value: u8,
    timezone: Tz,
}

impl EligibilityFilter {
    pub fn new(
        enabled_chats: impl IntoIterator<Item = i64>,
        emoji: impl Into<String>,
        neutral_value: u8,
        timezone: Tz,
    ) -> Self {
        Self {
            enabled_chats: enabled_chats.into_iter().collect(),
            emoji: emoji.into(),
            neutral_value,
            timezone,
        }
    }

    pub fn classify(&self, update: &InboundUpdate) -> Classification {
        let Some(message) = &update.message else {
            return Classification::Ignored(IgnoreReason::NoMessage);
        };

        if !self.enabled_chats.contains(&message.chat_id) {
            return Classification::Ignored(IgnoreReason::ChatNotEnabled);
        }

        let Some(dice) = &message.dice else {
            return Classification::Ignored(IgnoreReason::NoDice);
        };

        if dice.emoji != self.emoji {
            return Classification::Ignored(IgnoreReason::OtherEmoji);
        }

        let Some(user_id) = message.from_id else {
            return Classification::Ignored(IgnoreReason::NoSender);
        };

        let Some(occurred_at) = self.timezone.timestamp_opt(message.date, 0).single() else {
            return Classification::Ignored(IgnoreReason::InvalidDate);
        };

        Classification::Roll(DiceRollEvent {
            chat_id: message.chat_id,
            user_id,
            message_id: message.message_id,
            occurred_at,
            roll_value: dice.value,
            is_neutral: dice.value == self.neutral_value,
        })
    }
}
