use chrono::{DateTime, Datelike, TimeDelta, Timelike};
use chrono_tz::Tz;

use crate::rate_limit::UsageRecord;

const DAY_NAMES: [&str; 7] = [
    "Montag",
    "Dienstag",
    "Mittwoch",
    "Donnerstag",
    "Freitag",
    "Samstag",
    "Sonntag",
];

const RIGHT_ABOVE: &str = "Dein Horoskop steht direkt über deiner Slot Machine 🎰!";
const JUST_NOW: &str =
    "Ich habe dir dein Horoskop vor nicht mal zehn Minuten gegeben. Wirst du alt?";
const ALREADY_TODAY: &str = "Du warst heute schon dran.";
const EARLIER_TODAY: &str = "Du hast dein Schicksal doch vorhin schon erfahren!";
const BLACKOUT: &str = "Hast du nen Filmriss? Dein Horoskop hast du gestern Nacht schon erfragt!";
const THIS_MORNING: &str = "Du hast dein Schicksal doch heute Morgen schon erfahren!";
const EVENING: &str = "Es wird auch abends nicht besser.";
const ALREADY_THIS_WEEK: &str = "Du warst diese Woche schon dran.";
const EARLIER_THIS_WEEK_TODAY: &str = "Du hast dein Schicksal für diese Woche vorhin schon erfahren!";
const YESTERDAY_THIS_WEEK: &str = "Du hast dein Schicksal für diese Woche gestern schon erfahren!";

/// Rolls closer together than this get the "you just got one" remark
fn recent_threshold() -> TimeDelta {
    TimeDelta::minutes(10)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CooldownResponse {
    pub text: String,
    /// Message to reply to; the triggering roll when absent
    pub reply_message_id: Option<i32>,
}

impl CooldownResponse {
    fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            reply_message_id: None,
        }
    }

    fn replying(text: impl Into<String>, reply_message_id: i32) -> Self {
        Self {
            text: text.into(),
            reply_message_id: Some(reply_message_id),
        }
    }
}

/// Phrases the refusal for a roll that conflicts with a prior usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownResponder {
    /// "You already went today"
    Day,
    /// "You already went this week"
    Week,
}

impl CooldownResponder {
    pub fn respond(
        &self,
        current_message_id: i32,
        current_time: &DateTime<Tz>,
        usage: &UsageRecord,
    ) -> CooldownResponse {
        match self {
            CooldownResponder::Day => respond_day(current_message_id, current_time, usage),
            CooldownResponder::Week => respond_week(current_time, usage),
        }
    }
}

struct PriorIds {
    message_id: Option<i32>,
    response_id: Option<i32>,
}

impl PriorIds {
    fn of(usage: &UsageRecord) -> Self {
        let parse = |id: &Option<String>| id.as_deref().and_then(|id| id.parse::<i32>().ok());
        Self {
            message_id: parse(&usage.reference_id),
            response_id: parse(&usage.response_id),
        }
    }

    /// The prior reply if there was one, otherwise the prior roll
    fn reply_target(&self) -> Option<i32> {
        self.response_id.or(self.message_id)
    }
}

fn respond_day(
    current_message_id: i32,
    current_time: &DateTime<Tz>,
    usage: &UsageRecord,
) -> CooldownResponse {
    let ids = PriorIds::of(usage);

    if ids.response_id == Some(current_message_id - 1) {
        return CooldownResponse::plain(RIGHT_ABOVE);
    }

    let elapsed = current_time.signed_duration_since(usage.time).abs();
    if elapsed < recent_threshold() {
        return CooldownResponse::plain(JUST_NOW);
    }

    let Some(reply_message_id) = ids.reply_target() else {
        return CooldownResponse::plain(ALREADY_TODAY);
    };

    let prior_hour = usage.time.hour();
    let text = if current_time.hour() > 7 && prior_hour < 3 {
        BLACKOUT
    } else if elapsed > TimeDelta::hours(4) && prior_hour < 11 {
        THIS_MORNING
    } else if prior_hour < 15 && current_time.hour() > 18 {
        EVENING
    } else {
        EARLIER_TODAY
    };

    CooldownResponse::replying(text, reply_message_id)
}

fn respond_week(current_time: &DateTime<Tz>, usage: &UsageRecord) -> CooldownResponse {
    let elapsed = current_time.signed_duration_since(usage.time).abs();
    if elapsed < recent_threshold() {
        return CooldownResponse::plain(JUST_NOW);
    }

    let Some(reply_message_id) = PriorIds::of(usage).reply_target() else {
        return CooldownResponse::plain(ALREADY_THIS_WEEK);
    };

    let prior_weekday = usage.time.weekday().num_days_from_monday();
    let current_weekday = current_time.weekday().num_days_from_monday();
    let text = match current_weekday as i64 - prior_weekday as i64 {
        0 => EARLIER_THIS_WEEK_TODAY.to_string(),
        1 => YESTERDAY_THIS_WEEK.to_string(),
        _ => format!(
            "Du hast dein Schicksal für diese Woche schon am {} erfahren!",
            DAY_NAMES[prior_weekday as usize]
        ),
    };

    CooldownResponse::replying(text, reply_message_id)
}
