use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, DiceEmoji, InputFile, Message, MessageId, ParseMode, ReplyParameters, Update, UpdateKind,
};
use teloxide::RequestError;
use tracing::{debug, warn};

use crate::config::TelegramConfig;
use crate::platform::{Dice, InboundMessage, InboundUpdate, Transport, TransportError};

/// Extra time granted to the HTTP round trip on top of the long-poll wait
const POLL_GRACE: Duration = Duration::from_secs(5);

/// Telegram Bot API transport driven by manual `getUpdates` polling
pub struct TelegramTransport {
    bot: Bot,
    poll_timeout: Duration,
    text_timeout: Duration,
    image_timeout: Duration,
}

impl TelegramTransport {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        let mut bot = Bot::new(&config.bot_token);
        if let Some(api_url) = &config.api_url {
            let url = reqwest::Url::parse(api_url)
                .with_context(|| format!("Invalid Telegram API URL: {}", api_url))?;
            bot = bot.set_api_url(url);
        }

        Ok(Self {
            bot,
            poll_timeout: Duration::from_secs(config.poll_timeout_secs),
            text_timeout: Duration::from_secs(config.text_timeout_secs),
            image_timeout: Duration::from_secs(config.image_timeout_secs),
        })
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn fetch_updates(&self, after: Option<u32>) -> Result<Vec<InboundUpdate>, TransportError> {
        let mut request = self
            .bot
            .get_updates()
            .timeout(self.poll_timeout.as_secs() as u32);
        if let Some(after) = after {
            request = request.offset(after.saturating_add(1) as i32);
        }

        match bounded(self.poll_timeout + POLL_GRACE, request.send()).await {
            Ok(updates) => Ok(updates.into_iter().map(inbound_update).collect()),
            Err(TransportError::Timeout) => {
                warn!("Encountered timeout while getting updates");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        reply_to: Option<i32>,
        html: bool,
    ) -> Result<i32, TransportError> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(reply_to)));
        }
        if html {
            request = request.parse_mode(ParseMode::Html);
        }

        let message = bounded(self.text_timeout, request.send()).await?;
        debug!("Sent message {} to chat {}", message.id.0, chat_id);
        Ok(message.id.0)
    }

    async fn send_image(
        &self,
        chat_id: i64,
        caption: &str,
        image: &[u8],
        reply_to: Option<i32>,
        html: bool,
    ) -> Result<i32, TransportError> {
        let photo = InputFile::memory(image.to_vec()).file_name("horoscope.png");
        let mut request = self.bot.send_photo(ChatId(chat_id), photo).caption(caption);
        if let Some(reply_to) = reply_to {
            request = request.reply_parameters(ReplyParameters::new(MessageId(reply_to)));
        }
        if html {
            request = request.parse_mode(ParseMode::Html);
        }

        let message = bounded(self.image_timeout, request.send()).await?;
        debug!("Sent photo {} to chat {}", message.id.0, chat_id);
        Ok(message.id.0)
    }
}

/// Await a Bot API request for at most `limit`
async fn bounded<T, F>(limit: Duration, request: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, RequestError>>,
{
    match tokio::time::timeout(limit, request).await {
        Ok(result) => result.map_err(map_request_error),
        Err(_) => Err(TransportError::Timeout),
    }
}

fn map_request_error(err: RequestError) -> TransportError {
    match err {
        RequestError::RetryAfter(seconds) => TransportError::Throttled {
            retry_after: seconds.duration(),
        },
        RequestError::Network(ref e) if e.is_timeout() => TransportError::Timeout,
        RequestError::Network(e) => TransportError::Network(e.to_string()),
        other => TransportError::Api(other.to_string()),
    }
}

fn inbound_update(update: Update) -> InboundUpdate {
    let message = match &update.kind {
        UpdateKind::Message(message) => Some(inbound_message(message)),
        _ => None,
    };

    InboundUpdate {
        id: update.id.0,
        message,
    }
}

fn inbound_message(message: &Message) -> InboundMessage {
    InboundMessage {
        message_id: message.id.0,
        chat_id: message.chat.id.0,
        from_id: message.from.as_ref().map(|user| user.id.0),
        date: message.date.timestamp(),
        dice: message.dice().map(|dice| Dice {
            emoji: emoji_symbol(&dice.emoji),
            value: dice.value,
        }),
    }
}

/// The wire symbol of a dice emoji ("🎰" for the slot machine)
fn emoji_symbol(emoji: &DiceEmoji) -> String {
    match serde_json::to_value(emoji) {
        Ok(serde_json::Value::String(symbol)) => symbol,
        _ => format!("{:?}", emoji),
    }
}
