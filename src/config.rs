use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cooldown::CooldownResponder;
use crate::rate_limit::LimitWindow;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RateLimiterKind {
    /// Never reports a conflict.
    Stub,
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContentMode {
    #[default]
    Canned,
    Llm,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventsMode {
    #[default]
    Stub,
    Webhook,
}

impl std::fmt::Display for RateLimiterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimiterKind::Stub => write!(f, "stub"),
            RateLimiterKind::Memory => write!(f, "memory"),
            RateLimiterKind::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl std::fmt::Display for ContentMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContentMode::Canned => write!(f, "canned"),
            ContentMode::Llm => write!(f, "llm"),
        }
    }
}

impl std::fmt::Display for EventsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventsMode::Stub => write!(f, "stub"),
            EventsMode::Webhook => write!(f, "webhook"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub dice: DiceConfig,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub content: ContentConfig,
    #[serde(default)]
    pub events: EventsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub enabled_chats: Vec<i64>,
    /// Overrides the Bot API base URL (local bot API servers, tests).
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
    #[serde(default = "default_text_timeout_secs")]
    pub text_timeout_secs: u64,
    #[serde(default = "default_image_timeout_secs")]
    pub image_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiceConfig {
    #[serde(default = "default_dice_emoji")]
    pub emoji: String,
    /// Slot value on which the platform posts its own notice (three lemons).
    #[serde(default = "default_neutral_value")]
    pub neutral_value: u8,
}

impl Default for DiceConfig {
    fn default() -> Self {
        Self {
            emoji: default_dice_emoji(),
            neutral_value: default_neutral_value(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub kind: RateLimiterKind,
    #[serde(default)]
    pub window: LimitWindow,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            kind: RateLimiterKind::default(),
            window: LimitWindow::default(),
            limit: default_limit(),
            database_path: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ContentConfig {
    #[serde(default)]
    pub mode: ContentMode,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
    /// Picture sent along with every horoscope
    #[serde(default)]
    pub image_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct EventsConfig {
    #[serde(default)]
    pub mode: EventsMode,
    #[serde(default)]
    pub url: Option<String>,
}

fn default_timezone() -> String {
    "Europe/Berlin".to_string()
}

fn default_poll_timeout_secs() -> u64 {
    10
}

fn default_text_timeout_secs() -> u64 {
    10
}

fn default_image_timeout_secs() -> u64 {
    20
}

fn default_dice_emoji() -> String {
    "🎰".to_string()
}

fn default_neutral_value() -> u8 {
    43
}

fn default_limit() -> u32 {
    1
}

fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_max_tokens() -> u32 {
    256
}

fn default_system_prompt() -> String {
    "Du bist ein Astrologe mit schwarzem Humor. \
     Du schreibst Tageshoroskope in genau einem Satz auf Deutsch."
        .to_string()
}

impl Config {
    /// Parsed `timezone`, used for every timestamp the bot reasons about.
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("Unknown timezone '{}': {}", self.timezone, e))
    }

    /// The refusal style matches the limiter window.
    pub fn cooldown_responder(&self) -> CooldownResponder {
        match self.rate_limit.window {
            LimitWindow::Day => CooldownResponder::Day,
            LimitWindow::Week => CooldownResponder::Week,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;

        config.tz()?;

        if config.content.mode == ContentMode::Llm && config.content.llm.is_none() {
            anyhow::bail!("content.mode = \"llm\" requires a [content.llm] section");
        }
        if config.events.mode == EventsMode::Webhook && config.events.url.is_none() {
            anyhow::bail!("events.mode = \"webhook\" requires events.url");
        }

        Ok(config)
    }
}
