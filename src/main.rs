mod bot;
mod config;
mod content;
mod cooldown;
mod events;
mod filter;
mod platform;
mod poller;
mod rate_limit;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono_tz::Tz;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::DiceBot;
use crate::config::{Config, ContentMode, EventsMode, RateLimitConfig, RateLimiterKind};
use crate::content::canned::CannedContent;
use crate::content::llm::LlmContent;
use crate::content::{ContentProvider, WithImage};
use crate::events::webhook::WebhookEventSink;
use crate::events::{EventSink, StubEventSink};
use crate::filter::EligibilityFilter;
use crate::platform::telegram::TelegramTransport;
use crate::platform::Transport;
use crate::poller::UpdateLoop;
use crate::rate_limit::repo::{InMemoryUsageRepo, SqliteUsageRepo, UsageRepo};
use crate::rate_limit::{PolicyRateLimiter, RateLimitPolicy, RateLimiter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,slotbot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let timezone = config.tz()?;

    info!("Configuration loaded successfully");
    info!("  Enabled chats: {:?}", config.telegram.enabled_chats);
    info!("  Timezone: {}", timezone);
    info!(
        "  Rate limiter: {} ({:?}, limit {})",
        config.rate_limit.kind, config.rate_limit.window, config.rate_limit.limit
    );
    info!("  Content: {}", config.content.mode);
    info!("  Events: {}", config.events.mode);

    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(&config.telegram)?);
    let filter = EligibilityFilter::new(
        config.telegram.enabled_chats.iter().copied(),
        config.dice.emoji.clone(),
        config.dice.neutral_value,
        timezone,
    );

    let bot = DiceBot::new(
        transport.clone(),
        filter,
        load_rate_limiter(&config.rate_limit, timezone)?,
        load_content(&config)?,
        load_event_sink(&config)?,
        config.cooldown_responder(),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    info!("Launching bot...");
    let mut update_loop = UpdateLoop::new(transport, bot, shutdown);
    update_loop.run().await;

    info!(
        "Update loop {:?} at cursor {:?}",
        update_loop.state(),
        update_loop.cursor()
    );
    Ok(())
}

fn load_rate_limiter(config: &RateLimitConfig, timezone: Tz) -> Result<Arc<dyn RateLimiter>> {
    let policy = match config.kind {
        RateLimiterKind::Stub => RateLimitPolicy::Stub,
        _ => RateLimitPolicy::Window {
            window: config.window,
            limit: config.limit,
        },
    };

    let repo: Box<dyn UsageRepo> = match (config.kind, &config.database_path) {
        (RateLimiterKind::Sqlite, Some(path)) => Box::new(SqliteUsageRepo::open(path, timezone)?),
        (RateLimiterKind::Sqlite, None) => {
            anyhow::bail!("rate_limit.kind = \"sqlite\" requires rate_limit.database_path")
        }
        (RateLimiterKind::Memory, _) => {
            warn!("Using in-memory rate limiting repo");
            Box::new(InMemoryUsageRepo::new())
        }
        (RateLimiterKind::Stub, _) => Box::new(InMemoryUsageRepo::new()),
    };

    Ok(Arc::new(PolicyRateLimiter::new(policy, repo)))
}

fn load_content(config: &Config) -> Result<Arc<dyn ContentProvider>> {
    let provider: Arc<dyn ContentProvider> = match (config.content.mode, &config.content.llm) {
        (ContentMode::Canned, _) => Arc::new(CannedContent::new()),
        (ContentMode::Llm, Some(llm)) => {
            info!("  LLM model: {}", llm.model);
            Arc::new(LlmContent::new(llm.clone()))
        }
        (ContentMode::Llm, None) => anyhow::bail!("content.mode = \"llm\" requires [content.llm]"),
    };

    match &config.content.image_path {
        Some(path) => {
            let image = std::fs::read(path)
                .with_context(|| format!("Failed to read image: {}", path.display()))?;
            info!("  Image: {} ({} bytes)", path.display(), image.len());
            Ok(Arc::new(WithImage::new(provider, image)))
        }
        None => Ok(provider),
    }
}

fn load_event_sink(config: &Config) -> Result<Arc<dyn EventSink>> {
    match (config.events.mode, &config.events.url) {
        (EventsMode::Stub, _) => {
            warn!("Using stub event publisher");
            Ok(Arc::new(StubEventSink))
        }
        (EventsMode::Webhook, Some(url)) => Ok(Arc::new(WebhookEventSink::new(url.clone()))),
        (EventsMode::Webhook, None) => anyhow::bail!("events.mode = \"webhook\" requires events.url"),
    }
}

/// Cancel `shutdown` on SIGINT or SIGTERM
async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received SIGINT signal, requesting termination..."),
                    _ = sigterm.recv() => info!("Received SIGTERM signal, requesting termination..."),
                }
            }
            Err(e) => {
                warn!("Could not install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received SIGINT signal, requesting termination...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received interrupt, requesting termination...");
    }

    shutdown.cancel();
}
