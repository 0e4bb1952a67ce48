pub mod repo;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::rate_limit::repo::UsageRepo;

/// A past roll that received (or was at least considered for) a reply
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub context_id: i64,
    pub user_id: u64,
    pub time: DateTime<Tz>,
    /// Id of the inbound message that triggered the usage
    pub reference_id: Option<String>,
    /// Id of the reply, if one was sent
    pub response_id: Option<String>,
}

#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// The prior usage that makes a roll at `at_time` ineligible. Read-only.
    async fn get_conflict(
        &self,
        context_id: i64,
        user_id: u64,
        at_time: &DateTime<Tz>,
    ) -> Result<Option<UsageRecord>>;

    async fn record_usage(&self, usage: UsageRecord) -> Result<()>;
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LimitWindow {
    #[default]
    Day,
    Week,
}

impl LimitWindow {
    /// Whether both times fall into the same calendar day / ISO week
    pub fn contains(&self, a: &DateTime<Tz>, b: &DateTime<Tz>) -> bool {
        let b = b.with_timezone(&a.timezone());
        match self {
            LimitWindow::Day => a.date_naive() == b.date_naive(),
            LimitWindow::Week => a.iso_week() == b.iso_week(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitPolicy {
    /// Every roll is eligible.
    Stub,
    /// At most `limit` usages per window.
    Window { window: LimitWindow, limit: u32 },
}

pub struct PolicyRateLimiter {
    policy: RateLimitPolicy,
    repo: Box<dyn UsageRepo>,
}

impl PolicyRateLimiter {
    pub fn new(policy: RateLimitPolicy, repo: Box<dyn UsageRepo>) -> Self {
        Self { policy, repo }
    }
}

#[async_trait]
impl RateLimiter for PolicyRateLimiter {
    async fn get_conflict(
        &self,
        context_id: i64,
        user_id: u64,
        at_time: &DateTime<Tz>,
    ) -> Result<Option<UsageRecord>> {
        let (window, limit) = match self.policy {
            RateLimitPolicy::Stub => return Ok(None),
            RateLimitPolicy::Window { window, limit } => (window, limit as usize),
        };
        if limit == 0 {
            return Ok(None);
        }

        let in_window: Vec<UsageRecord> = self
            .repo
            .latest(context_id, user_id, limit)
            .await?
            .into_iter()
            .filter(|usage| window.contains(at_time, &usage.time))
            .collect();

        if in_window.len() >= limit {
            Ok(in_window.into_iter().next())
        } else {
            Ok(None)
        }
    }

    async fn record_usage(&self, usage: UsageRecord) -> Result<()> {
        self.repo.add(usage).await
    }
}
