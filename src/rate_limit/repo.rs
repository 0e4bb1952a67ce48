use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::TimeZone;
use chrono_tz::Tz;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::info;

use crate::rate_limit::UsageRecord;

/// Storage for usage records
#[async_trait]
pub trait UsageRepo: Send + Sync {
    async fn add(&self, usage: UsageRecord) -> Result<()>;

    /// Up to `limit` most recent usages, newest first.
    async fn latest(&self, context_id: i64, user_id: u64, limit: usize) -> Result<Vec<UsageRecord>>;
}

/// Volatile store; usages are lost on restart
#[derive(Default)]
pub struct InMemoryUsageRepo {
    usages: Mutex<Vec<UsageRecord>>,
}

impl InMemoryUsageRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UsageRepo for InMemoryUsageRepo {
    async fn add(&self, usage: UsageRecord) -> Result<()> {
        self.usages.lock().await.push(usage);
        Ok(())
    }

    async fn latest(&self, context_id: i64, user_id: u64, limit: usize) -> Result<Vec<UsageRecord>> {
        let usages = self.usages.lock().await;
        let mut matching: Vec<UsageRecord> = usages
            .iter()
            .filter(|usage| usage.context_id == context_id && usage.user_id == user_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal times; reverse puts newest first
        matching.sort_by_key(|usage| usage.time);
        matching.reverse();
        matching.truncate(limit);
        Ok(matching)
    }
}

/// SQLite-backed store. Times are persisted as unix seconds and read back
/// in `timezone`.
pub struct SqliteUsageRepo {
    conn: Mutex<Connection>,
    timezone: Tz,
}

impl SqliteUsageRepo {
    pub fn open(path: &Path, timezone: Tz) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        Self::run_migrations(&conn)?;

        info!("Usage store initialized at: {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
            timezone,
        })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory(timezone: Tz) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            timezone,
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS usages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                context_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                time INTEGER NOT NULL,
                reference_id TEXT,
                response_id TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_usages_user
                ON usages(context_id, user_id, time);
            ",
        )
        .context("Failed to create usages table")?;
        Ok(())
    }
}

#[async_trait]
impl UsageRepo for SqliteUsageRepo {
    async fn add(&self, usage: UsageRecord) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO usages (context_id, user_id, time, reference_id, response_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                usage.context_id,
                usage.user_id as i64,
                usage.time.timestamp(),
                usage.reference_id,
                usage.response_id,
            ],
        )
        .context("Failed to insert usage")?;
        Ok(())
    }

    async fn latest(&self, context_id: i64, user_id: u64, limit: usize) -> Result<Vec<UsageRecord>> {
        let rows = {
            let conn = self.conn.lock().await;
            let mut stmt = conn
                .prepare(
                    "SELECT time, reference_id, response_id FROM usages
                     WHERE context_id = ?1 AND user_id = ?2
                     ORDER BY time DESC, id DESC
                     LIMIT ?3",
                )
                .context("Failed to prepare usage query")?;
            let rows = stmt
                .query_map(
                    rusqlite::params![context_id, user_id as i64, limit as i64],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Option<String>>(2)?,
                        ))
                    },
                )
                .context("Failed to query usages")?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("Failed to collect usages")?;
            rows
        };

        rows.into_iter()
            .map(|(timestamp, reference_id, response_id)| {
                let time = self
                    .timezone
                    .timestamp_opt(timestamp, 0)
                    .single()
                    .with_context(|| format!("Invalid usage timestamp: {}", timestamp))?;
                Ok(UsageRecord {
                    context_id,
                    user_id,
                    time,
                    reference_id,
                    response_id,
                })
            })
            .collect()
    }
}
