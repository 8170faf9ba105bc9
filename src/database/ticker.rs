use chrono::{DateTime, Duration, Utc};
use sqlx::{Executor, Postgres};

use crate::database::{DatabaseError, Result};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Model {
    pub id: i32,
    pub symbol: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_dividend_update: Option<DateTime<Utc>>,
    pub update_frequency_hours: i32,
}

impl Model {
    pub async fn fetch_by_symbol<'q, E>(pool: E, symbol: &str) -> Result<Option<Self>>
    where
        E: 'q + Executor<'q, Database = Postgres>,
    {
        let q = "SELECT * FROM tickers WHERE symbol = $1";

        sqlx::query_as(q)
            .bind(symbol)
            .fetch_optional(pool)
            .await
            .map_err(DatabaseError::Sqlx)
    }

    /// Idempotent registration. Re-activates a previously deactivated ticker
    /// without touching its update history.
    pub async fn upsert<'q, E>(pool: E, symbol: &str) -> Result<Self>
    where
        E: 'q + Executor<'q, Database = Postgres>,
    {
        let q = "INSERT INTO tickers (symbol) VALUES ($1)
                 ON CONFLICT (symbol) DO UPDATE SET is_active = TRUE
                 RETURNING *";

        sqlx::query_as(q)
            .bind(symbol)
            .fetch_one(pool)
            .await
            .map_err(DatabaseError::Sqlx)
    }

    /// Advances `last_dividend_update`. The `GREATEST` keeps the column
    /// monotonic when two workers race the same symbol.
    pub async fn mark_updated<'q, E>(pool: E, symbol: &str, at: DateTime<Utc>) -> Result<()>
    where
        E: 'q + Executor<'q, Database = Postgres>,
    {
        let q = "UPDATE tickers
                 SET last_dividend_update = GREATEST(COALESCE(last_dividend_update, $2), $2)
                 WHERE symbol = $1";

        sqlx::query(q)
            .bind(symbol)
            .bind(at)
            .execute(pool)
            .await
            .map_err(DatabaseError::Sqlx)?;

        Ok(())
    }

    /// Freshness check used by the worker to skip symbols updated within
    /// their refresh window.
    pub fn needs_update(&self, now: DateTime<Utc>) -> bool {
        match self.last_dividend_update {
            None => true,
            Some(at) => at < now - Duration::hours(self.update_frequency_hours.max(1) as i64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticker(last_update: Option<DateTime<Utc>>) -> Model {
        Model {
            id: 1,
            symbol: "AAPL".to_string(),
            is_active: true,
            created_at: Utc::now() - Duration::days(30),
            last_dividend_update: last_update,
            update_frequency_hours: 24,
        }
    }

    #[test]
    fn never_updated_needs_update() {
        let now = Utc::now();
        assert!(ticker(None).needs_update(now));
    }

    #[test]
    fn fresh_ticker_is_skipped() {
        let now = Utc::now();
        assert!(!ticker(Some(now - Duration::hours(1))).needs_update(now));
    }

    #[test]
    fn stale_ticker_needs_update() {
        let now = Utc::now();
        assert!(ticker(Some(now - Duration::hours(25))).needs_update(now));
    }
}
