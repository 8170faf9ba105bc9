use chrono::{DateTime, Duration, Utc};
use sqlx::{Pool, Postgres, QueryBuilder};

use crate::database::Result;

/// Minutes after which another worker may steal a leased item.
pub const LEASE_TTL_MINUTES: i64 = 5;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Model {
    pub id: i64,
    pub job_id: i64,
    pub ticker_symbol: String,
    pub priority: i32,
    pub retry_count: i32,
    pub max_retries: i32,
    pub scheduled_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// What happened to a failed item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailOutcome {
    /// Retries were left; the item went back to pending with backoff.
    Retrying { attempt: i32 },
    /// Retries exhausted, the item was deleted.
    Exhausted,
}

/// Exponential retry delay: 2, 4, 8, ... minutes for attempts 1, 2, 3.
pub fn retry_backoff(retry_count: i32) -> Duration {
    Duration::minutes(2i64.saturating_pow(retry_count.clamp(1, 16) as u32))
}

impl Model {
    pub async fn enqueue(
        pool: &Pool<Postgres>,
        job_id: i64,
        symbols: &[String],
        priority: i32,
    ) -> Result<usize> {
        if symbols.is_empty() {
            return Ok(0);
        }

        let mut qb =
            QueryBuilder::new("INSERT INTO job_queue (job_id, ticker_symbol, priority) ");

        qb.push_values(symbols, |mut row, symbol| {
            row.push_bind(job_id).push_bind(symbol).push_bind(priority);
        });

        let inserted = qb.build().execute(pool).await?.rows_affected();

        Ok(inserted as usize)
    }

    /// Leases up to `limit` visible items for `worker_id`, most urgent first.
    /// `FOR UPDATE SKIP LOCKED` keeps concurrent workers from ever returning
    /// the same row; the stamped `locked_at` keeps it invisible to other
    /// workers for the TTL. A worker may always re-lease its own items, so a
    /// batch cut short by the rate budget resumes on the next tick instead
    /// of waiting out the TTL.
    pub async fn lease(
        pool: &Pool<Postgres>,
        limit: i64,
        worker_id: &str,
    ) -> Result<Vec<Model>> {
        let q = "UPDATE job_queue
                 SET locked_at = NOW(), locked_by = $2
                 WHERE id IN (
                     SELECT id FROM job_queue
                     WHERE scheduled_at <= NOW()
                       AND (locked_at IS NULL
                            OR locked_at < NOW() - make_interval(mins => $3)
                            OR locked_by = $2)
                     ORDER BY priority DESC, scheduled_at ASC
                     LIMIT $1
                     FOR UPDATE SKIP LOCKED
                 )
                 RETURNING *";

        let items: Vec<Model> = sqlx::query_as(q)
            .bind(limit)
            .bind(worker_id)
            .bind(LEASE_TTL_MINUTES as i32)
            .fetch_all(pool)
            .await?;

        Ok(items)
    }

    pub async fn complete(pool: &Pool<Postgres>, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM job_queue WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Failure path: either schedule a retry with exponential backoff or,
    /// when retries are exhausted, drop the item for good.
    pub async fn fail(pool: &Pool<Postgres>, item: &Model, error: &str) -> Result<FailOutcome> {
        let attempt = item.retry_count + 1;

        if attempt > item.max_retries {
            sqlx::query("DELETE FROM job_queue WHERE id = $1")
                .bind(item.id)
                .execute(pool)
                .await?;

            return Ok(FailOutcome::Exhausted);
        }

        let next_attempt_at = Utc::now() + retry_backoff(attempt);

        sqlx::query(
            "UPDATE job_queue
             SET retry_count = $2, error_message = $3, scheduled_at = $4,
                 locked_at = NULL, locked_by = NULL
             WHERE id = $1",
        )
        .bind(item.id)
        .bind(attempt)
        .bind(error)
        .bind(next_attempt_at)
        .execute(pool)
        .await?;

        Ok(FailOutcome::Retrying { attempt })
    }

    /// (remaining, currently leased) for one job's queue.
    pub async fn counts_for_job(pool: &Pool<Postgres>, job_id: i64) -> Result<(i64, i64)> {
        let q = "SELECT COUNT(*) AS remaining,
                        COUNT(locked_at) AS processing
                 FROM job_queue WHERE job_id = $1";

        let (remaining, processing): (i64, i64) =
            sqlx::query_as(q).bind(job_id).fetch_one(pool).await?;

        Ok((remaining, processing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        assert_eq!(retry_backoff(1), Duration::minutes(2));
        assert_eq!(retry_backoff(2), Duration::minutes(4));
        assert_eq!(retry_backoff(3), Duration::minutes(8));
    }

    #[test]
    fn backoff_is_clamped() {
        // A corrupt retry_count must not overflow the shift.
        assert_eq!(retry_backoff(0), Duration::minutes(2));
        assert_eq!(retry_backoff(100), retry_backoff(16));
    }
}
