use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Encode, Executor, Pool, Postgres, QueryBuilder, Type};

use crate::database::{DatabaseError, ModelExt, Result};
use crate::errors::jobs::JobError;

/// Seconds of provider spacing budgeted per queued symbol, used for the
/// completion estimate (5 calls/minute).
pub const SECONDS_PER_ITEM: i64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    DividendUpdate,
    TickerSync,
    DataCleanup,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Model {
    pub id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    pub ticker_symbols: Vec<String>,
    pub total: i32,
    pub processed: i32,
    pub failed: i32,
    pub priority: i32,
    pub force: bool,
    pub metadata: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
pub struct ListFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

/// Point-in-time progress for one job. `remaining`/`processing` come from the
/// queue, the counters from the job row, so the two can be momentarily out of
/// step while a worker is mid-item.
#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct Progress {
    pub total: i32,
    pub processed: i32,
    pub failed: i32,
    pub remaining: i64,
    pub processing: i64,
    pub percent_complete: f64,
}

impl Model {
    pub async fn create(
        pool: &Pool<Postgres>,
        job_type: JobType,
        ticker_symbols: &[String],
        priority: i32,
        force: bool,
        metadata: serde_json::Value,
    ) -> Result<Model> {
        let total = ticker_symbols.len() as i32;
        let estimated_completion =
            Utc::now() + Duration::seconds(SECONDS_PER_ITEM * total as i64);

        let q = "INSERT INTO api_jobs (job_type, ticker_symbols, total, priority, force, metadata, estimated_completion)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 RETURNING *";

        sqlx::query_as(q)
            .bind(job_type)
            .bind(ticker_symbols)
            .bind(total)
            .bind(priority)
            .bind(force)
            .bind(metadata)
            .bind(estimated_completion)
            .fetch_one(pool)
            .await
            .map_err(DatabaseError::Sqlx)
    }

    pub async fn list(pool: &Pool<Postgres>, filter: &ListFilter) -> Result<(Vec<Model>, usize)> {
        let limit = filter.limit.unwrap_or(50).clamp(1, 500);
        let offset = filter.offset.unwrap_or(0).max(0);

        let sort = match filter.sort.as_deref() {
            Some("priority") => "priority",
            Some("status") => "status",
            Some("completed_at") => "completed_at",
            _ => "created_at",
        };
        let order = match filter.order.as_deref().map(str::to_uppercase).as_deref() {
            Some("ASC") => "ASC",
            _ => "DESC",
        };

        let mut list_qb = QueryBuilder::new("SELECT * FROM api_jobs WHERE TRUE");
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM api_jobs WHERE TRUE");

        for qb in [&mut list_qb, &mut count_qb] {
            if let Some(status) = filter.status {
                qb.push(" AND status = ");
                qb.push_bind(status);
            }
            if let Some(job_type) = filter.job_type {
                qb.push(" AND job_type = ");
                qb.push_bind(job_type);
            }
        }

        list_qb.push(format!(" ORDER BY {sort} {order} LIMIT "));
        list_qb.push_bind(limit);
        list_qb.push(" OFFSET ");
        list_qb.push_bind(offset);

        let rows: Vec<Model> = list_qb.build_query_as().fetch_all(pool).await?;
        let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

        Ok((rows, total as usize))
    }

    /// First transition out of `pending`. A no-op when another worker already
    /// moved the job along or a terminal state was reached.
    pub async fn mark_processing<'q, E>(pool: E, id: i64) -> Result<()>
    where
        E: 'q + Executor<'q, Database = Postgres>,
    {
        let q = "UPDATE api_jobs
                 SET status = 'processing', started_at = COALESCE(started_at, NOW())
                 WHERE id = $1 AND status = 'pending'";

        sqlx::query(q).bind(id).execute(pool).await?;

        Ok(())
    }

    /// Atomic progress increments. Terminal jobs are never touched.
    pub async fn advance<'q, E>(pool: E, id: i64, processed: i32, failed: i32) -> Result<()>
    where
        E: 'q + Executor<'q, Database = Postgres>,
    {
        let q = "UPDATE api_jobs
                 SET processed = processed + $2, failed = failed + $3
                 WHERE id = $1 AND status IN ('pending', 'processing')";

        sqlx::query(q)
            .bind(id)
            .bind(processed)
            .bind(failed)
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Cancels a pending job and drops its queue items. Jobs that already
    /// started (or finished) are not cancellable.
    pub async fn cancel(pool: &Pool<Postgres>, id: i64) -> Result<Model> {
        let mut tx = pool.begin().await?;

        let current: Option<Model> = sqlx::query_as("SELECT * FROM api_jobs WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;

        let current = current.ok_or(JobError::NotFound(id))?;
        if current.status != JobStatus::Pending {
            return Err(JobError::NotCancellable {
                id,
                status: current.status,
            }
            .into());
        }

        let cancelled: Model = sqlx::query_as(
            "UPDATE api_jobs
             SET status = 'cancelled', error_message = 'Job cancelled by user', completed_at = NOW()
             WHERE id = $1
             RETURNING *",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM job_queue WHERE job_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(cancelled)
    }

    /// Moves a processing job to its terminal state once its queue drained:
    /// `completed` when anything processed, `failed` otherwise. Returns the
    /// new status when a transition happened.
    pub async fn finalize_if_drained(pool: &Pool<Postgres>, id: i64) -> Result<Option<JobStatus>> {
        let q = "UPDATE api_jobs
                 SET status = (CASE WHEN processed > 0 THEN 'completed' ELSE 'failed' END)::job_status,
                     completed_at = NOW()
                 WHERE id = $1
                   AND status = 'processing'
                   AND NOT EXISTS (SELECT 1 FROM job_queue WHERE job_id = $1)
                 RETURNING status";

        let status: Option<JobStatus> = sqlx::query_scalar(q).bind(id).fetch_optional(pool).await?;

        Ok(status)
    }

    pub async fn progress(pool: &Pool<Postgres>, id: i64) -> Result<(Model, Progress)> {
        let job = Self::fetch_by_id(pool, id)
            .await?
            .ok_or(JobError::NotFound(id))?;

        let (remaining, processing) = crate::database::queue::Model::counts_for_job(pool, id).await?;

        let done = (job.processed + job.failed) as f64;
        let percent_complete = if job.total > 0 {
            (done / job.total as f64 * 100.0).min(100.0)
        } else {
            100.0
        };

        let progress = Progress {
            total: job.total,
            processed: job.processed,
            failed: job.failed,
            remaining,
            processing,
            percent_complete,
        };

        Ok((job, progress))
    }
}

/// Human-readable completion estimate from the number of queued items.
pub fn estimate_eta(remaining: i64) -> String {
    let seconds = remaining.max(0) * SECONDS_PER_ITEM;
    if seconds == 0 {
        return "done".to_string();
    }
    if seconds < 60 {
        return format!("~{seconds}s");
    }
    let minutes = seconds / 60;
    let rest = seconds % 60;
    if rest == 0 {
        format!("~{minutes}m")
    } else {
        format!("~{minutes}m {rest}s")
    }
}

#[async_trait]
impl<'q> ModelExt<'q> for Model {
    async fn fetch_by_id<T, E>(pool: E, id: T) -> Result<Option<Self>>
    where
        Self: Sized,
        T: 'q + Encode<'q, Postgres> + Type<Postgres> + Send,
        E: 'q + Executor<'q, Database = Postgres>,
    {
        let q = "SELECT * FROM api_jobs WHERE id = $1";

        sqlx::query_as(q)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(DatabaseError::Sqlx)
    }

    async fn fetch_all<E>(pool: E, limit: i64, offset: i64) -> Result<Vec<Self>>
    where
        Self: Sized,
        E: 'q + Executor<'q, Database = Postgres>,
    {
        let limit = limit.clamp(1, 1000);
        let q = "SELECT * FROM api_jobs ORDER BY created_at DESC LIMIT $1 OFFSET $2";

        sqlx::query_as(q)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .map_err(DatabaseError::Sqlx)
    }

    async fn total_count<E>(pool: E) -> Result<usize>
    where
        E: 'q + Executor<'q, Database = Postgres>,
    {
        let q = "SELECT COUNT(*) FROM api_jobs";
        let result: i64 = sqlx::query_scalar(q).fetch_one(pool).await?;

        Ok(result as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
    }

    #[test]
    fn eta_formatting() {
        assert_eq!(estimate_eta(0), "done");
        assert_eq!(estimate_eta(1), "~12s");
        assert_eq!(estimate_eta(5), "~1m");
        assert_eq!(estimate_eta(12), "~2m 24s");
    }
}
