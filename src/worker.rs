//! The queue worker.
//!
//! One long-running task per process drains the job queue, calling the
//! upstream provider under the shared rate budget and committing results
//! through the store. The loop is written so that several competing worker
//! processes are safe (lease semantics do the coordination); a single
//! instance is simply the common deployment.
//!
//! Progress accounting is two small statements per item (complete the item,
//! then bump the job counters), never one transaction spanning both. If the
//! second write is lost the job counters run behind the queue, which the
//! terminal transition tolerates.

use std::collections::BTreeSet;
use std::time::Duration as StdDuration;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::time::sleep;
use tokio_retry2::{Retry, RetryError, strategy::ExponentialBackoff};
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::{DatabaseError, ModelExt};
use crate::database::job::{self, JobStatus};
use crate::database::queue::{self, FailOutcome};
use crate::database::rate_budget::{self, POLYGON_SERVICE};
use crate::database::{dividend, ticker};
use crate::polygon::{FetchError, FetchKind, PolygonClient};

/// Pause between items of one batch, to avoid bursting the provider.
const COURTESY_DELAY: StdDuration = StdDuration::from_secs(1);

/// Poll interval when the queue looked empty and nobody nudged us.
const IDLE_POLL: StdDuration = StdDuration::from_secs(30);

/// Soft per-item budget. An item that cannot finish inside this window is
/// failed and retried later.
const ITEM_BUDGET: StdDuration = StdDuration::from_secs(30);

/// ZST used to nudge the worker when new work was enqueued.
pub struct WorkNotif;

#[derive(Debug, Clone, Default, PartialEq, Serialize, utoipa::ToSchema)]
pub struct TickSummary {
    pub leased: usize,
    pub processed: usize,
    /// Items completed without a provider call because the ticker was fresh.
    /// Indistinguishable from `processed` in the job counters.
    pub skipped: usize,
    pub failed: usize,
    pub finalized_jobs: Vec<i64>,
    /// Set when the tick stopped early because the call budget was spent.
    pub rate_limited_wait_ms: Option<i64>,
}

pub fn new_worker_pool(db: PgPool, polygon: PolygonClient, batch_size: i64) -> Sender<WorkNotif> {
    let (tx, rx) = tokio::sync::mpsc::channel(25);

    tokio::spawn(worker_loop(db, polygon, rx, batch_size));

    tx
}

/// Long-running drain loop. If one tick errors the loop keeps going; the
/// leases it held simply expire.
async fn worker_loop(
    db: PgPool,
    polygon: PolygonClient,
    mut rx: Receiver<WorkNotif>,
    batch_size: i64,
) {
    let worker_id = format!("worker-{}", Uuid::new_v4());
    info!(worker_id, "queue worker started");

    loop {
        match run_tick(&db, &polygon, &worker_id, batch_size).await {
            Ok(summary) => {
                if let Some(wait_ms) = summary.rate_limited_wait_ms {
                    sleep(StdDuration::from_millis(wait_ms.max(0) as u64)).await;
                    continue;
                }
                if summary.leased > 0 {
                    // There may be more behind what we just drained.
                    continue;
                }
            }
            Err(err) => {
                warn!(worker_id, "worker tick failed: {err}");
            }
        }

        tokio::select! {
            _ = sleep(IDLE_POLL) => (),
            _ = recv_drain_all(&mut rx) => (),
        }
    }
}

/// Waits until a nudge arrives, then clears any queued duplicates; a single
/// tick will see everything that was enqueued, so more than one pending
/// notification is never needed.
async fn recv_drain_all(rx: &mut Receiver<WorkNotif>) {
    if rx.recv().await.is_none() {
        return;
    }
    while rx.try_recv().is_ok() {}
}

/// One worker iteration: gate on the call budget, lease a batch, process it
/// in lease order, then move drained jobs to their terminal state.
#[tracing::instrument(skip(db, polygon))]
pub async fn run_tick(
    db: &PgPool,
    polygon: &PolygonClient,
    worker_id: &str,
    batch_size: i64,
) -> Result<TickSummary, DatabaseError> {
    let mut summary = TickSummary::default();

    // Read-only gate: the budget slot itself is spent by the fetch, this
    // only avoids leasing items we could not process anyway.
    let wait_ms = rate_budget::Model::time_until_next_call(db, POLYGON_SERVICE).await?;
    if wait_ms > 0 {
        summary.rate_limited_wait_ms = Some(wait_ms);
        return Ok(summary);
    }

    let items = lease_with_retry(db, batch_size, worker_id).await?;
    summary.leased = items.len();

    let mut touched: BTreeSet<i64> = BTreeSet::new();

    for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
            sleep(COURTESY_DELAY).await;
        }

        let Some(owner) = job::Model::fetch_by_id(db, item.job_id).await? else {
            // Orphaned item; the owning job is gone.
            queue::Model::complete(db, item.id).await?;
            continue;
        };

        if owner.status.is_terminal() {
            // Cancelled or already finished elsewhere; drop without touching
            // the counters.
            queue::Model::complete(db, item.id).await?;
            continue;
        }

        touched.insert(owner.id);

        if owner.status == JobStatus::Pending {
            job::Model::mark_processing(db, owner.id).await?;
        }

        if !owner.force
            && let Some(row) = ticker::Model::fetch_by_symbol(db, &item.ticker_symbol).await?
            && !row.needs_update(Utc::now())
        {
            queue::Model::complete(db, item.id).await?;
            job::Model::advance(db, owner.id, 1, 0).await?;
            summary.skipped += 1;
            continue;
        }

        let fetched = tokio::time::timeout(
            ITEM_BUDGET,
            polygon.fetch_dividends(db, &item.ticker_symbol, FetchKind::Historical),
        )
        .await
        .unwrap_or(Err(FetchError::Transient(format!(
            "item exceeded {}s processing budget",
            ITEM_BUDGET.as_secs()
        ))));

        match fetched {
            Ok(records) => {
                let result = dividend::Model::upsert_batch(db, &records).await?;
                if result.errors > 0 {
                    warn!(
                        ticker = %item.ticker_symbol,
                        errors = result.errors,
                        "skipped invalid dividend records: {:?}",
                        result.error_messages
                    );
                }

                ticker::Model::mark_updated(db, &item.ticker_symbol, Utc::now()).await?;
                queue::Model::complete(db, item.id).await?;
                job::Model::advance(db, owner.id, 1, 0).await?;
                summary.processed += 1;

                info!(
                    ticker = %item.ticker_symbol,
                    job_id = owner.id,
                    inserted = result.inserted,
                    "dividend update committed"
                );
            }
            Err(FetchError::RateLimited { wait_ms }) => {
                // Stop the batch; this item and the rest keep their leases
                // and come back on the next tick.
                summary.rate_limited_wait_ms = Some(wait_ms);
                break;
            }
            Err(err) => {
                match queue::Model::fail(db, item, &err.to_string()).await? {
                    FailOutcome::Retrying { attempt } => {
                        warn!(
                            ticker = %item.ticker_symbol,
                            job_id = owner.id,
                            attempt,
                            "item failed, scheduled for retry: {err}"
                        );
                    }
                    FailOutcome::Exhausted => {
                        // Only a permanently dead item counts against the job.
                        job::Model::advance(db, owner.id, 0, 1).await?;
                        summary.failed += 1;
                        warn!(
                            ticker = %item.ticker_symbol,
                            job_id = owner.id,
                            "item failed permanently: {err}"
                        );
                    }
                }
            }
        }
    }

    for job_id in touched {
        if let Some(status) = job::Model::finalize_if_drained(db, job_id).await? {
            info!(job_id, ?status, "job reached terminal state");
            summary.finalized_jobs.push(job_id);
        }
    }

    Ok(summary)
}

async fn lease_with_retry(
    db: &PgPool,
    batch_size: i64,
    worker_id: &str,
) -> Result<Vec<queue::Model>, DatabaseError> {
    let retry_strategy = ExponentialBackoff::from_millis(10).take(5);

    let action = async || {
        queue::Model::lease(db, batch_size, worker_id)
            .await
            .map_err(|err| {
                if err.is_transient() {
                    RetryError::transient(err)
                } else {
                    RetryError::permanent(err)
                }
            })
    };

    Retry::spawn(retry_strategy, action).await
}
