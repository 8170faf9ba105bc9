use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};

use crate::database::Result;
use crate::errors::subscriptions::SubscriptionError;

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Model {
    pub id: i64,
    pub user_id: i32,
    pub ticker_symbol: String,
    pub priority: i32,
    pub subscribed_at: DateTime<Utc>,
    pub notification_enabled: bool,
    pub auto_update_enabled: bool,
    pub last_dividend_check: Option<DateTime<Utc>>,
}

/// Result of a subscribe call; `created` distinguishes a brand-new
/// subscription (which triggers a backfill) from a priority update.
#[derive(Debug, Clone, PartialEq)]
pub struct Subscribed {
    pub subscription: Model,
    pub created: bool,
}

impl Model {
    /// Creates or updates one (user, ticker) subscription. The per-user cap
    /// is checked under a lock on the user row so two concurrent subscribes
    /// cannot both squeeze past the limit.
    pub async fn subscribe(
        pool: &Pool<Postgres>,
        user_id: i32,
        max_subscriptions: i32,
        ticker: &str,
        priority: i32,
    ) -> Result<Subscribed> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT id FROM api_users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let existing: Option<Model> = sqlx::query_as(
            "SELECT * FROM user_subscriptions WHERE user_id = $1 AND ticker_symbol = $2",
        )
        .bind(user_id)
        .bind(ticker)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(_existing) = existing {
            let updated: Model = sqlx::query_as(
                "UPDATE user_subscriptions SET priority = $3
                 WHERE user_id = $1 AND ticker_symbol = $2
                 RETURNING *",
            )
            .bind(user_id)
            .bind(ticker)
            .bind(priority)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;

            return Ok(Subscribed {
                subscription: updated,
                created: false,
            });
        }

        let current: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_subscriptions WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&mut *tx)
                .await?;

        if current >= max_subscriptions as i64 {
            return Err(SubscriptionError::LimitReached {
                limit: max_subscriptions as i64,
                current,
            }
            .into());
        }

        let created: Model = sqlx::query_as(
            "INSERT INTO user_subscriptions (user_id, ticker_symbol, priority)
             VALUES ($1, $2, $3)
             RETURNING *",
        )
        .bind(user_id)
        .bind(ticker)
        .bind(priority)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Subscribed {
            subscription: created,
            created: true,
        })
    }

    /// Removes a subscription, reporting whether one existed.
    pub async fn unsubscribe(pool: &Pool<Postgres>, user_id: i32, ticker: &str) -> Result<bool> {
        let deleted = sqlx::query(
            "DELETE FROM user_subscriptions WHERE user_id = $1 AND ticker_symbol = $2",
        )
        .bind(user_id)
        .bind(ticker)
        .execute(pool)
        .await?
        .rows_affected();

        Ok(deleted > 0)
    }

    pub async fn list_for_user(pool: &Pool<Postgres>, user_id: i32) -> Result<Vec<Model>> {
        let q = "SELECT * FROM user_subscriptions WHERE user_id = $1 ORDER BY subscribed_at ASC";

        let subs = sqlx::query_as(q).bind(user_id).fetch_all(pool).await?;

        Ok(subs)
    }

    pub async fn count_for_user(pool: &Pool<Postgres>, user_id: i32) -> Result<i64> {
        let count =
            sqlx::query_scalar("SELECT COUNT(*) FROM user_subscriptions WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(pool)
                .await?;

        Ok(count)
    }

    pub async fn ticker_symbols_for_user(
        pool: &Pool<Postgres>,
        user_id: i32,
    ) -> Result<Vec<String>> {
        let q = "SELECT ticker_symbol FROM user_subscriptions WHERE user_id = $1 ORDER BY ticker_symbol";

        let symbols = sqlx::query_scalar(q).bind(user_id).fetch_all(pool).await?;

        Ok(symbols)
    }
}

/// Appends a row to the subscription activity log.
pub async fn log_activity(
    pool: &Pool<Postgres>,
    user_id: i32,
    ticker: Option<&str>,
    action: &str,
    details: serde_json::Value,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO subscription_activity (user_id, ticker_symbol, action, details)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(user_id)
    .bind(ticker)
    .bind(action)
    .bind(details)
    .execute(pool)
    .await?;

    Ok(())
}
