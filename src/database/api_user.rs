use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Executor, Postgres};

use crate::database::{DatabaseError, Result};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, utoipa::ToSchema,
)]
#[sqlx(type_name = "plan_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Free,
    Basic,
    Premium,
}

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Model {
    pub id: i32,
    pub api_key: String,
    pub user_name: Option<String>,
    pub plan_type: PlanType,
    pub max_subscriptions: i32,
    pub rate_limit: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Model {
    /// Key lookup for the auth gate. Disabled users are filtered here so the
    /// rest of the system never sees them.
    pub async fn fetch_by_key<'q, E>(pool: E, api_key: &str) -> Result<Option<Self>>
    where
        E: 'q + Executor<'q, Database = Postgres>,
    {
        let q = "SELECT * FROM api_users WHERE api_key = $1 AND is_active = TRUE";

        sqlx::query_as(q)
            .bind(api_key)
            .fetch_optional(pool)
            .await
            .map_err(DatabaseError::Sqlx)
    }
}
