pub mod api_user;
pub mod dividend;
pub mod job;
pub mod queue;
pub mod rate_budget;
pub mod subscription;
pub mod ticker;

use actix_web::{error::ResponseError, http::StatusCode};
use async_trait::async_trait;
use sqlx::{Encode, Executor, Postgres, Type};

pub type Result<T> = std::result::Result<T, DatabaseError>;

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Job(#[from] crate::errors::jobs::JobError),

    #[error(transparent)]
    Subscription(#[from] crate::errors::subscriptions::SubscriptionError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Conflicting store state: {0}")]
    Conflict(String),

    #[error("Invalid data: {0}")]
    Invalid(String),
}

impl DatabaseError {
    /// Whether a retry has any chance of succeeding. Unique-violation and
    /// row-missing failures never heal on their own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sqlx(sqlx::Error::RowNotFound) => false,
            Self::Sqlx(sqlx::Error::Database(e)) => {
                !e.is_unique_violation() && !e.is_check_violation() && !e.is_foreign_key_violation()
            }
            Self::Sqlx(_) => true,
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Job(e) => e.kind(),
            Self::Subscription(e) => e.kind(),
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::Invalid(_) => "validation_error",
            Self::Sqlx(_) => "internal_error",
        }
    }
}

impl ResponseError for DatabaseError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Job(e) => e.status_code(),
            Self::Subscription(e) => e.status_code(),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::BAD_REQUEST,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::Sqlx(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[async_trait]
pub trait ModelExt<'q> {
    async fn fetch_by_id<T, E>(pool: E, id: T) -> Result<Option<Self>>
    where
        Self: Sized,
        T: 'q + Encode<'q, Postgres> + Type<Postgres> + Send,
        E: 'q + Executor<'q, Database = Postgres>;

    async fn fetch_all<E>(pool: E, limit: i64, offset: i64) -> Result<Vec<Self>>
    where
        Self: Sized,
        E: 'q + Executor<'q, Database = Postgres>;

    async fn total_count<E>(pool: E) -> Result<usize>
    where
        E: 'q + Executor<'q, Database = Postgres>;
}
