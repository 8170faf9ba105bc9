use actix_web::{error::ResponseError, http::StatusCode};

#[derive(Debug, Clone, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Not subscribed to '{0}'")]
    NotSubscribed(String),

    #[error("Subscription limit reached, limit={limit}, current={current}")]
    LimitReached { limit: i64, current: i64 },

    #[error("action must be either 'subscribe' or 'unsubscribe', got '{0}'")]
    InvalidAction(String),

    #[error("priority must be 1 or 2, got {0}")]
    InvalidPriority(i32),
}

impl SubscriptionError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotSubscribed(_) => "not_found",
            Self::LimitReached { .. } => "conflict",
            Self::InvalidAction(_) | Self::InvalidPriority(_) => "validation_error",
        }
    }
}

impl ResponseError for SubscriptionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotSubscribed(_) => StatusCode::NOT_FOUND,
            Self::LimitReached { .. } => StatusCode::BAD_REQUEST,
            Self::InvalidAction(_) | Self::InvalidPriority(_) => StatusCode::BAD_REQUEST,
        }
    }
}
