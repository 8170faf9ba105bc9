pub mod auth;
pub mod jobs;
pub mod subscriptions;
pub mod tickers;

use actix_web::{HttpResponse, error::ResponseError, http::StatusCode};

use crate::models::responses::ErrorBody;

/// Top-level error for route handlers. Everything a handler can fail with
/// converts into this so every endpoint shares the same JSON envelope.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] auth::AuthError),

    #[error(transparent)]
    Ticker(#[from] tickers::TickerError),

    #[error(transparent)]
    Job(#[from] jobs::JobError),

    #[error(transparent)]
    Subscription(#[from] subscriptions::SubscriptionError),

    #[error(transparent)]
    Database(#[from] crate::database::DatabaseError),

    #[error(transparent)]
    Fetch(#[from] crate::polygon::FetchError),

    #[error("Invalid JSON payload: {0}")]
    JsonPayload(#[from] actix_web::error::JsonPayloadError),

    #[error("Invalid path parameter: {0}")]
    Path(#[from] actix_web::error::PathError),

    #[error("Route not found")]
    NotFound,
}

impl ApiError {
    /// Stable machine-readable tag for the error envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Auth(auth::AuthError::RateLimited { .. }) => "rate_limited",
            Self::Auth(_) => "auth_error",
            Self::Ticker(_) => "validation_error",
            Self::Job(e) => e.kind(),
            Self::Subscription(e) => e.kind(),
            Self::Database(e) => e.kind(),
            Self::Fetch(crate::polygon::FetchError::RateLimited { .. }) => "rate_limited",
            Self::Fetch(crate::polygon::FetchError::Invalid(_)) => "validation_error",
            Self::Fetch(crate::polygon::FetchError::Store(e)) => e.kind(),
            Self::Fetch(_) => "upstream_error",
            Self::JsonPayload(_) | Self::Path(_) => "validation_error",
            Self::NotFound => "not_found",
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Auth(e) => e.status_code(),
            Self::Ticker(e) => e.status_code(),
            Self::Job(e) => e.status_code(),
            Self::Subscription(e) => e.status_code(),
            Self::Database(e) => e.status_code(),
            Self::Fetch(e) => e.status_code(),
            Self::JsonPayload(_) | Self::Path(_) => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // The 429 variant carries its own headers, let it build the response.
        if let Self::Auth(e @ auth::AuthError::RateLimited { .. }) = self {
            return e.error_response();
        }

        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.kind().to_string(),
            message: Some(self.to_string()),
        })
    }
}
