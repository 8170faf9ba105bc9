use actix_web::{HttpResponse, error::ResponseError, http::StatusCode, http::header::HeaderValue};
use chrono::{DateTime, Utc};

use crate::models::responses::ErrorBody;

#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("Missing API key, pass it via X-API-Key or Authorization: Bearer")]
    MissingKey,

    #[error("API key is malformed, expected tk_ followed by at least 6 characters")]
    MalformedKey,

    #[error("API key does not exist or has been disabled")]
    UnknownKey,

    #[error("This endpoint requires a registered user key, not the operator key")]
    AccountRequired,

    #[error("API rate limit of {limit} requests per hour exceeded")]
    RateLimited { limit: i64, reset: DateTime<Utc> },
}

impl ResponseError for AuthError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());

        if let Self::RateLimited { limit, reset } = self {
            builder.insert_header(("X-RateLimit-Limit", HeaderValue::from(*limit)));
            builder.insert_header(("X-RateLimit-Remaining", HeaderValue::from(0)));
            builder.insert_header(("X-RateLimit-Reset", reset.to_rfc3339()));
        }

        builder.json(ErrorBody {
            error: match self {
                Self::RateLimited { .. } => "rate_limited".to_string(),
                _ => "auth_error".to_string(),
            },
            message: Some(self.to_string()),
        })
    }
}
