//! API-key authentication and per-key rate limiting for the public surface.
//!
//! Keys arrive via `X-API-Key` or `Authorization: Bearer`. Each key gets a
//! sliding one-hour window of request timestamps held in process memory; in
//! a multi-instance deployment the window is per instance and the
//! imprecision is accepted.

use std::future::{Ready, ready};

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::header::HeaderValue;
use actix_web::middleware::Next;
use actix_web::{FromRequest, HttpMessage, HttpRequest, web};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use utoipa::openapi::security::{ApiKey, ApiKeyValue, SecurityScheme};

use crate::{
    AppState, database::api_user, errors::auth::AuthError, utils::validation,
};

/// Default hourly request allowance for keys without a configured limit.
pub const DEFAULT_RATE_LIMIT: i64 = 100;

const WINDOW: TimeDelta = TimeDelta::hours(1);

/// Per-key request timestamps for the sliding window.
#[derive(Debug, Clone, Default)]
pub struct RateWindows {
    windows: DashMap<String, Vec<DateTime<Utc>>>,
}

/// What the limiter decided for an admitted request; echoed back in the
/// response headers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateStatus {
    pub limit: i64,
    pub remaining: i64,
}

impl RateWindows {
    /// Admits or rejects one request for `key` at `now`. The DashMap entry
    /// guard serializes concurrent requests on the same key.
    pub fn admit(
        &self,
        key: &str,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<RateStatus, AuthError> {
        let mut window = self.windows.entry(key.to_string()).or_default();

        let cutoff = now - WINDOW;
        window.retain(|t| *t > cutoff);

        if window.len() as i64 >= limit {
            let oldest = window.iter().min().copied().unwrap_or(now);
            return Err(AuthError::RateLimited {
                limit,
                reset: oldest + WINDOW,
            });
        }

        window.push(now);

        Ok(RateStatus {
            limit,
            remaining: limit - window.len() as i64,
        })
    }

    /// Drops windows that have gone fully stale.
    pub fn vacuum(&self) {
        let cutoff = Utc::now() - WINDOW;

        self.windows.retain(|_, window| {
            window.retain(|t| *t > cutoff);
            !window.is_empty()
        });
    }
}

/// The caller a request authenticated as. The operator key has no account
/// row, so anything user-scoped must go through [`AuthedUser::account_id`].
#[derive(Debug, Clone)]
pub struct AuthedUser {
    pub user_id: Option<i32>,
    pub name: String,
    pub max_subscriptions: i32,
    pub rate: RateStatus,
}

impl AuthedUser {
    pub fn account_id(&self) -> Result<i32, AuthError> {
        self.user_id.ok_or(AuthError::AccountRequired)
    }
}

impl FromRequest for AuthedUser {
    type Error = AuthError;
    type Future = Ready<Result<Self, AuthError>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthedUser>()
                .cloned()
                .ok_or(AuthError::MissingKey),
        )
    }
}

fn extract_key(req: &ServiceRequest, bearer: Option<&BearerAuth>) -> Result<String, AuthError> {
    if let Some(value) = req.headers().get("X-API-Key") {
        let key = value.to_str().map_err(|_| AuthError::MalformedKey)?;
        return Ok(key.trim().to_string());
    }

    match bearer {
        Some(cred) => Ok(cred.token().trim().to_string()),
        None => Err(AuthError::MissingKey),
    }
}

/// Authenticates a request and applies the per-key window. Returns the
/// caller identity plus the rate headers to attach to the response.
pub async fn authenticate(
    state: &AppState,
    req: &ServiceRequest,
    bearer: Option<&BearerAuth>,
) -> Result<AuthedUser, AuthError> {
    let key = extract_key(req, bearer)?;

    if !validation::is_valid_api_key_format(&key) {
        return Err(AuthError::MalformedKey);
    }

    if state.config.ticker_api_key.as_deref() == Some(key.as_str()) {
        let rate = state
            .rate_windows
            .admit(&key, DEFAULT_RATE_LIMIT, Utc::now())?;

        return Ok(AuthedUser {
            user_id: None,
            name: "operator".to_string(),
            max_subscriptions: 0,
            rate,
        });
    }

    let user = api_user::Model::fetch_by_key(&state.pool, &key)
        .await
        .map_err(|err| {
            tracing::error!("api key lookup failed: {err}");
            AuthError::UnknownKey
        })?
        .ok_or(AuthError::UnknownKey)?;

    let rate = state
        .rate_windows
        .admit(&key, user.rate_limit.max(1) as i64, Utc::now())?;

    Ok(AuthedUser {
        user_id: Some(user.id),
        name: user.user_name.unwrap_or_else(|| format!("user-{}", user.id)),
        max_subscriptions: user.max_subscriptions,
        rate,
    })
}

/// Middleware for the authenticated scope: resolves the key, stores the
/// caller in request extensions, and stamps the rate headers on the way out.
pub async fn require_api_key(
    req: ServiceRequest,
    next: Next<impl MessageBody>,
) -> Result<ServiceResponse<impl MessageBody>, actix_web::Error> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("missing app state"))?;

    let bearer = BearerAuth::extract(req.request()).await.ok();

    let user = authenticate(&state, &req, bearer.as_ref()).await?;
    let rate = user.rate;

    req.extensions_mut().insert(user);

    let mut res = next.call(req).await?;

    let headers = res.headers_mut();
    headers.insert(
        actix_web::http::header::HeaderName::from_static("x-ratelimit-limit"),
        HeaderValue::from(rate.limit),
    );
    headers.insert(
        actix_web::http::header::HeaderName::from_static("x-ratelimit-remaining"),
        HeaderValue::from(rate.remaining),
    );

    Ok(res)
}

pub struct AuthAddon;

impl utoipa::Modify for AuthAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "apiKey",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::new("X-API-Key"))),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_up_to_limit_then_rejects() {
        let windows = RateWindows::default();
        let now = Utc::now();

        for i in 0..3 {
            let status = windows
                .admit("tk_test_key", 3, now)
                .unwrap_or_else(|_| panic!("request {i} should be admitted"));
            assert_eq!(status.remaining, 2 - i);
        }

        let err = windows.admit("tk_test_key", 3, now).unwrap_err();
        match err {
            AuthError::RateLimited { limit, reset } => {
                assert_eq!(limit, 3);
                assert_eq!(reset, now + TimeDelta::hours(1));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn window_slides_after_an_hour() {
        let windows = RateWindows::default();
        let start = Utc::now();

        assert!(windows.admit("tk_slides", 1, start).is_ok());
        assert!(windows.admit("tk_slides", 1, start).is_err());

        let later = start + TimeDelta::minutes(61);
        assert!(windows.admit("tk_slides", 1, later).is_ok());
    }

    #[test]
    fn keys_have_independent_windows() {
        let windows = RateWindows::default();
        let now = Utc::now();

        assert!(windows.admit("tk_first_", 1, now).is_ok());
        assert!(windows.admit("tk_second", 1, now).is_ok());
        assert!(windows.admit("tk_first_", 1, now).is_err());
    }

    #[test]
    fn vacuum_drops_stale_windows() {
        let windows = RateWindows::default();
        let old = Utc::now() - TimeDelta::hours(2);

        assert!(windows.admit("tk_stale_", 5, old).is_ok());
        windows.vacuum();
        assert!(windows.windows.is_empty());
    }
}
