use actix_web::{HttpResponse, get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub service: String,
    pub version: String,
    pub git_hash: Option<String>,
}

/// Service health
///
/// Always reachable without an API key.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health_get() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        timestamp: Utc::now(),
        service: "divvy".to_string(),
        version: crate::build_info::PKG_VERSION.to_string(),
        git_hash: crate::build_info::GIT_COMMIT_HASH.map(|s| s.to_string()),
    })
}
