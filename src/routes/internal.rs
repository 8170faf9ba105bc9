use actix_web::{HttpResponse, post, web};
use uuid::Uuid;

use crate::{AppState, errors::ApiError, worker};

/// Run one worker tick
///
/// Internal trigger for deployments that drive the queue from an external
/// scheduler instead of (or in addition to) the resident worker. The ad-hoc
/// worker id keeps its leases distinct from the resident worker's.
#[utoipa::path(
    post,
    path = "/process-queue",
    responses(
        (status = 200, description = "Tick summary", body = worker::TickSummary)
    )
)]
#[post("/process-queue")]
pub async fn process_queue(state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let worker_id = format!("http-{}", Uuid::new_v4());

    let summary = worker::run_tick(
        &state.pool,
        &state.polygon,
        &worker_id,
        state.config.worker_batch_size,
    )
    .await?;

    Ok(HttpResponse::Ok().json(summary))
}
