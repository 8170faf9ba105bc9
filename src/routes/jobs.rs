use actix_web::{HttpResponse, delete, get, web};

use crate::{
    AppState,
    database::job,
    errors::{ApiError, jobs::JobError},
    models::jobs::{
        CancelJobQuery, CancelJobResponse, JobJson, JobListQuery, JobListResponse,
        JobStatusResponse,
    },
};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(job_list).service(job_status).service(job_cancel);
}

/// List jobs
#[utoipa::path(
    get,
    path = "/jobs",
    params(JobListQuery),
    responses(
        (status = 200, description = "Jobs matching the filters", body = JobListResponse)
    ),
    security(("apiKey" = [])),
)]
#[get("/jobs")]
pub async fn job_list(
    state: web::Data<AppState>,
    query: web::Query<JobListQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();

    let filter = job::ListFilter {
        status: query.status,
        job_type: query.job_type,
        limit: query.limit,
        offset: query.offset,
        sort: query.sort,
        order: query.order,
    };

    let (jobs, total) = job::Model::list(&state.pool, &filter).await?;

    Ok(HttpResponse::Ok().json(JobListResponse {
        count: jobs.len(),
        total,
        jobs: jobs.into_iter().map(JobJson::from).collect(),
    }))
}

/// Job progress
///
/// Counters come from the job row, queue depth from the live queue; the ETA
/// assumes one provider call per remaining item.
#[utoipa::path(
    get,
    path = "/job-status/{jobId}",
    params(("jobId", description = "Job ID")),
    responses(
        (status = 200, description = "Progress report", body = JobStatusResponse),
        (status = 404, description = "Unknown job"),
    ),
    security(("apiKey" = [])),
)]
#[get("/job-status/{job_id}")]
pub async fn job_status(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();

    let (job, progress) = job::Model::progress(&state.pool, id).await?;
    let eta = job::estimate_eta(progress.remaining);

    Ok(HttpResponse::Ok().json(JobStatusResponse {
        job: job.into(),
        progress,
        eta,
    }))
}

/// Cancel a pending job
///
/// Only jobs that have not started are cancellable; cancelling drops every
/// queued item so the worker never picks them up.
#[utoipa::path(
    delete,
    path = "/jobs",
    params(CancelJobQuery),
    responses(
        (status = 200, description = "Job cancelled", body = CancelJobResponse),
        (status = 400, description = "Job already started or finished"),
        (status = 404, description = "Unknown job"),
    ),
    security(("apiKey" = [])),
)]
#[delete("/jobs")]
pub async fn job_cancel(
    state: web::Data<AppState>,
    query: web::Query<CancelJobQuery>,
) -> Result<HttpResponse, ApiError> {
    let id = query.into_inner().job_id.ok_or(JobError::MissingJobId)?;

    let job = job::Model::cancel(&state.pool, id).await?;

    Ok(HttpResponse::Ok().json(CancelJobResponse {
        message: format!("Job {id} cancelled"),
        job: job.into(),
    }))
}
