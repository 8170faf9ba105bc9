use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::database::job::{self, JobStatus, JobType, Progress};

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct JobJson {
    pub id: i64,
    pub job_type: JobType,
    pub status: JobStatus,
    pub ticker_symbols: Vec<String>,
    pub total: i32,
    pub processed: i32,
    pub failed: i32,
    pub priority: i32,
    pub force: bool,
    pub metadata: serde_json::Value,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl From<job::Model> for JobJson {
    fn from(model: job::Model) -> Self {
        Self {
            id: model.id,
            job_type: model.job_type,
            status: model.status,
            ticker_symbols: model.ticker_symbols,
            total: model.total,
            processed: model.processed,
            failed: model.failed,
            priority: model.priority,
            force: model.force,
            metadata: model.metadata,
            error_message: model.error_message,
            created_at: model.created_at,
            started_at: model.started_at,
            completed_at: model.completed_at,
            estimated_completion: model.estimated_completion,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
pub struct JobListQuery {
    pub status: Option<JobStatus>,
    pub job_type: Option<JobType>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobListResponse {
    pub count: usize,
    pub total: usize,
    pub jobs: Vec<JobJson>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct JobStatusResponse {
    pub job: JobJson,
    pub progress: Progress,
    /// Human-readable completion estimate from the remaining queue depth.
    pub eta: String,
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
pub struct CancelJobQuery {
    #[serde(alias = "jobId")]
    pub job_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CancelJobResponse {
    pub message: String,
    pub job: JobJson,
}
