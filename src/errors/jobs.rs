use actix_web::{error::ResponseError, http::StatusCode};

use crate::database::job::JobStatus;

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobError {
    #[error("Could not find job with ID '{0}'")]
    NotFound(i64),

    #[error("jobId query parameter is required")]
    MissingJobId,

    #[error("Job {id} is {status:?} and can only be cancelled while pending")]
    NotCancellable { id: i64, status: JobStatus },
}

impl JobError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::MissingJobId => "validation_error",
            Self::NotCancellable { .. } => "conflict",
        }
    }
}

impl ResponseError for JobError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::MissingJobId => StatusCode::BAD_REQUEST,
            Self::NotCancellable { .. } => StatusCode::BAD_REQUEST,
        }
    }
}
