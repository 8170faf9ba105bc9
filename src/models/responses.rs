use serde::Serialize;
use utoipa::ToSchema;

/// The common error envelope every endpoint shares.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Machine-readable tag, e.g. `validation_error` or `rate_limited`.
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}
