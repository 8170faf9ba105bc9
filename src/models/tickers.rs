use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::database::dividend::UpsertSummary;
use crate::fast_queue::DispatchOutcome;
use crate::models::jobs::JobJson;
use crate::routing::{Lane, Reason};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateTickersRequest {
    pub tickers: Vec<String>,
    pub priority: Option<i32>,
    pub force: Option<bool>,
    /// Respond 202 immediately and run routing/enqueue in the background.
    /// Implied for requests with more than 20 tickers.
    pub fast: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct TickerRouting {
    pub ticker: String,
    pub lane: Lane,
    pub reason: Reason,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UpdateTickersResponse {
    pub message: String,
    /// The standard-lane job, when any symbol routed to bulk refresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job: Option<JobJson>,
    /// Outcome of the fast-lane dispatch, when any symbol routed there.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fast_queue: Option<DispatchOutcome>,
    pub routing: Vec<TickerRouting>,
    pub new_tickers: usize,
    pub existing_tickers: usize,
    pub invalid_tickers: usize,
}

/// Acknowledgement for fast-mode requests processed in the background.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProcessingAccepted {
    pub processing_id: Uuid,
    pub status: String,
    pub tickers_received: usize,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRequest {
    pub ticker: String,
    pub force: Option<bool>,
    /// `historical` (default) or `recent`.
    pub fetch_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProcessResponse {
    pub ticker: String,
    pub fetched: usize,
    pub summary: UpsertSummary,
    /// True when the freshness check short-circuited the provider call.
    pub skipped: bool,
    pub message: String,
}
