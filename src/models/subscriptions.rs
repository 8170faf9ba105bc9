use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::database::subscription;
use crate::models::dividends::DividendJson;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct SubscriptionJson {
    pub ticker_symbol: String,
    pub priority: i32,
    pub subscribed_at: DateTime<Utc>,
    pub notification_enabled: bool,
    pub auto_update_enabled: bool,
    pub last_dividend_check: Option<DateTime<Utc>>,
}

impl From<subscription::Model> for SubscriptionJson {
    fn from(model: subscription::Model) -> Self {
        Self {
            ticker_symbol: model.ticker_symbol,
            priority: model.priority,
            subscribed_at: model.subscribed_at,
            notification_enabled: model.notification_enabled,
            auto_update_enabled: model.auto_update_enabled,
            last_dividend_check: model.last_dividend_check,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscriptionListResponse {
    pub count: usize,
    pub max_subscriptions: i32,
    pub subscriptions: Vec<SubscriptionJson>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubscribeRequest {
    pub ticker: String,
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubscribeResponse {
    pub message: String,
    pub created: bool,
    pub subscription: SubscriptionJson,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UnsubscribeRequest {
    pub ticker: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BulkSubscriptionRequest {
    /// `subscribe` or `unsubscribe`.
    pub action: String,
    pub tickers: Vec<String>,
    pub priority: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct BulkTickerOutcome {
    pub ticker: String,
    /// `subscribed`, `updated`, `unsubscribed`, `not_subscribed`,
    /// `limit_reached` or `invalid`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BulkSubscriptionResponse {
    pub action: String,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<BulkTickerOutcome>,
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MyDividendsQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MyDividendsResponse {
    pub tickers: Vec<String>,
    pub count: usize,
    pub total: usize,
    pub dividends: Vec<DividendJson>,
}
