use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::database::dividend;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct DividendJson {
    pub ticker: String,
    pub declaration_date: Option<NaiveDate>,
    pub record_date: Option<NaiveDate>,
    pub ex_dividend_date: NaiveDate,
    pub pay_date: Option<NaiveDate>,
    pub amount: Decimal,
    pub currency: String,
    pub frequency: i32,
    pub dividend_type: String,
    pub data_source: String,
    pub updated_at: DateTime<Utc>,
}

impl From<dividend::Model> for DividendJson {
    fn from(model: dividend::Model) -> Self {
        Self {
            ticker: model.ticker,
            declaration_date: model.declaration_date,
            record_date: model.record_date,
            ex_dividend_date: model.ex_dividend_date,
            pay_date: model.pay_date,
            amount: model.amount,
            currency: model.currency,
            frequency: model.frequency,
            dividend_type: model.dividend_type,
            data_source: model.data_source,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TickerDividendsQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// `csv` switches the response to a file download.
    pub format: Option<String>,
    /// Freshness probe: respond with counts only, no records.
    pub check_only: Option<bool>,
    /// Unused filter kept for client compatibility; the update timestamp is
    /// always included in the JSON response.
    pub last_updated: Option<bool>,
    /// When the ticker has no stored data, enqueue a fast backfill instead
    /// of returning 404.
    pub fallback: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Default, Clone, Deserialize, IntoParams, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AllDividendsQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TickerDividendsResponse {
    pub ticker: String,
    pub count: usize,
    pub total: usize,
    pub last_updated: Option<DateTime<Utc>>,
    pub dividends: Vec<DividendJson>,
    /// Present when a `fallback` request queued a first-time backfill.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backfill: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DividendCheckResponse {
    pub ticker: String,
    pub has_data: bool,
    pub count: usize,
    pub last_dividend_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AllDividendsResponse {
    pub count: usize,
    pub total: usize,
    pub dividends: Vec<DividendJson>,
}
