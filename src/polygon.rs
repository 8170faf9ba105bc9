//! Rate-limited client for the Polygon.io dividends resource.
//!
//! Every outbound call first reserves a slot in the shared service budget
//! (5/minute) and appends a call-log row, success or not. Callers decide
//! what a denied reservation means: request handlers surface 429, the
//! worker stops its batch, the bulk scan sleeps and retries.

use std::time::{Duration as StdDuration, Instant};

use actix_web::{error::ResponseError, http::StatusCode};
use chrono::{Duration, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{Pool, Postgres};

use crate::config::AppConfig;
use crate::database::dividend::NewDividend;
use crate::database::rate_budget::{self, Admission, NewCallLog, POLYGON_SERVICE};
use crate::database::DatabaseError;

const DIVIDENDS_ENDPOINT: &str = "/v3/reference/dividends";

/// Minimum spacing between bulk pages at 5 calls/minute.
pub const CALL_SPACING_MS: u64 = 60_000 / 5;

/// How long to back off after the provider itself answers 429.
const PROVIDER_RETRY_MS: u64 = 60_000;

const REQUEST_TIMEOUT: StdDuration = StdDuration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Upstream call budget exhausted, retry in {wait_ms} ms")]
    RateLimited { wait_ms: i64 },

    #[error("Upstream rejected the provider API key")]
    Unauthorized,

    #[error("Upstream transient failure: {0}")]
    Transient(String),

    #[error("Upstream rejected the request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

impl ResponseError for FetchError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Invalid(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::Transient(_) | Self::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    /// Two years back, six months forward; first-time backfill.
    Historical,
    /// A couple of days back, three months forward; incremental refresh.
    Recent,
}

impl FetchKind {
    pub fn range(self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        match self {
            Self::Historical => (today - Months::new(24), today + Months::new(6)),
            Self::Recent => (today - Duration::days(2), today + Months::new(3)),
        }
    }
}

/// One record as the provider sends it.
#[derive(Debug, Clone, Deserialize)]
pub struct WireDividend {
    pub id: Option<String>,
    pub ticker: Option<String>,
    pub declaration_date: Option<NaiveDate>,
    pub record_date: Option<NaiveDate>,
    pub ex_dividend_date: Option<NaiveDate>,
    pub pay_date: Option<NaiveDate>,
    pub cash_amount: Option<Decimal>,
    pub currency: Option<String>,
    pub frequency: Option<i32>,
    pub dividend_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DividendsPage {
    #[serde(default)]
    results: Vec<WireDividend>,
    next_url: Option<String>,
}

/// Projects a wire record onto the internal model, applying the documented
/// defaults. Validation happens at upsert time; this never drops a record.
pub fn project(symbol: &str, wire: WireDividend) -> NewDividend {
    NewDividend {
        ticker: wire.ticker.unwrap_or_else(|| symbol.to_string()),
        declaration_date: wire.declaration_date,
        record_date: wire.record_date,
        ex_dividend_date: wire.ex_dividend_date,
        pay_date: wire.pay_date,
        amount: wire.cash_amount,
        currency: wire
            .currency
            .map(|c| c.to_uppercase())
            .unwrap_or_else(|| "USD".to_string()),
        frequency: wire.frequency.unwrap_or(4),
        dividend_type: wire.dividend_type.unwrap_or_else(|| "Cash".to_string()),
        polygon_id: wire.id,
        data_source: "polygon".to_string(),
    }
}

#[derive(Clone)]
pub struct PolygonClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl PolygonClient {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            api_key: config.polygon_api_key.clone(),
            base_url: config.polygon_base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetches dividends for one ticker over the kind's default range.
    /// Reserves a budget slot first and fails without contacting the
    /// provider when the budget is exhausted.
    pub async fn fetch_dividends(
        &self,
        pool: &Pool<Postgres>,
        symbol: &str,
        kind: FetchKind,
    ) -> Result<Vec<NewDividend>, FetchError> {
        match rate_budget::Model::check_and_reserve(pool, POLYGON_SERVICE).await? {
            Admission::Admitted => {}
            Admission::RateLimited { wait_ms } => return Err(FetchError::RateLimited { wait_ms }),
        }

        let (start, end) = kind.range(Utc::now().date_naive());
        let url = format!("{}{}", self.base_url, DIVIDENDS_ENDPOINT);
        let request = self.http.get(&url).query(&[
            ("ticker", symbol.to_string()),
            ("ex_dividend_date.gte", start.to_string()),
            ("ex_dividend_date.lte", end.to_string()),
            ("limit", "1000".to_string()),
            ("apiKey", self.api_key.clone()),
        ]);

        let page = self.execute(pool, request, Some(symbol)).await?;

        Ok(page
            .results
            .into_iter()
            .map(|wire| project(symbol, wire))
            .collect())
    }

    /// Ascending scan of recent ex-dividend dates across all tickers.
    /// Pages are spaced by the provider call interval; a provider 429 sleeps
    /// a full minute and retries the same page, a locally exhausted budget
    /// sleeps until the next reset.
    pub async fn fetch_bulk_recent(
        &self,
        pool: &Pool<Postgres>,
        days_back: i64,
        page_size: u32,
    ) -> Result<Vec<NewDividend>, FetchError> {
        let since = Utc::now().date_naive() - Duration::days(days_back);
        let mut out = Vec::new();
        let mut next_url: Option<String> = None;

        loop {
            match rate_budget::Model::check_and_reserve(pool, POLYGON_SERVICE).await? {
                Admission::Admitted => {}
                Admission::RateLimited { wait_ms } => {
                    tokio::time::sleep(StdDuration::from_millis(wait_ms.max(0) as u64)).await;
                    continue;
                }
            }

            let request = match &next_url {
                Some(cursor) => self
                    .http
                    .get(cursor)
                    .query(&[("apiKey", self.api_key.as_str())]),
                None => self
                    .http
                    .get(format!("{}{}", self.base_url, DIVIDENDS_ENDPOINT))
                    .query(&[
                        ("ex_dividend_date.gte", since.to_string()),
                        ("order", "asc".to_string()),
                        ("sort", "ex_dividend_date".to_string()),
                        ("limit", page_size.to_string()),
                        ("apiKey", self.api_key.clone()),
                    ]),
            };

            let page = match self.execute(pool, request, None).await {
                Ok(page) => page,
                Err(FetchError::RateLimited { .. }) => {
                    tracing::warn!("provider returned 429 during bulk scan, sleeping 60s");
                    tokio::time::sleep(StdDuration::from_millis(PROVIDER_RETRY_MS)).await;
                    continue;
                }
                Err(err) => return Err(err),
            };

            out.extend(page.results.into_iter().map(|wire| project("", wire)));

            match page.next_url {
                Some(cursor) => {
                    next_url = Some(cursor);
                    tokio::time::sleep(StdDuration::from_millis(CALL_SPACING_MS)).await;
                }
                None => break,
            }
        }

        Ok(out)
    }

    /// Sends one request, classifies the response, and appends a call-log
    /// row either way. Log failures are reported but never fatal.
    async fn execute(
        &self,
        pool: &Pool<Postgres>,
        request: reqwest::RequestBuilder,
        symbol: Option<&str>,
    ) -> Result<DividendsPage, FetchError> {
        let started = Instant::now();
        let response = request.send().await;
        let elapsed_ms = started.elapsed().as_millis() as i32;

        let mut log = NewCallLog {
            service_name: POLYGON_SERVICE.to_string(),
            endpoint: DIVIDENDS_ENDPOINT.to_string(),
            ticker_symbol: symbol.map(str::to_string),
            response_time_ms: Some(elapsed_ms),
            metadata: serde_json::json!({}),
            ..Default::default()
        };

        let result = match response {
            Err(err) => {
                log.error_message = Some(err.to_string());
                Err(FetchError::Transient(err.to_string()))
            }
            Ok(response) => {
                let status = response.status();
                log.response_status = Some(status.as_u16() as i32);
                log.rate_limit_remaining = response
                    .headers()
                    .get("x-ratelimit-remaining")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());

                match status.as_u16() {
                    200 => response.json::<DividendsPage>().await.map_err(|err| {
                        log.error_message = Some(err.to_string());
                        FetchError::Transient(format!("bad response body: {err}"))
                    }),
                    403 => {
                        log.error_message = Some("provider rejected API key".to_string());
                        Err(FetchError::Unauthorized)
                    }
                    429 => {
                        log.error_message = Some("provider rate limit".to_string());
                        Err(FetchError::RateLimited {
                            wait_ms: PROVIDER_RETRY_MS as i64,
                        })
                    }
                    code if code >= 500 => {
                        let body = response.text().await.unwrap_or_default();
                        log.error_message = Some(format!("HTTP {code}"));
                        Err(FetchError::Transient(format!("HTTP {code}: {body}")))
                    }
                    code => {
                        let body = response.text().await.unwrap_or_default();
                        log.error_message = Some(format!("HTTP {code}"));
                        Err(FetchError::Invalid(format!("HTTP {code}: {body}")))
                    }
                }
            }
        };

        if let Err(err) = rate_budget::record_call(pool, log).await {
            tracing::warn!("failed to append call log: {err}");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::dec;

    use super::*;

    fn wire() -> WireDividend {
        WireDividend {
            id: Some("E8e3c4f794613e9205e2f178a36c53fcc57cdabb55e1988c87b33f9e52e221444".to_string()),
            ticker: Some("AAPL".to_string()),
            declaration_date: NaiveDate::from_ymd_opt(2025, 5, 1),
            record_date: NaiveDate::from_ymd_opt(2025, 5, 12),
            ex_dividend_date: NaiveDate::from_ymd_opt(2025, 5, 12),
            pay_date: NaiveDate::from_ymd_opt(2025, 5, 22),
            cash_amount: Some(dec!(0.26)),
            currency: Some("usd".to_string()),
            frequency: Some(4),
            dividend_type: Some("CD".to_string()),
        }
    }

    #[test]
    fn projection_keeps_provider_fields() {
        let record = project("AAPL", wire());
        assert_eq!(record.ticker, "AAPL");
        assert_eq!(record.amount, Some(dec!(0.26)));
        assert_eq!(record.currency, "USD");
        assert_eq!(record.dividend_type, "CD");
        assert_eq!(record.data_source, "polygon");
        assert!(record.polygon_id.is_some());
    }

    #[test]
    fn projection_applies_defaults() {
        let sparse = WireDividend {
            id: None,
            ticker: None,
            declaration_date: None,
            record_date: None,
            ex_dividend_date: NaiveDate::from_ymd_opt(2025, 5, 12),
            pay_date: None,
            cash_amount: Some(dec!(1.0)),
            currency: None,
            frequency: None,
            dividend_type: None,
        };

        let record = project("MSFT", sparse);
        assert_eq!(record.ticker, "MSFT");
        assert_eq!(record.currency, "USD");
        assert_eq!(record.frequency, 4);
        assert_eq!(record.dividend_type, "Cash");
    }

    #[test]
    fn historical_range_spans_two_years_back() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let (start, end) = FetchKind::Historical.range(today);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 9, 15).unwrap());
    }

    #[test]
    fn recent_range_spans_days_back() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 15).unwrap();
        let (start, end) = FetchKind::Recent.range(today);
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 3, 13).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 6, 15).unwrap());
    }

    #[test]
    fn wire_record_parses_from_provider_json() {
        let raw = r#"{
            "cash_amount": 0.26,
            "currency": "USD",
            "declaration_date": "2025-05-01",
            "dividend_type": "CD",
            "ex_dividend_date": "2025-05-12",
            "frequency": 4,
            "id": "E8e3c4f794613",
            "pay_date": "2025-05-22",
            "record_date": "2025-05-12",
            "ticker": "AAPL"
        }"#;

        let parsed: WireDividend = serde_json::from_str(raw).expect("wire record should parse");
        assert_eq!(parsed.cash_amount, Some(dec!(0.26)));
        assert_eq!(
            parsed.ex_dividend_date,
            NaiveDate::from_ymd_opt(2025, 5, 12)
        );
    }
}
