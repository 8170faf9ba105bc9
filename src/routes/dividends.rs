use actix_web::{HttpResponse, get, web};

use crate::{
    AppState,
    csv_export,
    database::{DatabaseError, dividend, ticker},
    errors::{ApiError, tickers::TickerError},
    models::dividends::{
        AllDividendsQuery, AllDividendsResponse, DividendCheckResponse, DividendJson,
        TickerDividendsQuery, TickerDividendsResponse,
    },
    routes::tickers::run_ingest,
    utils::validation,
};

pub fn config(cfg: &mut web::ServiceConfig) {
    // `/dividends/all` must be registered ahead of the `{ticker}` matcher.
    cfg.service(dividends_all).service(dividends_by_ticker);
}

/// Dividend history across all tickers
#[utoipa::path(
    get,
    path = "/dividends/all",
    params(AllDividendsQuery),
    responses(
        (status = 200, description = "Dividend records", body = AllDividendsResponse)
    ),
    security(("apiKey" = [])),
)]
#[get("/dividends/all")]
pub async fn dividends_all(
    state: web::Data<AppState>,
    query: web::Query<AllDividendsQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let limit = query.limit.unwrap_or(100);
    let offset = query.offset.unwrap_or(0).max(0);

    let (rows, total) =
        dividend::Model::fetch_range(&state.pool, query.start_date, query.end_date, limit, offset)
            .await?;

    if query.format.as_deref() == Some("csv") {
        return Ok(HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header(("Content-Disposition", csv_export::attachment_name(None)))
            .body(csv_export::all_csv(&rows)));
    }

    Ok(HttpResponse::Ok().json(AllDividendsResponse {
        count: rows.len(),
        total,
        dividends: rows.into_iter().map(DividendJson::from).collect(),
    }))
}

/// Dividend history for one ticker
///
/// Supports date filtering, CSV export, a `checkOnly` freshness probe, and a
/// `fallback` flag that queues a first-time backfill instead of answering
/// 404 for unknown symbols.
#[utoipa::path(
    get,
    path = "/dividends/{ticker}",
    params(
        ("ticker", description = "Ticker symbol, e.g. AAPL"),
        TickerDividendsQuery,
    ),
    responses(
        (status = 200, description = "Dividend records", body = TickerDividendsResponse),
        (status = 404, description = "No dividend data for this ticker"),
    ),
    security(("apiKey" = [])),
)]
#[get("/dividends/{ticker}")]
pub async fn dividends_by_ticker(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<TickerDividendsQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();

    let symbol = path.into_inner().trim().to_uppercase();
    if !validation::is_valid_ticker_symbol(&symbol) {
        return Err(TickerError::InvalidTicker(symbol).into());
    }

    let row = ticker::Model::fetch_by_symbol(&state.pool, &symbol).await?;
    let last_updated = row.as_ref().and_then(|t| t.last_dividend_update);

    if query.check_only.unwrap_or(false) {
        let count = dividend::Model::count_for_ticker(&state.pool, &symbol).await?;

        return Ok(HttpResponse::Ok().json(DividendCheckResponse {
            ticker: symbol,
            has_data: count > 0,
            count,
            last_dividend_update: last_updated,
        }));
    }

    let limit = query.limit.unwrap_or(100);
    let offset = query.offset.unwrap_or(0).max(0);

    let (rows, total) = dividend::Model::fetch_for_ticker(
        &state.pool,
        &symbol,
        query.start_date,
        query.end_date,
        limit,
        offset,
    )
    .await?;

    let mut backfill = None;
    if total == 0 {
        if !query.fallback.unwrap_or(false) {
            return Err(DatabaseError::NotFound("dividend data").into());
        }

        // The read path never waits on the provider; queue the backfill and
        // tell the client it is coming.
        run_ingest(&state, std::slice::from_ref(&symbol), 2, false, "dividends-fallback").await?;
        backfill = Some("queued".to_string());
    }

    if query.format.as_deref() == Some("csv") {
        return Ok(HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header((
                "Content-Disposition",
                csv_export::attachment_name(Some(&symbol)),
            ))
            .body(csv_export::ticker_csv(&rows)));
    }

    Ok(HttpResponse::Ok().json(TickerDividendsResponse {
        ticker: symbol,
        count: rows.len(),
        total,
        last_updated,
        dividends: rows.into_iter().map(DividendJson::from).collect(),
        backfill,
    }))
}
