use actix_web::{HttpResponse, post, web};
use chrono::Utc;
use uuid::Uuid;

use crate::{
    AppState,
    database::{dividend, job, queue, ticker},
    errors::{ApiError, tickers::TickerError},
    fast_queue::{DispatchOutcome, FastQueueMessage},
    models::tickers::{
        ProcessRequest, ProcessResponse, ProcessingAccepted, TickerRouting, UpdateTickersRequest,
        UpdateTickersResponse,
    },
    polygon::FetchKind,
    routing::{self, Lane},
    utils::validation,
    worker::WorkNotif,
};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(update_tickers).service(process_single);
}

/// How the symbols of one ingest request were distributed over the lanes.
#[derive(Debug)]
pub struct IngestOutcome {
    pub routing: Vec<TickerRouting>,
    pub job: Option<job::Model>,
    pub fast_queue: Option<DispatchOutcome>,
    pub new_tickers: usize,
    pub existing_tickers: usize,
}

/// The ingestion core shared by `/update-tickers`, subscriptions, and the
/// read-path fallback. Routes every symbol (before upserting it, so a
/// first-time symbol still reads as new), dispatches the fast lane, creates
/// the standard-lane job, and nudges the worker.
pub async fn run_ingest(
    state: &AppState,
    symbols: &[String],
    priority: i32,
    force: bool,
    source: &str,
) -> Result<IngestOutcome, ApiError> {
    let now = Utc::now();

    let mut routing = Vec::with_capacity(symbols.len());
    let mut fast_symbols = Vec::new();
    let mut bulk_symbols = Vec::new();

    for symbol in symbols {
        let decision = routing::route_ticker(&state.pool, symbol, now).await;

        routing.push(TickerRouting {
            ticker: symbol.clone(),
            lane: decision.lane,
            reason: decision.reason,
        });

        match decision.lane {
            Lane::Fast => fast_symbols.push(symbol.clone()),
            Lane::Bulk => bulk_symbols.push(symbol.clone()),
        }
    }

    // Registration happens after routing on purpose; see the routing module.
    for symbol in symbols {
        ticker::Model::upsert(&state.pool, symbol).await?;
    }

    let new_tickers = fast_symbols.len();
    let existing_tickers = bulk_symbols.len();

    let fast_queue = if fast_symbols.is_empty() {
        None
    } else {
        let message = FastQueueMessage::backfill(fast_symbols.clone(), force);
        let outcome = state.fast_queue.dispatch(&message).await;

        if !outcome.delivered() {
            // Fall back to the standard lane rather than dropping a backfill.
            bulk_symbols.extend(fast_symbols);
        }

        Some(outcome)
    };

    let job = if bulk_symbols.is_empty() {
        None
    } else {
        let model = job::Model::create(
            &state.pool,
            job::JobType::DividendUpdate,
            &bulk_symbols,
            priority,
            force,
            serde_json::json!({ "source": source }),
        )
        .await?;

        queue::Model::enqueue(&state.pool, model.id, &bulk_symbols, priority).await?;

        Some(model)
    };

    if job.is_some() {
        let _ = state.worker_tx.try_send(WorkNotif);
    }

    Ok(IngestOutcome {
        routing,
        job,
        fast_queue,
        new_tickers,
        existing_tickers,
    })
}

/// Queue dividend updates
///
/// Routes each submitted symbol to the fast backfill lane or the standard
/// refresh queue. Requests with `fast=true` or more than 20 symbols are
/// acknowledged immediately and processed in the background.
#[utoipa::path(
    post,
    path = "/update-tickers",
    request_body = UpdateTickersRequest,
    responses(
        (status = 202, description = "Work accepted", body = UpdateTickersResponse),
        (status = 400, description = "No usable ticker symbols in the request"),
    ),
    security(("apiKey" = [])),
)]
#[post("/update-tickers")]
pub async fn update_tickers(
    state: web::Data<AppState>,
    body: web::Json<UpdateTickersRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();

    if body.tickers.is_empty() {
        return Err(TickerError::EmptyTickers.into());
    }
    if body.tickers.len() > 100 {
        return Err(TickerError::TooManyTickers(body.tickers.len()).into());
    }

    let valid = validation::normalize_tickers(&body.tickers);
    if valid.is_empty() {
        return Err(TickerError::NoValidTickers.into());
    }

    let invalid_tickers = body.tickers.len() - valid.len();
    let priority = body.priority.unwrap_or(1).clamp(1, 10);
    let force = body.force.unwrap_or(false);
    let fast_mode = body.fast.unwrap_or(false) || valid.len() > 20;

    if fast_mode {
        let processing_id = Uuid::new_v4();
        let background_state = state.clone();
        let background_symbols = valid.clone();

        tokio::spawn(async move {
            match run_ingest(&background_state, &background_symbols, priority, force, "update-tickers").await {
                Ok(outcome) => tracing::info!(
                    %processing_id,
                    new = outcome.new_tickers,
                    existing = outcome.existing_tickers,
                    "background ingest finished"
                ),
                Err(err) => tracing::error!(%processing_id, "background ingest failed: {err}"),
            }
        });

        return Ok(HttpResponse::Accepted().json(ProcessingAccepted {
            processing_id,
            status: "accepted".to_string(),
            tickers_received: valid.len(),
        }));
    }

    let outcome = run_ingest(&state, &valid, priority, force, "update-tickers").await?;

    Ok(HttpResponse::Accepted().json(UpdateTickersResponse {
        message: format!(
            "{} ticker(s) routed, {} new, {} existing",
            valid.len(),
            outcome.new_tickers,
            outcome.existing_tickers
        ),
        job: outcome.job.map(Into::into),
        fast_queue: outcome.fast_queue,
        routing: outcome.routing,
        new_tickers: outcome.new_tickers,
        existing_tickers: outcome.existing_tickers,
        invalid_tickers,
    }))
}

/// Fetch one ticker synchronously
///
/// Bypasses the queue: respects the freshness check (unless forced), calls
/// the provider under the shared budget, and upserts the results inline.
#[utoipa::path(
    post,
    path = "/process",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Fetch outcome", body = ProcessResponse),
        (status = 429, description = "Upstream call budget exhausted"),
    ),
    security(("apiKey" = [])),
)]
#[post("/process")]
pub async fn process_single(
    state: web::Data<AppState>,
    body: web::Json<ProcessRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();

    let symbol = body.ticker.trim().to_uppercase();
    if !validation::is_valid_ticker_symbol(&symbol) {
        return Err(TickerError::InvalidTicker(body.ticker).into());
    }

    let kind = match body.fetch_type.as_deref() {
        None | Some("historical") => FetchKind::Historical,
        Some("recent") => FetchKind::Recent,
        Some(other) => return Err(TickerError::InvalidFetchType(other.to_string()).into()),
    };

    let force = body.force.unwrap_or(false);

    ticker::Model::upsert(&state.pool, &symbol).await?;

    if !force
        && let Some(row) = ticker::Model::fetch_by_symbol(&state.pool, &symbol).await?
        && !row.needs_update(Utc::now())
    {
        return Ok(HttpResponse::Ok().json(ProcessResponse {
            ticker: symbol,
            fetched: 0,
            summary: Default::default(),
            skipped: true,
            message: "ticker is fresh, no update needed".to_string(),
        }));
    }

    let records = state.polygon.fetch_dividends(&state.pool, &symbol, kind).await?;
    let fetched = records.len();

    let summary = dividend::Model::upsert_batch(&state.pool, &records).await?;
    ticker::Model::mark_updated(&state.pool, &symbol, Utc::now()).await?;

    Ok(HttpResponse::Ok().json(ProcessResponse {
        message: format!("{} record(s) upserted for {symbol}", summary.inserted),
        ticker: symbol,
        fetched,
        summary,
        skipped: false,
    }))
}
