use actix_web::{HttpResponse, delete, get, post, web};

use crate::{
    AppState,
    auth::AuthedUser,
    csv_export,
    database::{DatabaseError, dividend, subscription},
    errors::{ApiError, subscriptions::SubscriptionError, tickers::TickerError},
    models::subscriptions::{
        BulkSubscriptionRequest, BulkSubscriptionResponse, BulkTickerOutcome, MyDividendsQuery,
        MyDividendsResponse, SubscribeRequest, SubscribeResponse, SubscriptionJson,
        SubscriptionListResponse, UnsubscribeRequest,
    },
    models::dividends::DividendJson,
    routes::tickers::run_ingest,
    utils::validation,
};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(subscription_list)
        .service(subscription_bulk)
        .service(subscription_create)
        .service(subscription_delete)
        .service(my_dividends);
}

fn validate_priority(priority: Option<i32>) -> Result<i32, SubscriptionError> {
    match priority {
        None => Ok(1),
        Some(p @ 1..=2) => Ok(p),
        Some(other) => Err(SubscriptionError::InvalidPriority(other)),
    }
}

/// List the caller's subscriptions
#[utoipa::path(
    get,
    path = "/subscriptions",
    responses(
        (status = 200, description = "Current subscriptions", body = SubscriptionListResponse)
    ),
    security(("apiKey" = [])),
)]
#[get("/subscriptions")]
pub async fn subscription_list(
    state: web::Data<AppState>,
    user: AuthedUser,
) -> Result<HttpResponse, ApiError> {
    let user_id = user.account_id()?;

    let subs = subscription::Model::list_for_user(&state.pool, user_id).await?;

    Ok(HttpResponse::Ok().json(SubscriptionListResponse {
        count: subs.len(),
        max_subscriptions: user.max_subscriptions,
        subscriptions: subs.into_iter().map(SubscriptionJson::from).collect(),
    }))
}

/// Subscribe to a ticker
///
/// A first-time subscription queues a historical backfill through the fast
/// lane; the request never waits for it.
#[utoipa::path(
    post,
    path = "/subscriptions",
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Subscription created or updated", body = SubscribeResponse),
        (status = 400, description = "Invalid ticker/priority or subscription limit reached"),
    ),
    security(("apiKey" = [])),
)]
#[post("/subscriptions")]
pub async fn subscription_create(
    state: web::Data<AppState>,
    user: AuthedUser,
    body: web::Json<SubscribeRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let user_id = user.account_id()?;

    let symbol = body.ticker.trim().to_uppercase();
    if !validation::is_valid_ticker_symbol(&symbol) {
        return Err(TickerError::InvalidTicker(body.ticker).into());
    }
    let priority = validate_priority(body.priority)?;

    let result = subscription::Model::subscribe(
        &state.pool,
        user_id,
        user.max_subscriptions,
        &symbol,
        priority,
    )
    .await?;

    let action = if result.created { "subscribe" } else { "update" };
    subscription::log_activity(
        &state.pool,
        user_id,
        Some(&symbol),
        action,
        serde_json::json!({ "priority": priority }),
    )
    .await?;

    if result.created {
        run_ingest(&state, std::slice::from_ref(&symbol), priority, false, "subscription").await?;
    }

    Ok(HttpResponse::Ok().json(SubscribeResponse {
        message: if result.created {
            format!("Subscribed to {symbol}, backfill queued")
        } else {
            format!("Subscription to {symbol} updated")
        },
        created: result.created,
        subscription: result.subscription.into(),
    }))
}

/// Unsubscribe from a ticker
#[utoipa::path(
    delete,
    path = "/subscriptions",
    request_body = UnsubscribeRequest,
    responses(
        (status = 200, description = "Subscription removed"),
        (status = 404, description = "Not subscribed to this ticker"),
    ),
    security(("apiKey" = [])),
)]
#[delete("/subscriptions")]
pub async fn subscription_delete(
    state: web::Data<AppState>,
    user: AuthedUser,
    body: web::Json<UnsubscribeRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let user_id = user.account_id()?;

    let symbol = body.ticker.trim().to_uppercase();

    let removed = subscription::Model::unsubscribe(&state.pool, user_id, &symbol).await?;
    if !removed {
        return Err(SubscriptionError::NotSubscribed(symbol).into());
    }

    subscription::log_activity(
        &state.pool,
        user_id,
        Some(&symbol),
        "unsubscribe",
        serde_json::json!({}),
    )
    .await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": format!("Unsubscribed from {symbol}")
    })))
}

/// Bulk subscribe or unsubscribe
///
/// Applies the action per ticker and reports each outcome; one bad symbol or
/// a reached cap never aborts the rest of the batch.
#[utoipa::path(
    post,
    path = "/subscriptions/bulk",
    request_body = BulkSubscriptionRequest,
    responses(
        (status = 200, description = "Per-ticker outcomes", body = BulkSubscriptionResponse),
        (status = 400, description = "Unknown action"),
    ),
    security(("apiKey" = [])),
)]
#[post("/subscriptions/bulk")]
pub async fn subscription_bulk(
    state: web::Data<AppState>,
    user: AuthedUser,
    body: web::Json<BulkSubscriptionRequest>,
) -> Result<HttpResponse, ApiError> {
    let body = body.into_inner();
    let user_id = user.account_id()?;

    if body.action != "subscribe" && body.action != "unsubscribe" {
        return Err(SubscriptionError::InvalidAction(body.action).into());
    }
    if body.tickers.is_empty() {
        return Err(TickerError::EmptyTickers.into());
    }
    if body.tickers.len() > 100 {
        return Err(TickerError::TooManyTickers(body.tickers.len()).into());
    }
    let priority = validate_priority(body.priority)?;

    let mut results = Vec::with_capacity(body.tickers.len());
    let mut backfill = Vec::new();

    for raw in &body.tickers {
        let symbol = raw.trim().to_uppercase();
        if !validation::is_valid_ticker_symbol(&symbol) {
            results.push(BulkTickerOutcome {
                ticker: raw.clone(),
                status: "invalid".to_string(),
                message: Some("not a valid ticker symbol".to_string()),
            });
            continue;
        }

        if body.action == "subscribe" {
            match subscription::Model::subscribe(
                &state.pool,
                user_id,
                user.max_subscriptions,
                &symbol,
                priority,
            )
            .await
            {
                Ok(outcome) => {
                    if outcome.created {
                        backfill.push(symbol.clone());
                    }
                    results.push(BulkTickerOutcome {
                        ticker: symbol,
                        status: if outcome.created {
                            "subscribed".to_string()
                        } else {
                            "updated".to_string()
                        },
                        message: None,
                    });
                }
                Err(DatabaseError::Subscription(err @ SubscriptionError::LimitReached { .. })) => {
                    results.push(BulkTickerOutcome {
                        ticker: symbol,
                        status: "limit_reached".to_string(),
                        message: Some(err.to_string()),
                    });
                }
                Err(err) => return Err(err.into()),
            }
        } else {
            let removed = subscription::Model::unsubscribe(&state.pool, user_id, &symbol).await?;
            results.push(BulkTickerOutcome {
                ticker: symbol,
                status: if removed {
                    "unsubscribed".to_string()
                } else {
                    "not_subscribed".to_string()
                },
                message: None,
            });
        }
    }

    subscription::log_activity(
        &state.pool,
        user_id,
        None,
        &format!("bulk_{}", body.action),
        serde_json::json!({
            "tickers": body.tickers,
            "results": results.iter().filter(|r| r.message.is_none()).count(),
        }),
    )
    .await?;

    if !backfill.is_empty() {
        run_ingest(&state, &backfill, priority, false, "subscription-bulk").await?;
    }

    let succeeded = results
        .iter()
        .filter(|r| matches!(r.status.as_str(), "subscribed" | "updated" | "unsubscribed"))
        .count();

    Ok(HttpResponse::Ok().json(BulkSubscriptionResponse {
        action: body.action,
        succeeded,
        failed: results.len() - succeeded,
        results,
    }))
}

/// Dividends across the caller's subscriptions
#[utoipa::path(
    get,
    path = "/my-dividends",
    params(MyDividendsQuery),
    responses(
        (status = 200, description = "Dividend records for subscribed tickers", body = MyDividendsResponse)
    ),
    security(("apiKey" = [])),
)]
#[get("/my-dividends")]
pub async fn my_dividends(
    state: web::Data<AppState>,
    user: AuthedUser,
    query: web::Query<MyDividendsQuery>,
) -> Result<HttpResponse, ApiError> {
    let query = query.into_inner();
    let user_id = user.account_id()?;

    let tickers = subscription::Model::ticker_symbols_for_user(&state.pool, user_id).await?;

    let limit = query.limit.unwrap_or(100);
    let offset = query.offset.unwrap_or(0).max(0);

    let (rows, total) = dividend::Model::fetch_for_tickers(
        &state.pool,
        &tickers,
        query.start_date,
        query.end_date,
        limit,
        offset,
    )
    .await?;

    if query.format.as_deref() == Some("csv") {
        return Ok(HttpResponse::Ok()
            .content_type("text/csv; charset=utf-8")
            .insert_header(("Content-Disposition", csv_export::attachment_name(None)))
            .body(csv_export::all_csv(&rows)));
    }

    Ok(HttpResponse::Ok().json(MyDividendsResponse {
        tickers,
        count: rows.len(),
        total,
        dividends: rows.into_iter().map(DividendJson::from).collect(),
    }))
}
