use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use sqlx::postgres::PgPool;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use divvy::{AppState, auth::AuthAddon, config::AppConfig, fast_queue::FastQueue, polygon::PolygonClient, routes, worker};

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;

    let pool = PgPool::connect(&config.database_url).await?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations completed successfully");

    let polygon = PolygonClient::new(&config)?;
    let fast_queue = FastQueue::new(&config)?;

    let worker_tx =
        worker::new_worker_pool(pool.clone(), polygon.clone(), config.worker_batch_size);

    let server_url = config.server_url.clone();

    let state = web::Data::new(AppState {
        pool,
        config,
        rate_windows: Default::default(),
        polygon,
        fast_queue,
        worker_tx,
    });

    #[derive(OpenApi)]
    #[openapi(
        paths(
            routes::health::health_get,
            routes::dividends::dividends_by_ticker,
            routes::dividends::dividends_all,
            routes::tickers::update_tickers,
            routes::tickers::process_single,
            routes::jobs::job_list,
            routes::jobs::job_status,
            routes::jobs::job_cancel,
            routes::internal::process_queue,
            routes::subscriptions::subscription_list,
            routes::subscriptions::subscription_create,
            routes::subscriptions::subscription_delete,
            routes::subscriptions::subscription_bulk,
            routes::subscriptions::my_dividends,
        ),
        components(schemas(
            divvy::models::responses::ErrorBody,
            divvy::models::dividends::DividendJson,
            divvy::models::dividends::TickerDividendsResponse,
            divvy::models::dividends::DividendCheckResponse,
            divvy::models::dividends::AllDividendsResponse,
            divvy::models::tickers::UpdateTickersRequest,
            divvy::models::tickers::UpdateTickersResponse,
            divvy::models::tickers::TickerRouting,
            divvy::models::tickers::ProcessingAccepted,
            divvy::models::tickers::ProcessRequest,
            divvy::models::tickers::ProcessResponse,
            divvy::models::jobs::JobJson,
            divvy::models::jobs::JobListResponse,
            divvy::models::jobs::JobStatusResponse,
            divvy::models::jobs::CancelJobResponse,
            divvy::models::subscriptions::SubscriptionJson,
            divvy::models::subscriptions::SubscriptionListResponse,
            divvy::models::subscriptions::SubscribeRequest,
            divvy::models::subscriptions::SubscribeResponse,
            divvy::models::subscriptions::UnsubscribeRequest,
            divvy::models::subscriptions::BulkSubscriptionRequest,
            divvy::models::subscriptions::BulkSubscriptionResponse,
            divvy::models::subscriptions::BulkTickerOutcome,
            divvy::models::subscriptions::MyDividendsResponse,
            divvy::routes::health::HealthResponse,
            divvy::database::job::JobStatus,
            divvy::database::job::JobType,
            divvy::database::job::Progress,
            divvy::database::dividend::UpsertSummary,
            divvy::routing::Lane,
            divvy::routing::Reason,
            divvy::fast_queue::FastQueueMessage,
            divvy::fast_queue::DispatchOutcome,
            divvy::worker::TickSummary,
        )),
        modifiers(&AuthAddon),
    )]
    struct ApiDocs;

    let http_server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::new(
                r#"%a "%r" %s %b "%{User-Agent}i" %T"#,
            ))
            .wrap(cors)
            .service(web::redirect("/swagger-ui", "/swagger-ui/"))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", ApiDocs::openapi()),
            )
            .configure(routes::config)
            .default_service(web::route().to(routes::not_found::not_found))
    })
    .bind(&server_url)?
    .run();

    http_server.await?;

    Ok(())
}
