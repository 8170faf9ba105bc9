pub mod dividends;
pub mod health;
pub mod internal;
pub mod jobs;
pub mod not_found;
pub mod subscriptions;
pub mod tickers;

use actix_web::{middleware, web};

use crate::{auth, errors::ApiError};

pub fn config(cfg: &mut web::ServiceConfig) {
    let json_cfg =
        web::JsonConfig::default().error_handler(|err, _req| ApiError::JsonPayload(err).into());

    let path_cfg =
        web::PathConfig::default().error_handler(|err, _req| ApiError::Path(err).into());

    // Unauthenticated surface: liveness and the internal queue trigger.
    cfg.service(health::health_get);
    cfg.service(internal::process_queue);

    // Everything else sits behind the API-key gate.
    cfg.service(
        web::scope("")
            .wrap(actix_web::middleware::from_fn(auth::require_api_key))
            .wrap(middleware::NormalizePath::trim())
            .app_data(json_cfg)
            .app_data(path_cfg)
            .configure(dividends::config)
            .configure(tickers::config)
            .configure(jobs::config)
            .configure(subscriptions::config),
    );
}
