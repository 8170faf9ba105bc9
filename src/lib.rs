pub mod auth;
pub mod config;
pub mod csv_export;
pub mod database;
pub mod errors;
pub mod fast_queue;
pub mod models;
pub mod polygon;
pub mod routes;
pub mod routing;
pub mod utils;
pub mod worker;

pub mod build_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

use sqlx::PgPool;
use tokio::sync::mpsc::Sender;

use crate::{
    auth::RateWindows, config::AppConfig, fast_queue::FastQueue, polygon::PolygonClient,
    worker::WorkNotif,
};

pub struct AppState {
    pub pool: PgPool,
    pub config: AppConfig,
    pub rate_windows: RateWindows,
    pub polygon: PolygonClient,
    pub fast_queue: FastQueue,
    pub worker_tx: Sender<WorkNotif>,
}
