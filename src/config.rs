use std::env;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set in the environment or .env file")]
    MissingVar(&'static str),

    #[error("{0} could not be parsed: {1}")]
    BadValue(&'static str, String),
}

/// Process configuration, read once at startup. A missing required variable
/// is fatal and the process never starts serving.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind address for the HTTP server, e.g. `127.0.0.1:8080`.
    pub server_url: String,
    pub database_url: String,
    /// Auth key for the upstream dividend provider.
    pub polygon_api_key: String,
    pub polygon_base_url: String,
    /// Optional static operator key accepted alongside `api_users` rows.
    pub ticker_api_key: Option<String>,
    /// Optional HTTP sink for the fast backfill lane. When unset, fast-lane
    /// symbols fall back to the standard job queue.
    pub fast_queue_url: Option<String>,
    /// Queue items leased per worker tick.
    pub worker_batch_size: i64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let server_url =
            env::var("SERVER_URL").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?;
        let polygon_api_key = env::var("POLYGON_API_KEY")
            .map_err(|_| ConfigError::MissingVar("POLYGON_API_KEY"))?;
        let polygon_base_url = env::var("POLYGON_BASE_URL")
            .unwrap_or_else(|_| "https://api.polygon.io".to_string());

        let worker_batch_size = match env::var("WORKER_BATCH_SIZE") {
            Ok(raw) => raw
                .parse::<i64>()
                .map_err(|e| ConfigError::BadValue("WORKER_BATCH_SIZE", e.to_string()))?
                .clamp(1, 50),
            Err(_) => 5,
        };

        Ok(Self {
            server_url,
            database_url,
            polygon_api_key,
            polygon_base_url,
            ticker_api_key: env::var("TICKER_API_KEY").ok().filter(|s| !s.is_empty()),
            fast_queue_url: env::var("FAST_QUEUE_URL").ok().filter(|s| !s.is_empty()),
            worker_batch_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test so the env mutations never race each other under the parallel
    // test runner.
    #[test]
    fn from_env_requirements_and_clamps() {
        unsafe {
            env::remove_var("DATABASE_URL");
            env::set_var("POLYGON_API_KEY", "pk_test");
        }
        let err = AppConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("DATABASE_URL")));

        unsafe {
            env::set_var("DATABASE_URL", "postgres://localhost/divvy");
            env::set_var("WORKER_BATCH_SIZE", "5000");
        }
        let cfg = AppConfig::from_env().expect("config should parse");
        assert_eq!(cfg.worker_batch_size, 50);

        unsafe {
            env::remove_var("WORKER_BATCH_SIZE");
        }
    }
}
