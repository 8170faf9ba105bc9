//! Sink for the fast backfill lane.
//!
//! One concrete implementation: an HTTP POST to the queue worker named by
//! `FAST_QUEUE_URL`. Dispatch never raises; callers inspect the outcome and
//! fall back to the standard job queue when the message did not go out.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AppConfig;

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
pub struct FastQueueMessage {
    pub tickers: Vec<String>,
    pub priority: String,
    pub force: bool,
    pub requested_at: DateTime<Utc>,
}

impl FastQueueMessage {
    pub fn backfill(tickers: Vec<String>, force: bool) -> Self {
        Self {
            tickers,
            priority: "high".to_string(),
            force,
            requested_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum DispatchOutcome {
    /// The sink accepted the batch.
    Sent { count: usize },
    /// No sink configured; the caller must use the standard lane.
    Unconfigured,
    /// The sink errored; the caller must use the standard lane.
    Failed { error: String },
}

impl DispatchOutcome {
    pub fn delivered(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

#[derive(Clone)]
pub struct FastQueue {
    http: reqwest::Client,
    url: Option<String>,
}

impl FastQueue {
    pub fn new(config: &AppConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            http,
            url: config.fast_queue_url.clone(),
        })
    }

    pub async fn dispatch(&self, message: &FastQueueMessage) -> DispatchOutcome {
        let Some(url) = &self.url else {
            return DispatchOutcome::Unconfigured;
        };

        let result = self.http.post(url).json(message).send().await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::info!(
                    count = message.tickers.len(),
                    "dispatched fast-lane backfill batch"
                );
                DispatchOutcome::Sent {
                    count: message.tickers.len(),
                }
            }
            Ok(response) => {
                let error = format!("fast queue answered HTTP {}", response.status());
                tracing::warn!("{error}, falling back to standard queue");
                DispatchOutcome::Failed { error }
            }
            Err(err) => {
                tracing::warn!("fast queue dispatch failed, falling back: {err}");
                DispatchOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backfill_message_shape() {
        let msg = FastQueueMessage::backfill(vec!["AAPL".to_string()], true);
        let value = serde_json::to_value(&msg).expect("message serializes");

        assert_eq!(value["tickers"][0], "AAPL");
        assert_eq!(value["priority"], "high");
        assert_eq!(value["force"], true);
        assert!(value["requested_at"].is_string());
    }

    #[test]
    fn only_sent_counts_as_delivered() {
        assert!(DispatchOutcome::Sent { count: 1 }.delivered());
        assert!(!DispatchOutcome::Unconfigured.delivered());
        assert!(
            !DispatchOutcome::Failed {
                error: "boom".to_string()
            }
            .delivered()
        );
    }
}
