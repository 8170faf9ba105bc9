//! Decides which ingestion lane a ticker takes: immediate historical
//! backfill through the fast queue, or the standard job queue for refresh.
//!
//! The decision is a pure function of the ticker row and the clock, so the
//! same inputs always route the same way. It is consulted *before* the
//! ticker upsert; a symbol the store has never seen must land in the fast
//! lane, and upserting first would destroy that signal.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::{Pool, Postgres};

use crate::database::ticker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Fast,
    Bulk,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    NewTicker,
    RecentlyCreated,
    NoDividendData,
    RecentExisting,
    StaleExisting,
    ErrorFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct Decision {
    pub lane: Lane,
    pub reason: Reason,
}

impl Decision {
    fn fast(reason: Reason) -> Self {
        Self {
            lane: Lane::Fast,
            reason,
        }
    }

    fn bulk(reason: Reason) -> Self {
        Self {
            lane: Lane::Bulk,
            reason,
        }
    }
}

/// Pure routing core.
pub fn decide(row: Option<&ticker::Model>, now: DateTime<Utc>) -> Decision {
    let Some(row) = row else {
        return Decision::fast(Reason::NewTicker);
    };

    match row.last_dividend_update {
        None if row.created_at > now - Duration::hours(1) => {
            Decision::fast(Reason::RecentlyCreated)
        }
        None => Decision::fast(Reason::NoDividendData),
        Some(at) if at >= now - Duration::hours(24) => Decision::bulk(Reason::RecentExisting),
        Some(_) => Decision::bulk(Reason::StaleExisting),
    }
}

/// Looks up the ticker row and routes it. A store error routes to the fast
/// lane, the conservative default: the worst case is an unnecessary
/// historical fetch, the alternative is losing a first-time backfill.
pub async fn route_ticker(pool: &Pool<Postgres>, symbol: &str, now: DateTime<Utc>) -> Decision {
    match ticker::Model::fetch_by_symbol(pool, symbol).await {
        Ok(row) => decide(row.as_ref(), now),
        Err(err) => {
            tracing::warn!(symbol, "routing lookup failed, using fast lane: {err}");
            Decision::fast(Reason::ErrorFallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(
        created_at: DateTime<Utc>,
        last_dividend_update: Option<DateTime<Utc>>,
    ) -> ticker::Model {
        ticker::Model {
            id: 7,
            symbol: "AAPL".to_string(),
            is_active: true,
            created_at,
            last_dividend_update,
            update_frequency_hours: 24,
        }
    }

    #[test]
    fn unknown_symbol_goes_fast() {
        let d = decide(None, Utc::now());
        assert_eq!(d.lane, Lane::Fast);
        assert_eq!(d.reason, Reason::NewTicker);
    }

    #[test]
    fn fresh_row_without_data_goes_fast() {
        let now = Utc::now();
        let d = decide(Some(&row(now - Duration::minutes(10), None)), now);
        assert_eq!(d.lane, Lane::Fast);
        assert_eq!(d.reason, Reason::RecentlyCreated);
    }

    #[test]
    fn old_row_without_data_goes_fast() {
        let now = Utc::now();
        let d = decide(Some(&row(now - Duration::days(3), None)), now);
        assert_eq!(d.lane, Lane::Fast);
        assert_eq!(d.reason, Reason::NoDividendData);
    }

    #[test]
    fn recently_updated_goes_bulk() {
        let now = Utc::now();
        let d = decide(
            Some(&row(now - Duration::days(30), Some(now - Duration::hours(2)))),
            now,
        );
        assert_eq!(d.lane, Lane::Bulk);
        assert_eq!(d.reason, Reason::RecentExisting);
    }

    #[test]
    fn stale_goes_bulk() {
        let now = Utc::now();
        let d = decide(
            Some(&row(now - Duration::days(30), Some(now - Duration::days(2)))),
            now,
        );
        assert_eq!(d.lane, Lane::Bulk);
        assert_eq!(d.reason, Reason::StaleExisting);
    }

    #[test]
    fn decision_is_deterministic() {
        let now = Utc::now();
        let r = row(now - Duration::days(5), Some(now - Duration::hours(30)));
        assert_eq!(decide(Some(&r), now), decide(Some(&r), now));
    }
}
