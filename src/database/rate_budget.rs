use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use sqlx::{Pool, Postgres};

use crate::database::Result;

/// Service name of the upstream dividend provider in the budget table.
pub const POLYGON_SERVICE: &str = "polygon";

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Model {
    pub service_name: String,
    pub minute_count: i32,
    pub hour_count: i32,
    pub day_count: i32,
    pub minute_limit: i32,
    pub hour_limit: Option<i32>,
    pub day_limit: Option<i32>,
    pub reset_minute: DateTime<Utc>,
    pub reset_hour: DateTime<Utc>,
    pub reset_day: DateTime<Utc>,
    pub last_call_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Admission {
    Admitted,
    RateLimited { wait_ms: i64 },
}

/// Counter state after rolling the reset boundaries forward to `now`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rolled {
    pub minute_count: i32,
    pub hour_count: i32,
    pub day_count: i32,
    pub reset_minute: DateTime<Utc>,
    pub reset_hour: DateTime<Utc>,
    pub reset_day: DateTime<Utc>,
}

fn floor(now: DateTime<Utc>, unit: TimeDelta) -> DateTime<Utc> {
    now.duration_trunc(unit)
        .expect("whole minutes/hours/days are valid truncation units")
}

/// Rolls each counter to zero when the wall clock crossed its truncation
/// boundary since the stored reset marker.
pub fn roll(row: &Model, now: DateTime<Utc>) -> Rolled {
    let minute_floor = floor(now, TimeDelta::minutes(1));
    let hour_floor = floor(now, TimeDelta::hours(1));
    let day_floor = floor(now, TimeDelta::days(1));

    let (minute_count, reset_minute) = if row.reset_minute < minute_floor {
        (0, minute_floor)
    } else {
        (row.minute_count, row.reset_minute)
    };
    let (hour_count, reset_hour) = if row.reset_hour < hour_floor {
        (0, hour_floor)
    } else {
        (row.hour_count, row.reset_hour)
    };
    let (day_count, reset_day) = if row.reset_day < day_floor {
        (0, day_floor)
    } else {
        (row.day_count, row.reset_day)
    };

    Rolled {
        minute_count,
        hour_count,
        day_count,
        reset_minute,
        reset_hour,
        reset_day,
    }
}

/// Admission decision against the rolled counters. The wait is the delta to
/// the furthest reset boundary among the exhausted counters.
pub fn admit(row: &Model, rolled: &Rolled, now: DateTime<Utc>) -> Admission {
    let mut wait_until: Option<DateTime<Utc>> = None;

    let mut exceeded = |boundary: DateTime<Utc>| {
        wait_until = Some(match wait_until {
            Some(current) => current.max(boundary),
            None => boundary,
        });
    };

    if rolled.minute_count >= row.minute_limit {
        exceeded(rolled.reset_minute + TimeDelta::minutes(1));
    }
    if let Some(limit) = row.hour_limit {
        if rolled.hour_count >= limit {
            exceeded(rolled.reset_hour + TimeDelta::hours(1));
        }
    }
    if let Some(limit) = row.day_limit {
        if rolled.day_count >= limit {
            exceeded(rolled.reset_day + TimeDelta::days(1));
        }
    }

    match wait_until {
        Some(at) => Admission::RateLimited {
            wait_ms: (at - now).num_milliseconds().max(0),
        },
        None => Admission::Admitted,
    }
}

impl Model {
    /// Atomically admits one call against the service budget. The row lock
    /// serializes concurrent callers; rolled resets are persisted either way
    /// so a denied caller still advances stale boundaries.
    pub async fn check_and_reserve(pool: &Pool<Postgres>, service: &str) -> Result<Admission> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            "INSERT INTO rate_limits (service_name) VALUES ($1) ON CONFLICT (service_name) DO NOTHING",
        )
        .bind(service)
        .execute(&mut *tx)
        .await?;

        let row: Model = sqlx::query_as("SELECT * FROM rate_limits WHERE service_name = $1 FOR UPDATE")
            .bind(service)
            .fetch_one(&mut *tx)
            .await?;

        let now = Utc::now();
        let rolled = roll(&row, now);
        let admission = admit(&row, &rolled, now);

        let admitted = admission == Admission::Admitted;
        let bump = i32::from(admitted);

        sqlx::query(
            "UPDATE rate_limits
             SET minute_count = $2, hour_count = $3, day_count = $4,
                 reset_minute = $5, reset_hour = $6, reset_day = $7,
                 last_call_time = CASE WHEN $8 THEN $9 ELSE last_call_time END
             WHERE service_name = $1",
        )
        .bind(service)
        .bind(rolled.minute_count + bump)
        .bind(rolled.hour_count + bump)
        .bind(rolled.day_count + bump)
        .bind(rolled.reset_minute)
        .bind(rolled.reset_hour)
        .bind(rolled.reset_day)
        .bind(admitted)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(admission)
    }

    /// Read-only estimate of the wait before the next admissible call.
    /// Returns 0 when a call would currently be admitted.
    pub async fn time_until_next_call(pool: &Pool<Postgres>, service: &str) -> Result<i64> {
        let row: Option<Model> =
            sqlx::query_as("SELECT * FROM rate_limits WHERE service_name = $1")
                .bind(service)
                .fetch_optional(pool)
                .await?;

        let Some(row) = row else {
            return Ok(0);
        };

        let now = Utc::now();
        let rolled = roll(&row, now);

        Ok(match admit(&row, &rolled, now) {
            Admission::Admitted => 0,
            Admission::RateLimited { wait_ms } => wait_ms,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewCallLog {
    pub service_name: String,
    pub endpoint: String,
    pub ticker_symbol: Option<String>,
    pub response_status: Option<i32>,
    pub response_time_ms: Option<i32>,
    pub rate_limit_remaining: Option<i32>,
    pub error_message: Option<String>,
    pub metadata: serde_json::Value,
}

/// Appends one row to the call log. Callers treat failures as non-fatal and
/// must never let them block an admission decision.
pub async fn record_call(pool: &Pool<Postgres>, log: NewCallLog) -> Result<()> {
    sqlx::query(
        "INSERT INTO api_call_logs
            (service_name, endpoint, ticker_symbol, response_status, response_time_ms,
             rate_limit_remaining, error_message, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
    )
    .bind(&log.service_name)
    .bind(&log.endpoint)
    .bind(&log.ticker_symbol)
    .bind(log.response_status)
    .bind(log.response_time_ms)
    .bind(log.rate_limit_remaining)
    .bind(&log.error_message)
    .bind(&log.metadata)
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn budget(minute_count: i32, reset_minute: DateTime<Utc>) -> Model {
        Model {
            service_name: POLYGON_SERVICE.to_string(),
            minute_count,
            hour_count: minute_count,
            day_count: minute_count,
            minute_limit: 5,
            hour_limit: None,
            day_limit: None,
            reset_minute,
            reset_hour: reset_minute,
            reset_day: reset_minute,
            last_call_time: None,
        }
    }

    #[test]
    fn counter_resets_after_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 45).unwrap();
        let stale = Utc.with_ymd_and_hms(2026, 3, 2, 14, 29, 0).unwrap();

        let rolled = roll(&budget(5, stale), now);
        assert_eq!(rolled.minute_count, 0);
        assert_eq!(
            rolled.reset_minute,
            Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap()
        );
    }

    #[test]
    fn counter_survives_within_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 45).unwrap();
        let current = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap();

        let rolled = roll(&budget(3, current), now);
        assert_eq!(rolled.minute_count, 3);
    }

    #[test]
    fn admits_under_limit() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 45).unwrap();
        let current = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap();
        let row = budget(4, current);
        let rolled = roll(&row, now);

        assert_eq!(admit(&row, &rolled, now), Admission::Admitted);
    }

    #[test]
    fn limits_at_capacity_with_wait_to_boundary() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 45).unwrap();
        let current = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap();
        let row = budget(5, current);
        let rolled = roll(&row, now);

        // 15 seconds to 14:31:00.
        assert_eq!(
            admit(&row, &rolled, now),
            Admission::RateLimited { wait_ms: 15_000 }
        );
    }

    #[test]
    fn hour_limit_enforced_when_configured() {
        let now = Utc.with_ymd_and_hms(2026, 3, 2, 14, 30, 0).unwrap();
        let mut row = budget(0, now);
        row.hour_limit = Some(10);
        row.hour_count = 10;
        row.reset_hour = Utc.with_ymd_and_hms(2026, 3, 2, 14, 0, 0).unwrap();
        let rolled = roll(&row, now);

        // 30 minutes to 15:00:00.
        assert_eq!(
            admit(&row, &rolled, now),
            Admission::RateLimited {
                wait_ms: 30 * 60 * 1000
            }
        );
    }
}
