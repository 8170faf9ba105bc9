use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Encode, Executor, Pool, Postgres, QueryBuilder, Type};

use crate::database::{DatabaseError, ModelExt, Result};

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Model {
    pub id: i64,
    pub ticker: String,
    pub declaration_date: Option<NaiveDate>,
    pub record_date: Option<NaiveDate>,
    pub ex_dividend_date: NaiveDate,
    pub pay_date: Option<NaiveDate>,
    pub amount: Decimal,
    pub currency: String,
    pub frequency: i32,
    pub dividend_type: String,
    pub polygon_id: Option<String>,
    pub data_source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An incoming record from the upstream provider, before validation. The
/// optional key fields are what `upsert_batch` screens for.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDividend {
    pub ticker: String,
    pub declaration_date: Option<NaiveDate>,
    pub record_date: Option<NaiveDate>,
    pub ex_dividend_date: Option<NaiveDate>,
    pub pay_date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub currency: String,
    pub frequency: i32,
    pub dividend_type: String,
    pub polygon_id: Option<String>,
    pub data_source: String,
}

impl NewDividend {
    /// Record-level validation. Returns the reason a record cannot be
    /// persisted, or `None` when it is acceptable.
    pub fn rejection(&self) -> Option<String> {
        if self.ticker.is_empty() {
            return Some("record without ticker symbol".to_string());
        }
        if self.ex_dividend_date.is_none() {
            return Some(format!("{}: missing ex_dividend_date", self.ticker));
        }
        match self.amount {
            None => Some(format!("{}: missing cash amount", self.ticker)),
            Some(a) if a <= Decimal::ZERO => {
                Some(format!("{}: non-positive amount {}", self.ticker, a))
            }
            _ => None,
        }
    }
}

/// Outcome of a bulk upsert. Invalid records are skipped, never raised.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, utoipa::ToSchema)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub errors: usize,
    pub error_messages: Vec<String>,
}

impl Model {
    /// Bulk upsert keyed by (ticker, ex_dividend_date). The whole batch is a
    /// single transaction; a record failing validation is skipped and
    /// reported in the summary without aborting the rest.
    pub async fn upsert_batch(
        pool: &Pool<Postgres>,
        records: &[NewDividend],
    ) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        let mut tx = pool.begin().await?;

        let q = "INSERT INTO dividends (
                    ticker, declaration_date, record_date, ex_dividend_date, pay_date,
                    amount, currency, frequency, dividend_type, polygon_id, data_source
                 ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                 ON CONFLICT (ticker, ex_dividend_date) DO UPDATE SET
                    declaration_date = EXCLUDED.declaration_date,
                    record_date = EXCLUDED.record_date,
                    pay_date = EXCLUDED.pay_date,
                    amount = EXCLUDED.amount,
                    currency = EXCLUDED.currency,
                    frequency = EXCLUDED.frequency,
                    dividend_type = EXCLUDED.dividend_type,
                    polygon_id = EXCLUDED.polygon_id,
                    data_source = EXCLUDED.data_source,
                    updated_at = NOW()";

        for record in records {
            if let Some(reason) = record.rejection() {
                summary.errors += 1;
                summary.error_messages.push(reason);
                continue;
            }

            sqlx::query(q)
                .bind(&record.ticker)
                .bind(record.declaration_date)
                .bind(record.record_date)
                .bind(record.ex_dividend_date)
                .bind(record.pay_date)
                .bind(record.amount)
                .bind(&record.currency)
                .bind(record.frequency)
                .bind(&record.dividend_type)
                .bind(&record.polygon_id)
                .bind(&record.data_source)
                .execute(&mut *tx)
                .await?;

            summary.inserted += 1;
        }

        tx.commit().await?;

        Ok(summary)
    }

    pub async fn fetch_for_ticker(
        pool: &Pool<Postgres>,
        ticker: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Model>, usize)> {
        let limit = limit.clamp(1, 1000);

        let mut list_qb = QueryBuilder::new("SELECT * FROM dividends WHERE ticker = ");
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM dividends WHERE ticker = ");

        for qb in [&mut list_qb, &mut count_qb] {
            qb.push_bind(ticker);
            if let Some(start) = start {
                qb.push(" AND ex_dividend_date >= ");
                qb.push_bind(start);
            }
            if let Some(end) = end {
                qb.push(" AND ex_dividend_date <= ");
                qb.push_bind(end);
            }
        }

        list_qb.push(" ORDER BY ex_dividend_date DESC LIMIT ");
        list_qb.push_bind(limit);
        list_qb.push(" OFFSET ");
        list_qb.push_bind(offset);

        let rows: Vec<Model> = list_qb.build_query_as().fetch_all(pool).await?;
        let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

        Ok((rows, total as usize))
    }

    /// Range scan across every ticker, for the `/dividends/all` view.
    pub async fn fetch_range(
        pool: &Pool<Postgres>,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Model>, usize)> {
        let limit = limit.clamp(1, 1000);

        let mut list_qb = QueryBuilder::new("SELECT * FROM dividends WHERE TRUE");
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM dividends WHERE TRUE");

        for qb in [&mut list_qb, &mut count_qb] {
            if let Some(start) = start {
                qb.push(" AND ex_dividend_date >= ");
                qb.push_bind(start);
            }
            if let Some(end) = end {
                qb.push(" AND ex_dividend_date <= ");
                qb.push_bind(end);
            }
        }

        list_qb.push(" ORDER BY ticker ASC, ex_dividend_date DESC LIMIT ");
        list_qb.push_bind(limit);
        list_qb.push(" OFFSET ");
        list_qb.push_bind(offset);

        let rows: Vec<Model> = list_qb.build_query_as().fetch_all(pool).await?;
        let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

        Ok((rows, total as usize))
    }

    /// Same scan restricted to a set of symbols, for `/my-dividends`.
    pub async fn fetch_for_tickers(
        pool: &Pool<Postgres>,
        tickers: &[String],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Model>, usize)> {
        if tickers.is_empty() {
            return Ok((Vec::new(), 0));
        }

        let limit = limit.clamp(1, 1000);

        let mut list_qb = QueryBuilder::new("SELECT * FROM dividends WHERE ticker = ANY(");
        let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM dividends WHERE ticker = ANY(");

        for qb in [&mut list_qb, &mut count_qb] {
            qb.push_bind(tickers);
            qb.push(")");
            if let Some(start) = start {
                qb.push(" AND ex_dividend_date >= ");
                qb.push_bind(start);
            }
            if let Some(end) = end {
                qb.push(" AND ex_dividend_date <= ");
                qb.push_bind(end);
            }
        }

        list_qb.push(" ORDER BY ticker ASC, ex_dividend_date DESC LIMIT ");
        list_qb.push_bind(limit);
        list_qb.push(" OFFSET ");
        list_qb.push_bind(offset);

        let rows: Vec<Model> = list_qb.build_query_as().fetch_all(pool).await?;
        let total: i64 = count_qb.build_query_scalar().fetch_one(pool).await?;

        Ok((rows, total as usize))
    }

    pub async fn count_for_ticker<'q, E>(pool: E, ticker: &str) -> Result<usize>
    where
        E: 'q + Executor<'q, Database = Postgres>,
    {
        let q = "SELECT COUNT(*) FROM dividends WHERE ticker = $1";
        let total: i64 = sqlx::query_scalar(q).bind(ticker).fetch_one(pool).await?;

        Ok(total as usize)
    }
}

#[async_trait]
impl<'q> ModelExt<'q> for Model {
    async fn fetch_by_id<T, E>(pool: E, id: T) -> Result<Option<Self>>
    where
        Self: Sized,
        T: 'q + Encode<'q, Postgres> + Type<Postgres> + Send,
        E: 'q + Executor<'q, Database = Postgres>,
    {
        let q = "SELECT * FROM dividends WHERE id = $1";

        sqlx::query_as(q)
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(DatabaseError::Sqlx)
    }

    async fn fetch_all<E>(pool: E, limit: i64, offset: i64) -> Result<Vec<Self>>
    where
        Self: Sized,
        E: 'q + Executor<'q, Database = Postgres>,
    {
        let limit = limit.clamp(1, 1000);
        let q = "SELECT * FROM dividends ORDER BY ex_dividend_date DESC LIMIT $1 OFFSET $2";

        sqlx::query_as(q)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
            .map_err(DatabaseError::Sqlx)
    }

    async fn total_count<E>(pool: E) -> Result<usize>
    where
        E: 'q + Executor<'q, Database = Postgres>,
    {
        let q = "SELECT COUNT(*) FROM dividends";
        let result: i64 = sqlx::query_scalar(q).fetch_one(pool).await?;

        Ok(result as usize)
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::dec;

    use super::*;

    fn record(amount: Option<Decimal>, ex_date: Option<NaiveDate>) -> NewDividend {
        NewDividend {
            ticker: "AAPL".to_string(),
            declaration_date: None,
            record_date: None,
            ex_dividend_date: ex_date,
            pay_date: None,
            amount,
            currency: "USD".to_string(),
            frequency: 4,
            dividend_type: "Cash".to_string(),
            polygon_id: None,
            data_source: "polygon".to_string(),
        }
    }

    #[test]
    fn valid_record_passes() {
        let ex = NaiveDate::from_ymd_opt(2025, 6, 12);
        assert_eq!(record(Some(dec!(0.25)), ex).rejection(), None);
    }

    #[test]
    fn missing_ex_date_is_rejected() {
        let reason = record(Some(dec!(0.25)), None).rejection().unwrap();
        assert!(reason.contains("ex_dividend_date"));
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let ex = NaiveDate::from_ymd_opt(2025, 6, 12);
        assert!(record(Some(dec!(0)), ex).rejection().is_some());
        assert!(record(Some(dec!(-1.5)), ex).rejection().is_some());
        assert!(record(None, ex).rejection().is_some());
    }
}
