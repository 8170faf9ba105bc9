//! CSV rendering for dividend exports.

use std::borrow::Cow;
use std::fmt::Write;

use chrono::NaiveDate;

use crate::database::dividend;

pub const TICKER_HEADER: &str =
    "Declaration Date,Record Date,Ex-Dividend Date,Pay Date,Amount,Currency,Frequency,Type";

/// Quotes a field when it contains a delimiter, quote, or newline.
fn escape(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\n', '\r']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

fn date(value: Option<NaiveDate>) -> String {
    value.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default()
}

fn push_record(out: &mut String, row: &dividend::Model) {
    let _ = writeln!(
        out,
        "{},{},{},{},{},{},{},{}",
        date(row.declaration_date),
        date(row.record_date),
        row.ex_dividend_date.format("%Y-%m-%d"),
        date(row.pay_date),
        row.amount,
        escape(&row.currency),
        row.frequency,
        escape(&row.dividend_type),
    );
}

/// Per-ticker export, one record per line under the standard header.
pub fn ticker_csv(rows: &[dividend::Model]) -> String {
    let mut out = String::with_capacity(64 * (rows.len() + 1));
    out.push_str(TICKER_HEADER);
    out.push('\n');

    for row in rows {
        push_record(&mut out, row);
    }

    out
}

/// Cross-ticker export; same as [`ticker_csv`] with a leading Ticker column.
pub fn all_csv(rows: &[dividend::Model]) -> String {
    let mut out = String::with_capacity(72 * (rows.len() + 1));
    out.push_str("Ticker,");
    out.push_str(TICKER_HEADER);
    out.push('\n');

    for row in rows {
        let _ = write!(out, "{},", escape(&row.ticker));
        push_record(&mut out, row);
    }

    out
}

pub fn attachment_name(ticker: Option<&str>) -> String {
    match ticker {
        Some(t) => format!("attachment; filename=\"{t}_dividends.csv\""),
        None => "attachment; filename=\"all_dividends.csv\"".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::dec;

    use super::*;

    fn row(ticker: &str, pay_date: Option<NaiveDate>) -> dividend::Model {
        dividend::Model {
            id: 1,
            ticker: ticker.to_string(),
            declaration_date: NaiveDate::from_ymd_opt(2025, 5, 1),
            record_date: None,
            ex_dividend_date: NaiveDate::from_ymd_opt(2025, 5, 12).unwrap(),
            pay_date,
            amount: dec!(0.26),
            currency: "USD".to_string(),
            frequency: 4,
            dividend_type: "Cash".to_string(),
            polygon_id: None,
            data_source: "polygon".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn ticker_export_renders_empty_optionals_as_empty_columns() {
        let csv = ticker_csv(&[row("AAPL", None)]);
        let mut lines = csv.lines();

        assert_eq!(lines.next(), Some(TICKER_HEADER));
        assert_eq!(lines.next(), Some("2025-05-01,,2025-05-12,,0.26,USD,4,Cash"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn all_export_prefixes_ticker() {
        let csv = all_csv(&[row("BRK.B", NaiveDate::from_ymd_opt(2025, 5, 22))]);
        let body = csv.lines().nth(1).unwrap();

        assert!(body.starts_with("BRK.B,2025-05-01"));
        assert!(body.ends_with("2025-05-22,0.26,USD,4,Cash"));
    }

    #[test]
    fn fields_with_delimiters_are_quoted() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn attachment_names() {
        assert_eq!(
            attachment_name(Some("AAPL")),
            "attachment; filename=\"AAPL_dividends.csv\""
        );
        assert_eq!(
            attachment_name(None),
            "attachment; filename=\"all_dividends.csv\""
        );
    }
}
