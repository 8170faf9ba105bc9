use once_cell::sync::Lazy;
use regex::Regex;

static TICKER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]+(\.[A-Z]+)?$").unwrap());

static API_KEY_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^tk_[A-Za-z0-9_]{6,}$").unwrap());

/// Ticker symbols are 1-10 uppercase ASCII letters, with at most one `.`
/// separating a share class (`BRK.B`).
pub fn is_valid_ticker_symbol(symbol: &str) -> bool {
    !symbol.is_empty() && symbol.len() <= 10 && TICKER_REGEX.is_match(symbol)
}

pub fn is_valid_api_key_format(key: &str) -> bool {
    API_KEY_REGEX.is_match(key)
}

/// Trims and uppercases every submitted symbol, silently dropping the ones
/// that do not look like ticker symbols. Order is preserved, duplicates are
/// collapsed.
pub fn normalize_tickers<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut seen = Vec::new();

    for entry in raw {
        let symbol = entry.as_ref().trim().to_uppercase();
        if is_valid_ticker_symbol(&symbol) && !seen.contains(&symbol) {
            seen.push(symbol);
        }
    }

    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_and_class_symbols() {
        assert!(is_valid_ticker_symbol("A"));
        assert!(is_valid_ticker_symbol("AAPL"));
        assert!(is_valid_ticker_symbol("BRK.B"));
    }

    #[test]
    fn rejects_bad_symbols() {
        assert!(!is_valid_ticker_symbol(""));
        assert!(!is_valid_ticker_symbol("aapl"));
        assert!(!is_valid_ticker_symbol("TOOLONGTICKER"));
        assert!(!is_valid_ticker_symbol("AAPL1"));
        assert!(!is_valid_ticker_symbol(".AAPL"));
        assert!(!is_valid_ticker_symbol("BRK."));
        assert!(!is_valid_ticker_symbol("A B"));
    }

    #[test]
    fn normalize_filters_and_dedupes() {
        let raw = ["  aapl ", "MSFT", "msft", "bad ticker", "123", "BRK.b"];
        assert_eq!(normalize_tickers(&raw), vec!["AAPL", "MSFT", "BRK.B"]);
    }

    #[test]
    fn api_key_format() {
        assert!(is_valid_api_key_format("tk_abc123"));
        assert!(is_valid_api_key_format("tk_a_very_long_key_0123456789"));
        assert!(!is_valid_api_key_format("tk_short"));
        assert!(is_valid_api_key_format("tk_shorty"));
        assert!(!is_valid_api_key_format("sk_abc123"));
        assert!(!is_valid_api_key_format("tk_abc-123"));
    }
}
