use actix_web::{error::ResponseError, http::StatusCode};

#[derive(Debug, Clone, thiserror::Error)]
pub enum TickerError {
    #[error("Request must include at least one ticker symbol")]
    EmptyTickers,

    #[error("Too many tickers in one request, got {0}, the maximum is 100")]
    TooManyTickers(usize),

    #[error("No valid ticker symbols after filtering, symbols are 1-10 uppercase letters")]
    NoValidTickers,

    #[error("'{0}' is not a valid ticker symbol")]
    InvalidTicker(String),

    #[error("fetchType must be either 'historical' or 'recent', got '{0}'")]
    InvalidFetchType(String),
}

impl ResponseError for TickerError {
    fn status_code(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}
