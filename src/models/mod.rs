pub mod dividends;
pub mod jobs;
pub mod responses;
pub mod subscriptions;
pub mod tickers;
