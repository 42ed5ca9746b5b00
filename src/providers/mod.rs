pub mod alphavantage;
pub mod finnhub;
pub mod frankfurter;
pub mod tefas;
pub mod util;
pub mod yahoo_finance;

pub use frankfurter::RateSource;
