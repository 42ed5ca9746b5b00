//! Core business logic abstractions

pub mod cache;
pub mod config;
pub mod currency;
pub mod error;
pub mod log;
pub mod price;

// Re-export main types for cleaner imports
pub use cache::TtlCache;
pub use currency::{RatesMap, convert_currency, detect_currency, normalize_currency};
pub use error::{EngineError, ProviderError, StoreError};
pub use price::{
    AssetType, BatchQuoteSource, MarketState, PriceResult, Quote, QuoteRequest, QuoteSource,
};
