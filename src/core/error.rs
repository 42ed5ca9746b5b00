//! Error kinds raised inside the engine.
//!
//! Provider and store errors never leave the engine: they are converted into
//! "try the next step" by the resolver, or logged and swallowed by the stores.
//! Only [`EngineError`] is returned to callers, and only for bad input.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} unavailable: {message}")]
    Unavailable { provider: String, message: String },

    #[error("{provider} rate limited: {message}")]
    RateLimited { provider: String, message: String },

    #[error("{provider} has no data for symbol: {symbol}")]
    SymbolNotFound { provider: String, symbol: String },

    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse { provider: String, message: String },
}

impl ProviderError {
    pub fn unavailable(provider: &str, message: impl Into<String>) -> Self {
        Self::Unavailable {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn rate_limited(provider: &str, message: impl Into<String>) -> Self {
        Self::RateLimited {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(provider: &str, symbol: &str) -> Self {
        Self::SymbolNotFound {
            provider: provider.to_string(),
            symbol: symbol.to_string(),
        }
    }

    pub fn malformed(provider: &str, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            Self::Unavailable { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::SymbolNotFound { provider, .. }
            | Self::MalformedResponse { provider, .. } => provider,
        }
    }

    /// Short label used in structured log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable { .. } => "unavailable",
            Self::RateLimited { .. } => "rate_limited",
            Self::SymbolNotFound { .. } => "symbol_not_found",
            Self::MalformedResponse { .. } => "malformed_response",
        }
    }
}

/// Persistence failure in a key-value collection.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(#[from] fjall::Error),

    #[error("failed to (de)serialize stored value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Defects in the caller's own input, rejected before any I/O happens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("symbol must not be empty")]
    EmptySymbol,

    #[error("position {id} is invalid: {reason}")]
    InvalidPosition { id: String, reason: String },
}
