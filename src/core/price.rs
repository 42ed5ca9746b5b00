//! Pricing abstractions and core types

use crate::core::error::ProviderError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    Stock,
    Crypto,
    Fund,
    Gold,
    Bond,
    Cash,
}

impl AssetType {
    /// Funds are quoted by a dedicated fund-code service instead of a ticker.
    pub fn needs_fund_provider(&self) -> bool {
        matches!(self, AssetType::Fund)
    }
}

impl Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AssetType::Stock => "STOCK",
                AssetType::Crypto => "CRYPTO",
                AssetType::Fund => "FUND",
                AssetType::Gold => "GOLD",
                AssetType::Bond => "BOND",
                AssetType::Cash => "CASH",
            }
        )
    }
}

impl FromStr for AssetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "STOCK" | "ETF" => Ok(AssetType::Stock),
            "CRYPTO" => Ok(AssetType::Crypto),
            "FUND" => Ok(AssetType::Fund),
            "GOLD" | "COMMODITY" => Ok(AssetType::Gold),
            "BOND" => Ok(AssetType::Bond),
            "CASH" => Ok(AssetType::Cash),
            _ => Err(anyhow::anyhow!("Invalid asset type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketState {
    Open,
    Closed,
    Pre,
    Post,
}

impl MarketState {
    /// Maps the market state labels used by quote providers.
    pub fn from_provider(state: &str) -> Option<Self> {
        match state.to_uppercase().as_str() {
            "REGULAR" | "OPEN" => Some(MarketState::Open),
            "CLOSED" => Some(MarketState::Closed),
            "PRE" | "PREPRE" => Some(MarketState::Pre),
            "POST" | "POSTPOST" => Some(MarketState::Post),
            _ => None,
        }
    }
}

/// Latest known trade price for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub currency: String,
    pub observed_at: DateTime<Utc>,
    pub market_state: Option<MarketState>,
    pub previous_close: Option<f64>,
    pub name: Option<String>,
}

impl Quote {
    pub fn new(symbol: &str, price: f64, currency: &str, observed_at: DateTime<Utc>) -> Self {
        Quote {
            symbol: symbol.to_string(),
            price,
            currency: currency.to_string(),
            observed_at,
            market_state: None,
            previous_close: None,
            name: None,
        }
    }

    pub fn change(&self) -> f64 {
        match self.previous_close {
            Some(prev) if prev > 0.0 => self.price - prev,
            _ => 0.0,
        }
    }

    pub fn change_percent(&self) -> f64 {
        match self.previous_close {
            Some(prev) if prev > 0.0 => ((self.price - prev) / prev) * 100.0,
            _ => 0.0,
        }
    }
}

/// Price as handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceResult {
    pub price: f64,
    pub currency: String,
    pub change_24h: f64,
    pub change_percent: f64,
    pub name: Option<String>,
}

impl From<&Quote> for PriceResult {
    fn from(quote: &Quote) -> Self {
        PriceResult {
            price: quote.price,
            currency: quote.currency.clone(),
            change_24h: quote.change(),
            change_percent: quote.change_percent(),
            name: quote.name.clone(),
        }
    }
}

const CRYPTO_QUOTE_CURRENCIES: &[&str] = &["USD", "EUR", "TRY", "GBP", "USDT"];

/// Exchange hints and the suffix their listings carry on the primary provider.
/// A hint matches on whole words, so `TSXV` is not taken for `TSX`.
const EXCHANGE_SUFFIXES: &[(&[&str], &str)] = &[
    (&["BIST", "IST"], ".IS"),
    (&["LSE", "LON"], ".L"),
    (&["XETRA", "FRA", "GER"], ".DE"),
    (&["EPA", "PAR"], ".PA"),
    (&["TSX", "TOR"], ".TO"),
    (&["TSXV", "CVE"], ".V"),
];

/// One symbol to resolve, with the hints needed to address providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRequest {
    pub symbol: String,
    pub asset_type: AssetType,
    pub exchange: Option<String>,
}

impl QuoteRequest {
    pub fn new(symbol: &str, asset_type: AssetType, exchange: Option<&str>) -> Self {
        QuoteRequest {
            symbol: symbol.trim().to_string(),
            asset_type,
            exchange: exchange
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
        }
    }

    /// Symbol under which providers, the cache and the quote store know this instrument.
    pub fn lookup_symbol(&self) -> String {
        let upper = self.symbol.to_uppercase();
        match self.asset_type {
            AssetType::Fund | AssetType::Cash => upper,
            AssetType::Crypto => {
                if upper.contains('-') {
                    upper
                } else {
                    let pair = CRYPTO_QUOTE_CURRENCIES
                        .iter()
                        .find(|c| upper.len() > c.len() + 1 && upper.ends_with(*c));
                    match pair {
                        Some(quote_currency) => format!(
                            "{}-{}",
                            &upper[..upper.len() - quote_currency.len()],
                            quote_currency
                        ),
                        None => format!("{upper}-USD"),
                    }
                }
            }
            AssetType::Gold if matches!(upper.as_str(), "XAU" | "GOLD") => "GC=F".to_string(),
            _ => self.with_exchange_suffix(upper),
        }
    }

    fn with_exchange_suffix(&self, upper: String) -> String {
        if upper.contains('.') {
            return upper;
        }
        let Some(exchange) = self.exchange.as_deref().map(str::to_uppercase) else {
            return upper;
        };
        let words: Vec<&str> = exchange
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        EXCHANGE_SUFFIXES
            .iter()
            .find(|(names, _)| names.iter().any(|n| words.contains(n)))
            .map(|(_, suffix)| format!("{upper}{suffix}"))
            .unwrap_or(upper)
    }
}

/// One upstream source in the resolver's fallback chain.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Provider identity used for logging and usage statistics.
    fn name(&self) -> &str;

    fn supports(&self, _asset_type: AssetType) -> bool {
        true
    }

    async fn try_resolve(&self, request: &QuoteRequest) -> Result<Quote, ProviderError>;
}

/// Source able to quote many symbols in one upstream call.
#[async_trait]
pub trait BatchQuoteSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_batch(&self, symbols: &[String]) -> Result<Vec<Quote>, ProviderError>;
}
