use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::core::currency::normalize_currency;
use crate::core::error::ProviderError;
use crate::core::price::{BatchQuoteSource, MarketState, Quote, QuoteRequest, QuoteSource};
use crate::providers::util::{build_client, get_json, jitter};

const QUOTE_PROVIDER: &str = "yahoo";
const CHART_PROVIDER: &str = "yahoo_chart";

fn timestamp_or_now(seconds: Option<i64>) -> DateTime<Utc> {
    seconds
        .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
        .unwrap_or_else(Utc::now)
}

#[derive(Deserialize, Debug)]
struct YahooQuoteResponse {
    #[serde(rename = "quoteResponse")]
    quote_response: QuoteResult,
}

#[derive(Deserialize, Debug)]
struct QuoteResult {
    #[serde(default)]
    result: Vec<QuoteItem>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QuoteItem {
    symbol: Option<String>,
    regular_market_price: Option<f64>,
    currency: Option<String>,
    regular_market_previous_close: Option<f64>,
    regular_market_time: Option<i64>,
    market_state: Option<String>,
    short_name: Option<String>,
    long_name: Option<String>,
}

impl QuoteItem {
    fn into_quote(self, symbol: &str) -> Option<Quote> {
        let price = self.regular_market_price.filter(|p| *p > 0.0)?;
        let currency = normalize_currency(symbol, self.currency.as_deref());
        let mut quote = Quote::new(
            symbol,
            price,
            &currency,
            timestamp_or_now(self.regular_market_time),
        );
        quote.previous_close = self.regular_market_previous_close;
        quote.market_state = self.market_state.as_deref().and_then(MarketState::from_provider);
        quote.name = self.long_name.or(self.short_name);
        Some(quote)
    }
}

/// Primary provider: the multi-symbol quote endpoint, used for single
/// lookups by the resolver and for whole batches by the refresh job.
pub struct YahooQuoteProvider {
    base_url: String,
    jitter_ms: u64,
    client: reqwest::Client,
}

impl YahooQuoteProvider {
    pub fn new(base_url: &str, jitter_ms: u64, timeout_secs: u64) -> Result<Self, ProviderError> {
        Ok(YahooQuoteProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            jitter_ms,
            client: build_client(QUOTE_PROVIDER, timeout_secs)?,
        })
    }

    async fn fetch_items(&self, symbols: &[String]) -> Result<Vec<QuoteItem>, ProviderError> {
        let joined = symbols
            .iter()
            .map(|s| urlencoding::encode(s))
            .collect::<Vec<_>>()
            .join(",");
        let url = format!("{}/v7/finance/quote?symbols={}", self.base_url, joined);
        let data: YahooQuoteResponse =
            get_json(&self.client, QUOTE_PROVIDER, &url, &symbols.join(",")).await?;
        Ok(data.quote_response.result)
    }
}

#[async_trait]
impl QuoteSource for YahooQuoteProvider {
    fn name(&self) -> &str {
        QUOTE_PROVIDER
    }

    #[instrument(name = "YahooQuoteFetch", skip(self, request), fields(symbol = %request.symbol))]
    async fn try_resolve(&self, request: &QuoteRequest) -> Result<Quote, ProviderError> {
        // Spreads out many concurrent resolutions so they don't hit the provider in one burst.
        tokio::time::sleep(jitter(self.jitter_ms)).await;

        let symbol = request.lookup_symbol();
        let item = self
            .fetch_items(std::slice::from_ref(&symbol))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::not_found(QUOTE_PROVIDER, &symbol))?;

        let quote = item
            .into_quote(&symbol)
            .ok_or_else(|| ProviderError::malformed(QUOTE_PROVIDER, "quote has no price"))?;
        debug!(price = quote.price, currency = %quote.currency, "Yahoo quote received");
        Ok(quote)
    }
}

#[async_trait]
impl BatchQuoteSource for YahooQuoteProvider {
    fn name(&self) -> &str {
        QUOTE_PROVIDER
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Result<Vec<Quote>, ProviderError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let items = self.fetch_items(symbols).await?;
        let quotes = items
            .into_iter()
            .filter_map(|item| {
                let symbol = item.symbol.clone()?;
                let quote = item.into_quote(&symbol);
                if quote.is_none() {
                    warn!(symbol = %symbol, "Batch quote without a price, skipping");
                }
                quote
            })
            .collect();
        Ok(quotes)
    }
}

#[derive(Deserialize, Debug)]
struct YahooChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    meta: ChartMeta,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    regular_market_price: Option<f64>,
    currency: Option<String>,
    regular_market_time: Option<i64>,
    chart_previous_close: Option<f64>,
    long_name: Option<String>,
    short_name: Option<String>,
}

/// Unauthenticated chart endpoint, tried only after every other source failed.
pub struct YahooChartProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooChartProvider {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        Ok(YahooChartProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_client(CHART_PROVIDER, timeout_secs)?,
        })
    }
}

#[async_trait]
impl QuoteSource for YahooChartProvider {
    fn name(&self) -> &str {
        CHART_PROVIDER
    }

    #[instrument(name = "YahooChartFetch", skip(self, request), fields(symbol = %request.symbol))]
    async fn try_resolve(&self, request: &QuoteRequest) -> Result<Quote, ProviderError> {
        let symbol = request.lookup_symbol();
        let url = format!(
            "{}/v8/finance/chart/{}?interval=1d&range=1d",
            self.base_url,
            urlencoding::encode(&symbol)
        );
        let data: YahooChartResponse = get_json(&self.client, CHART_PROVIDER, &url, &symbol).await?;

        let meta = data
            .chart
            .result
            .and_then(|items| items.into_iter().next())
            .map(|item| item.meta)
            .ok_or_else(|| ProviderError::not_found(CHART_PROVIDER, &symbol))?;
        let price = meta
            .regular_market_price
            .filter(|p| *p > 0.0)
            .ok_or_else(|| ProviderError::malformed(CHART_PROVIDER, "chart has no market price"))?;

        let currency = normalize_currency(&symbol, meta.currency.as_deref());
        let mut quote = Quote::new(
            &symbol,
            price,
            &currency,
            timestamp_or_now(meta.regular_market_time),
        );
        quote.previous_close = meta.chart_previous_close;
        quote.name = meta.long_name.or(meta.short_name);
        Ok(quote)
    }
}
