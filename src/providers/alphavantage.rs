use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

use crate::core::currency::normalize_currency;
use crate::core::error::ProviderError;
use crate::core::price::{Quote, QuoteRequest, QuoteSource};
use crate::providers::util::{build_client, get_json};

const PROVIDER: &str = "alphavantage";

#[derive(Deserialize, Debug)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<HashMap<String, String>>,
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Information")]
    information: Option<String>,
}

/// Secondary provider: the API-key based `GLOBAL_QUOTE` endpoint.
pub struct AlphaVantageProvider {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl AlphaVantageProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        Ok(AlphaVantageProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: build_client(PROVIDER, timeout_secs)?,
        })
    }
}

fn parse_number(fields: &HashMap<String, String>, key: &str) -> Option<f64> {
    fields.get(key).and_then(|v| v.trim().parse::<f64>().ok())
}

#[async_trait]
impl QuoteSource for AlphaVantageProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(name = "AlphaVantageQuoteFetch", skip(self, request), fields(symbol = %request.symbol))]
    async fn try_resolve(&self, request: &QuoteRequest) -> Result<Quote, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::unavailable(PROVIDER, "no API key configured"))?;

        let symbol = request.lookup_symbol();
        let url = format!(
            "{}/query?function=GLOBAL_QUOTE&symbol={}&apikey={}",
            self.base_url,
            urlencoding::encode(&symbol),
            urlencoding::encode(api_key)
        );
        let data: GlobalQuoteResponse = get_json(&self.client, PROVIDER, &url, &symbol).await?;

        if let Some(message) = data.note.or(data.information) {
            return Err(ProviderError::rate_limited(PROVIDER, message));
        }
        let fields = data
            .global_quote
            .filter(|q| !q.is_empty())
            .ok_or_else(|| ProviderError::not_found(PROVIDER, &symbol))?;
        let price = parse_number(&fields, "05. price")
            .filter(|p| *p > 0.0)
            .ok_or_else(|| ProviderError::malformed(PROVIDER, "missing '05. price'"))?;

        // The endpoint reports no currency.
        let currency = normalize_currency(&symbol, None);
        let mut quote = Quote::new(&symbol, price, &currency, Utc::now());
        quote.previous_close = parse_number(&fields, "08. previous close");
        debug!(price, "Alpha Vantage quote received");
        Ok(quote)
    }
}
