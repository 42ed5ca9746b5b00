use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::currency::normalize_currency;
use crate::core::error::ProviderError;
use crate::core::price::{Quote, QuoteRequest, QuoteSource};
use crate::providers::util::{build_client, get_json};

const PROVIDER: &str = "finnhub";

#[derive(Deserialize, Debug)]
struct FinnhubQuote {
    /// Current price
    c: Option<f64>,
    /// Previous close
    pc: Option<f64>,
    /// Unix seconds of the last trade
    t: Option<i64>,
}

/// Tertiary provider.
pub struct FinnhubProvider {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl FinnhubProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        Ok(FinnhubProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: build_client(PROVIDER, timeout_secs)?,
        })
    }
}

#[async_trait]
impl QuoteSource for FinnhubProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(name = "FinnhubQuoteFetch", skip(self, request), fields(symbol = %request.symbol))]
    async fn try_resolve(&self, request: &QuoteRequest) -> Result<Quote, ProviderError> {
        let token = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::unavailable(PROVIDER, "no API key configured"))?;

        let symbol = request.lookup_symbol();
        let url = format!(
            "{}/quote?symbol={}&token={}",
            self.base_url,
            urlencoding::encode(&symbol),
            urlencoding::encode(token)
        );
        let data: FinnhubQuote = get_json(&self.client, PROVIDER, &url, &symbol).await?;

        // Unknown symbols come back as an all-zero quote.
        let price = data
            .c
            .filter(|c| *c > 0.0)
            .ok_or_else(|| ProviderError::not_found(PROVIDER, &symbol))?;
        let observed_at = data
            .t
            .filter(|t| *t > 0)
            .and_then(|t| Utc.timestamp_opt(t, 0).single())
            .unwrap_or_else(Utc::now);

        let currency = normalize_currency(&symbol, None);
        let mut quote = Quote::new(&symbol, price, &currency, observed_at);
        quote.previous_close = data.pc.filter(|pc| *pc > 0.0);
        debug!(price, "Finnhub quote received");
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::price::AssetType;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(symbol: &str, mock_response: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quote"))
            .and(query_param("symbol", symbol))
            .and(query_param("token", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_string(mock_response))
            .mount(&mock_server)
            .await;
        mock_server
    }

    #[tokio::test]
    async fn test_successful_quote() {
        let server = create_mock_server(
            "AAPL",
            r#"{"c": 190.5, "d": 2.5, "dp": 1.33, "h": 191.0, "l": 187.2, "o": 188.1, "pc": 188.0, "t": 1760630400}"#,
        )
        .await;
        let provider = FinnhubProvider::new(&server.uri(), Some("secret".to_string()), 5).unwrap();

        let quote = provider
            .try_resolve(&QuoteRequest::new("AAPL", AssetType::Stock, None))
            .await
            .unwrap();
        assert_eq!(quote.price, 190.5);
        assert_eq!(quote.currency, "USD");
        assert_eq!(quote.previous_close, Some(188.0));
        assert_eq!(quote.observed_at.timestamp(), 1760630400);
    }

    #[tokio::test]
    async fn test_zero_price_is_not_found() {
        let server = create_mock_server(
            "ZZZZ",
            r#"{"c": 0, "d": null, "dp": null, "h": 0, "l": 0, "o": 0, "pc": 0, "t": 0}"#,
        )
        .await;
        let provider = FinnhubProvider::new(&server.uri(), Some("secret".to_string()), 5).unwrap();

        let err = provider
            .try_resolve(&QuoteRequest::new("ZZZZ", AssetType::Stock, None))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "symbol_not_found");
    }
}
