//! Fund quotation service keyed by fund code rather than a ticker.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::error::ProviderError;
use crate::core::price::{AssetType, Quote, QuoteRequest, QuoteSource};
use crate::providers::util::{build_client, get_json};

const PROVIDER: &str = "tefas";

#[derive(Deserialize, Debug)]
struct FundSearchResponse {
    #[serde(default)]
    results: Vec<FundSearchItem>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct FundSearchItem {
    fund_code: String,
    fund_name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct FundHistoryResponse {
    #[serde(default)]
    data: Vec<FundPricePoint>,
}

#[derive(Deserialize, Debug)]
struct FundPricePoint {
    date: NaiveDate,
    price: Option<f64>,
}

/// Most recent point with a usable price.
fn latest_price(points: &[FundPricePoint]) -> Option<(NaiveDate, f64)> {
    points
        .iter()
        .filter_map(|p| p.price.filter(|v| *v > 0.0).map(|v| (p.date, v)))
        .max_by_key(|(date, _)| *date)
}

pub struct TefasProvider {
    base_url: String,
    currency: String,
    window_days: i64,
    client: reqwest::Client,
}

impl TefasProvider {
    pub fn new(
        base_url: &str,
        currency: &str,
        window_days: i64,
        timeout_secs: u64,
    ) -> Result<Self, ProviderError> {
        Ok(TefasProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            currency: currency.to_uppercase(),
            window_days: window_days.max(1),
            client: build_client(PROVIDER, timeout_secs)?,
        })
    }

    /// Confirms the code exists and returns the fund's title.
    async fn validate_code(&self, code: &str) -> Result<Option<String>, ProviderError> {
        let url = format!(
            "{}/funds/search?q={}",
            self.base_url,
            urlencoding::encode(code)
        );
        let data: FundSearchResponse = get_json(&self.client, PROVIDER, &url, code).await?;
        data.results
            .into_iter()
            .find(|item| item.fund_code.eq_ignore_ascii_case(code))
            .map(|item| item.fund_name)
            .ok_or_else(|| ProviderError::not_found(PROVIDER, code))
    }
}

#[async_trait]
impl QuoteSource for TefasProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn supports(&self, asset_type: AssetType) -> bool {
        asset_type.needs_fund_provider()
    }

    #[instrument(name = "TefasFundFetch", skip(self, request), fields(symbol = %request.symbol))]
    async fn try_resolve(&self, request: &QuoteRequest) -> Result<Quote, ProviderError> {
        let code = request.lookup_symbol();
        let fund_name = self.validate_code(&code).await?;

        let today = Utc::now().date_naive();
        let from = today - Duration::days(self.window_days);
        let url = format!(
            "{}/funds/{}/history?from={}&to={}",
            self.base_url,
            urlencoding::encode(&code),
            from.format("%Y-%m-%d"),
            today.format("%Y-%m-%d")
        );
        let history: FundHistoryResponse = get_json(&self.client, PROVIDER, &url, &code).await?;

        let (date, price) = latest_price(&history.data).ok_or_else(|| {
            ProviderError::malformed(
                PROVIDER,
                format!("no priced day in the last {} days", self.window_days),
            )
        })?;
        debug!(%date, price, "Fund price received");

        let observed_at = date.and_time(chrono::NaiveTime::MIN).and_utc();
        let mut quote = Quote::new(&code, price, &self.currency, observed_at);
        quote.name = fund_name;
        Ok(quote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn create_mock_server(search: &str, history: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/funds/search"))
            .and(query_param("q", "AFT"))
            .respond_with(ResponseTemplate::new(200).set_body_string(search))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/funds/AFT/history"))
            .respond_with(ResponseTemplate::new(200).set_body_string(history))
            .mount(&mock_server)
            .await;
        mock_server
    }

    fn fund(code: &str) -> QuoteRequest {
        QuoteRequest::new(code, AssetType::Fund, None)
    }

    #[tokio::test]
    async fn test_latest_priced_day_wins() {
        let server = create_mock_server(
            r#"{"results": [{"fundCode": "AFT", "fundName": "Ak Portfoy Yeni Teknolojiler"}]}"#,
            r#"{"data": [
                {"date": "2026-10-14", "price": 0.412},
                {"date": "2026-10-16", "price": 0.425},
                {"date": "2026-10-15", "price": 0.418},
                {"date": "2026-10-17", "price": 0}
            ]}"#,
        )
        .await;
        let provider = TefasProvider::new(&server.uri(), "TRY", 7, 5).unwrap();

        let quote = provider.try_resolve(&fund("aft")).await.unwrap();
        assert_eq!(quote.symbol, "AFT");
        assert_eq!(quote.price, 0.425);
        assert_eq!(quote.currency, "TRY");
        assert_eq!(quote.observed_at.date_naive().to_string(), "2026-10-16");
        assert_eq!(quote.name.as_deref(), Some("Ak Portfoy Yeni Teknolojiler"));
    }

    #[tokio::test]
    async fn test_unknown_code_is_not_found() {
        let server = create_mock_server(
            r#"{"results": [{"fundCode": "AFTX", "fundName": "Other"}]}"#,
            r#"{"data": []}"#,
        )
        .await;
        let provider = TefasProvider::new(&server.uri(), "TRY", 7, 5).unwrap();

        let err = provider.try_resolve(&fund("AFT")).await.unwrap_err();
        assert_eq!(err.kind(), "symbol_not_found");
    }

    #[tokio::test]
    async fn test_empty_history_is_malformed() {
        let server = create_mock_server(
            r#"{"results": [{"fundCode": "AFT"}]}"#,
            r#"{"data": []}"#,
        )
        .await;
        let provider = TefasProvider::new(&server.uri(), "TRY", 7, 5).unwrap();

        let err = provider.try_resolve(&fund("AFT")).await.unwrap_err();
        assert_eq!(err.kind(), "malformed_response");
    }

    #[test]
    fn test_supports_only_funds() {
        let provider = TefasProvider::new("http://localhost", "TRY", 7, 5).unwrap();
        assert!(provider.supports(AssetType::Fund));
        assert!(!provider.supports(AssetType::Stock));
    }
}
