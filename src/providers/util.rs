use crate::core::error::ProviderError;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = "portval/0.1";

pub fn build_client(provider: &str, timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::unavailable(provider, format!("client setup failed: {e}")))
}

/// Retries an async request with configurable attempts and delays
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `retries`: Number of retry attempts (total runs = 1 initial + retries)
/// - `delay_ms`: Milliseconds between retry attempts
///
/// # Returns
/// Either the successful response or the transport error of the last attempt
pub async fn with_retry<F, Fut, T>(
    mut operation: F,
    retries: usize,
    delay_ms: u64,
) -> Result<T, reqwest::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt > retries {
                    return Err(err);
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying...",
                    attempt, retries, err
                );
                attempt += 1;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

/// Sends a GET and decodes the JSON body, mapping every failure onto the
/// provider error taxonomy. `symbol` names what a 404 was looking for.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    provider: &str,
    url: &str,
    symbol: &str,
) -> Result<T, ProviderError> {
    debug!(provider, "Requesting {}", url);
    let response = with_retry(|| client.get(url).send(), 1, 250)
        .await
        .map_err(|e| ProviderError::unavailable(provider, format!("request failed: {e}")))?;

    let status = response.status();
    match status {
        s if s.is_success() => {}
        StatusCode::TOO_MANY_REQUESTS => {
            return Err(ProviderError::rate_limited(provider, format!("HTTP {status}")));
        }
        StatusCode::NOT_FOUND => return Err(ProviderError::not_found(provider, symbol)),
        _ => return Err(ProviderError::unavailable(provider, format!("HTTP {status}"))),
    }

    let text = response
        .text()
        .await
        .map_err(|e| ProviderError::unavailable(provider, format!("failed to read body: {e}")))?;
    if text.trim().is_empty() {
        return Err(ProviderError::malformed(provider, "empty response body"));
    }
    serde_json::from_str(&text).map_err(|e| ProviderError::malformed(provider, e.to_string()))
}

/// Uniform random delay in `[0, max_ms)`.
pub fn jitter(max_ms: u64) -> Duration {
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(fastrand::u64(0..max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Deserialize)]
    struct Payload {
        value: f64,
    }

    async fn serve(status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    async fn fetch(server: &MockServer) -> Result<Payload, ProviderError> {
        let client = build_client("test", 5).unwrap();
        get_json(&client, "test", &format!("{}/data", server.uri()), "XYZ").await
    }

    #[tokio::test]
    async fn test_get_json_success() {
        let server = serve(200, r#"{"value": 1.5}"#).await;
        assert_eq!(fetch(&server).await.unwrap().value, 1.5);
    }

    #[tokio::test]
    async fn test_get_json_status_mapping() {
        let err = fetch(&serve(429, "").await).await.unwrap_err();
        assert_eq!(err.kind(), "rate_limited");

        let err = fetch(&serve(404, "").await).await.unwrap_err();
        assert_eq!(err.kind(), "symbol_not_found");

        let err = fetch(&serve(503, "").await).await.unwrap_err();
        assert_eq!(err.kind(), "unavailable");
    }

    #[tokio::test]
    async fn test_get_json_malformed_body() {
        let err = fetch(&serve(200, "").await).await.unwrap_err();
        assert_eq!(err.kind(), "malformed_response");

        let err = fetch(&serve(200, r#"{"other": true}"#).await).await.unwrap_err();
        assert_eq!(err.kind(), "malformed_response");
    }

    #[test]
    fn test_jitter_bounds() {
        assert_eq!(jitter(0), Duration::ZERO);
        for _ in 0..100 {
            assert!(jitter(50) < Duration::from_millis(50));
        }
    }
}
