use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::core::currency::RatesMap;
use crate::core::error::ProviderError;
use crate::providers::util::{build_client, get_json};

const PROVIDER: &str = "frankfurter";

/// Public FX table source.
#[async_trait]
pub trait RateSource: Send + Sync {
    fn name(&self) -> &str;

    /// Full table of rates relative to `base`. The base itself may be absent.
    async fn fetch_latest(&self, base: &str) -> Result<RatesMap, ProviderError>;
}

#[derive(Deserialize, Debug)]
struct LatestResponse {
    #[serde(default)]
    rates: RatesMap,
}

pub struct FrankfurterProvider {
    base_url: String,
    client: reqwest::Client,
}

impl FrankfurterProvider {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ProviderError> {
        Ok(FrankfurterProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_client(PROVIDER, timeout_secs)?,
        })
    }
}

#[async_trait]
impl RateSource for FrankfurterProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    #[instrument(name = "FrankfurterRatesFetch", skip(self))]
    async fn fetch_latest(&self, base: &str) -> Result<RatesMap, ProviderError> {
        let url = format!("{}/latest?from={}", self.base_url, urlencoding::encode(base));
        let data: LatestResponse = get_json(&self.client, PROVIDER, &url, base).await?;

        if data.rates.is_empty() {
            return Err(ProviderError::malformed(PROVIDER, "rate table is empty"));
        }
        debug!(count = data.rates.len(), "Received exchange rates");
        Ok(data.rates)
    }
}
