use super::{KeyValueCollection, RATES, Store};
use crate::core::currency::RatesMap;
use crate::core::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Rate of one currency relative to `base`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRateRecord {
    /// Empty for records written before the base was stored.
    #[serde(default)]
    pub base: String,
    pub currency: String,
    pub rate: f64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct RateStore {
    collection: Arc<dyn KeyValueCollection>,
}

impl RateStore {
    pub fn new(collection: Arc<dyn KeyValueCollection>) -> Self {
        Self { collection }
    }

    pub fn from_store(store: &dyn Store) -> Result<Self, StoreError> {
        Ok(Self::new(store.collection(RATES)?))
    }

    /// Every stored rate relative to `base`. Rates against any other base are
    /// skipped. A read failure yields an empty list.
    pub async fn all(&self, base: &str) -> Vec<ExchangeRateRecord> {
        match self.try_all().await {
            Ok(records) => records
                .into_iter()
                .filter(|r| r.base.eq_ignore_ascii_case(base))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to read stored exchange rates");
                Vec::new()
            }
        }
    }

    async fn try_all(&self) -> Result<Vec<ExchangeRateRecord>, StoreError> {
        self.collection
            .scan_prefix(b"")
            .await?
            .into_iter()
            .map(|(_, bytes)| serde_json::from_slice(&bytes).map_err(StoreError::from))
            .collect()
    }

    /// Persists every rate in `rates` against `base`, skipping failures one by one.
    pub async fn upsert_all(
        &self,
        base: &str,
        rates: &RatesMap,
        updated_at: DateTime<Utc>,
    ) -> usize {
        let mut written = 0;
        for (currency, rate) in rates {
            let record = ExchangeRateRecord {
                base: base.to_uppercase(),
                currency: currency.clone(),
                rate: *rate,
                updated_at,
            };
            match self.try_upsert(&record).await {
                Ok(()) => written += 1,
                Err(e) => warn!(currency = %currency, error = %e, "Failed to persist rate"),
            }
        }
        debug!(base, written, "Persisted exchange rates");
        written
    }

    async fn try_upsert(&self, record: &ExchangeRateRecord) -> Result<(), StoreError> {
        let value = serde_json::to_vec(record)?;
        self.collection.put(record.currency.as_bytes(), &value).await
    }
}
