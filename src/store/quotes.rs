//! Durable last-known price per symbol.

use super::{KeyValueCollection, QUOTES, Store};
use crate::core::error::StoreError;
use crate::core::price::Quote;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedQuoteRecord {
    pub symbol: String,
    pub price: f64,
    pub currency: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub previous_close: Option<f64>,
}

impl PersistedQuoteRecord {
    pub fn into_quote(self) -> Quote {
        let mut quote = Quote::new(&self.symbol, self.price, &self.currency, self.updated_at);
        quote.previous_close = self.previous_close;
        quote
    }
}

/// One record per symbol, last write wins. Never deletes.
///
/// Neither operation surfaces a [`StoreError`]: a failed write is logged and
/// dropped, a failed read is reported as a miss.
#[derive(Clone)]
pub struct QuoteStore {
    collection: Arc<dyn KeyValueCollection>,
}

impl QuoteStore {
    pub fn new(collection: Arc<dyn KeyValueCollection>) -> Self {
        Self { collection }
    }

    pub fn from_store(store: &dyn Store) -> Result<Self, StoreError> {
        Ok(Self::new(store.collection(QUOTES)?))
    }

    pub async fn upsert(
        &self,
        symbol: &str,
        price: f64,
        currency: &str,
        updated_at: DateTime<Utc>,
        previous_close: Option<f64>,
    ) {
        let record = PersistedQuoteRecord {
            symbol: symbol.to_string(),
            price,
            currency: currency.to_string(),
            updated_at,
            previous_close,
        };
        if let Err(e) = self.try_upsert(&record).await {
            warn!(symbol, error = %e, "Failed to persist quote");
        }
    }

    pub async fn upsert_quote(&self, quote: &Quote) {
        self.upsert(
            &quote.symbol,
            quote.price,
            &quote.currency,
            quote.observed_at,
            quote.previous_close,
        )
        .await;
    }

    async fn try_upsert(&self, record: &PersistedQuoteRecord) -> Result<(), StoreError> {
        let value = serde_json::to_vec(record)?;
        self.collection.put(record.symbol.as_bytes(), &value).await?;
        debug!(symbol = %record.symbol, price = record.price, "Persisted quote");
        Ok(())
    }

    pub async fn get(&self, symbol: &str) -> Option<PersistedQuoteRecord> {
        match self.try_get(symbol).await {
            Ok(record) => record,
            Err(e) => {
                warn!(symbol, error = %e, "Failed to read persisted quote, treating as miss");
                None
            }
        }
    }

    async fn try_get(&self, symbol: &str) -> Result<Option<PersistedQuoteRecord>, StoreError> {
        match self.collection.get(symbol.as_bytes()).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}
