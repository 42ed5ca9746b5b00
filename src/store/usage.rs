//! Per-provider, per-day success and error counters.

use super::{KeyValueCollection, Store, USAGE};
use crate::core::error::StoreError;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderUsageStat {
    pub provider: String,
    pub date_key: String,
    pub success_count: u64,
    pub error_count: u64,
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[derive(Clone)]
pub struct UsageTracker {
    collection: Arc<dyn KeyValueCollection>,
    // Serialises the read-modify-write of a counter across tasks.
    write_lock: Arc<Mutex<()>>,
}

impl UsageTracker {
    pub fn new(collection: Arc<dyn KeyValueCollection>) -> Self {
        Self {
            collection,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_store(store: &dyn Store) -> Result<Self, StoreError> {
        Ok(Self::new(store.collection(USAGE)?))
    }

    /// Counts one call against today's (UTC) row for `provider`.
    pub async fn track(&self, provider: &str, success: bool) {
        self.track_on(provider, success, Utc::now().date_naive()).await;
    }

    pub async fn track_on(&self, provider: &str, success: bool, date: NaiveDate) {
        if let Err(e) = self.try_track(provider, success, date).await {
            warn!(provider, error = %e, "Failed to record provider usage");
        }
    }

    async fn try_track(
        &self,
        provider: &str,
        success: bool,
        date: NaiveDate,
    ) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let date_key = date_key(date);
        let key = format!("{date_key}|{provider}");

        let mut stat = match self.collection.get(key.as_bytes()).await? {
            Some(bytes) => serde_json::from_slice(&bytes)?,
            None => ProviderUsageStat {
                provider: provider.to_string(),
                date_key,
                success_count: 0,
                error_count: 0,
            },
        };
        if success {
            stat.success_count += 1;
        } else {
            stat.error_count += 1;
        }
        self.collection
            .put(key.as_bytes(), &serde_json::to_vec(&stat)?)
            .await
    }

    /// All rows for `date`, ordered by provider name.
    pub async fn daily_stats(&self, date: NaiveDate) -> Vec<ProviderUsageStat> {
        let prefix = format!("{}|", date_key(date));
        let rows = match self.collection.scan_prefix(prefix.as_bytes()).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Failed to read provider usage");
                return Vec::new();
            }
        };

        let mut stats: Vec<ProviderUsageStat> = rows
            .into_iter()
            .filter_map(|(_, bytes)| serde_json::from_slice(&bytes).ok())
            .collect();
        stats.sort_by(|a, b| a.provider.cmp(&b.provider));
        stats
    }
}
