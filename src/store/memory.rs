use super::KeyValueCollection;
use crate::core::error::StoreError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::debug;

/// In-memory collection, used when no data directory is available and in tests.
#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<Vec<u8>, Vec<u8>>>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable("memory collection poisoned".into()))
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self.entries()?.get(key).cloned();
        debug!(
            hit = value.is_some(),
            "Memory GET for key: {}",
            String::from_utf8_lossy(key)
        );
        Ok(value)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.entries()?.insert(key.to_vec(), value.to_vec());
        debug!("Memory PUT for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<(), StoreError> {
        self.entries()?.remove(key);
        debug!("Memory REMOVE for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        Ok(self
            .entries()?
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
