use super::KeyValueCollection;
use crate::core::error::StoreError;
use async_trait::async_trait;
use fjall::PartitionHandle;
use tracing::debug;

/// Collection stored in one fjall partition.
pub struct DiskCollection {
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(partition: PartitionHandle) -> Self {
        Self { partition }
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self.partition.get(key)?.map(|slice| slice.to_vec());
        debug!(
            hit = value.is_some(),
            "Disk GET for key: {}",
            String::from_utf8_lossy(key)
        );
        Ok(value)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.partition.insert(key, value)?;
        debug!("Disk PUT for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<(), StoreError> {
        self.partition.remove(key)?;
        debug!("Disk REMOVE for key: {}", String::from_utf8_lossy(key));
        Ok(())
    }

    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let mut entries = Vec::new();
        for item in self.partition.prefix(prefix) {
            let (key, value) = item?;
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }
}
