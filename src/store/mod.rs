pub mod assets;
pub mod disk;
pub mod memory;
pub mod quotes;
pub mod rates;
pub mod usage;

use crate::core::error::StoreError;
use async_trait::async_trait;
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, RwLock},
};
use tracing::{debug, warn};

pub const QUOTES: &str = "quotes";
pub const RATES: &str = "rates";
pub const USAGE: &str = "usage";
pub const ASSET_REPAIRS: &str = "asset_repairs";

/// Raw byte-oriented collection every typed store is built on.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    async fn remove(&self, key: &[u8]) -> Result<(), StoreError>;
    /// All entries whose key starts with `prefix`, in key order.
    async fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError>;
}

pub trait Store: Send + Sync {
    fn collection(&self, name: &str) -> Result<Arc<dyn KeyValueCollection>, StoreError>;
}

/// Named collections backed by a fjall keyspace, or by memory when no
/// keyspace could be opened.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Keyspace>,
}

impl KeyValueStore {
    /// Opens the keyspace under `data_path/store`, degrading to memory on failure.
    pub fn open(data_path: &Path) -> Self {
        let store_dir = data_path.join("store");
        let keyspace = match fjall::Config::new(&store_dir).open() {
            Ok(keyspace) => Some(keyspace),
            Err(e) => {
                warn!(
                    path = %store_dir.display(),
                    error = %e,
                    "Failed to open persistent store, falling back to memory"
                );
                None
            }
        };

        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.keyspace.is_some()
    }

    /// Syncs the journal to disk. A no-op for the in-memory fallback.
    pub fn persist(&self) -> Result<(), StoreError> {
        if let Some(keyspace) = &self.keyspace {
            keyspace.persist(fjall::PersistMode::SyncAll)?;
        }
        Ok(())
    }
}

impl Default for KeyValueStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl Store for KeyValueStore {
    fn collection(&self, name: &str) -> Result<Arc<dyn KeyValueCollection>, StoreError> {
        {
            let collections = self
                .collections
                .read()
                .map_err(|_| StoreError::Unavailable("collection registry poisoned".into()))?;
            if let Some(collection) = collections.get(name) {
                return Ok(Arc::clone(collection));
            }
        }

        let mut collections = self
            .collections
            .write()
            .map_err(|_| StoreError::Unavailable("collection registry poisoned".into()))?;
        if let Some(collection) = collections.get(name) {
            return Ok(Arc::clone(collection));
        }

        let collection: Arc<dyn KeyValueCollection> = match &self.keyspace {
            Some(keyspace) => {
                let partition =
                    keyspace.open_partition(name, PartitionCreateOptions::default())?;
                debug!(collection = name, "Opened persistent collection");
                Arc::new(DiskCollection::new(partition))
            }
            None => {
                debug!(collection = name, "Created in-memory collection");
                Arc::new(MemoryCollection::new())
            }
        };
        collections.insert(name.to_string(), Arc::clone(&collection));
        Ok(collection)
    }
}
