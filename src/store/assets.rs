//! Read access to tracked positions and best-effort repairs of their metadata.

use super::{ASSET_REPAIRS, KeyValueCollection, Store};
use crate::core::config::AssetPosition;
use crate::core::error::StoreError;
use crate::core::price::{AssetType, QuoteRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Correction to a position's stored currency and/or display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRepair {
    pub position_id: String,
    pub currency: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct AssetOverride {
    currency: Option<String>,
    name: Option<String>,
}

/// The external asset store, reduced to what the engine reads and repairs.
#[async_trait]
pub trait AssetRepository: Send + Sync {
    async fn list_positions(&self) -> Result<Vec<AssetPosition>, StoreError>;

    async fn apply_repair(&self, repair: &AssetRepair) -> Result<(), StoreError>;

    /// Distinct lookup symbols of every position a batch refresh can quote.
    async fn tracked_symbols(&self) -> Result<Vec<String>, StoreError> {
        let symbols: BTreeSet<String> = self
            .list_positions()
            .await?
            .iter()
            .filter(|p| !matches!(p.asset_type, AssetType::Cash | AssetType::Fund))
            .map(|p| {
                QuoteRequest::new(&p.symbol, p.asset_type, p.exchange.as_deref()).lookup_symbol()
            })
            .filter(|s| !s.is_empty())
            .collect();
        Ok(symbols.into_iter().collect())
    }

    /// Distinct fund codes, which only the fund quotation service can price.
    async fn tracked_funds(&self) -> Result<Vec<String>, StoreError> {
        let codes: BTreeSet<String> = self
            .list_positions()
            .await?
            .iter()
            .filter(|p| p.asset_type == AssetType::Fund)
            .map(|p| QuoteRequest::new(&p.symbol, p.asset_type, None).lookup_symbol())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(codes.into_iter().collect())
    }
}

/// Positions from the config file with persisted repairs laid over them.
pub struct PositionBook {
    positions: Vec<AssetPosition>,
    overrides: Arc<dyn KeyValueCollection>,
}

impl PositionBook {
    pub fn new(positions: Vec<AssetPosition>, overrides: Arc<dyn KeyValueCollection>) -> Self {
        Self {
            positions,
            overrides,
        }
    }

    pub fn from_store(positions: Vec<AssetPosition>, store: &dyn Store) -> Result<Self, StoreError> {
        Ok(Self::new(positions, store.collection(ASSET_REPAIRS)?))
    }

    async fn load_override(&self, id: &str) -> Result<AssetOverride, StoreError> {
        match self.overrides.get(id.as_bytes()).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(AssetOverride::default()),
        }
    }
}

#[async_trait]
impl AssetRepository for PositionBook {
    async fn list_positions(&self) -> Result<Vec<AssetPosition>, StoreError> {
        let mut positions = Vec::with_capacity(self.positions.len());
        for position in &self.positions {
            let over = self.load_override(&position.id).await?;
            let mut position = position.clone();
            if let Some(currency) = over.currency {
                position.currency = currency;
            }
            if let Some(name) = over.name {
                position.name = Some(name);
            }
            positions.push(position);
        }
        Ok(positions)
    }

    async fn apply_repair(&self, repair: &AssetRepair) -> Result<(), StoreError> {
        let mut over = self.load_override(&repair.position_id).await?;
        if let Some(currency) = &repair.currency {
            over.currency = Some(currency.clone());
        }
        if let Some(name) = &repair.name {
            over.name = Some(name.clone());
        }
        self.overrides
            .put(repair.position_id.as_bytes(), &serde_json::to_vec(&over)?)
            .await?;
        debug!(position = %repair.position_id, "Applied asset repair");
        Ok(())
    }
}
