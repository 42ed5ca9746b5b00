pub mod cli;
pub mod core;
pub mod market;
pub mod providers;
pub mod store;

use crate::core::config::AppConfig;
use crate::core::price::AssetType;
use crate::market::MarketDataEngine;
use crate::market::valuation::drain_repairs;
use crate::store::KeyValueStore;
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

/// Commands that need a configured engine.
#[derive(Debug, Clone, PartialEq)]
pub enum AppCommand {
    Summary,
    Quote {
        symbol: String,
        asset_type: AssetType,
        exchange: Option<String>,
    },
    Rates,
    Refresh,
    Stats,
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("portval starting...");

    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");

    let data_path = config.default_data_path()?;
    let store = KeyValueStore::open(&data_path);
    let (engine, repairs) = MarketDataEngine::from_config(&config, &store)?;
    let repair_worker = tokio::spawn(drain_repairs(repairs, engine.assets()));

    let result = match command {
        AppCommand::Summary => cli::summary::run(&engine).await,
        AppCommand::Quote {
            symbol,
            asset_type,
            exchange,
        } => cli::quote::run(&engine, &symbol, asset_type, exchange.as_deref()).await,
        AppCommand::Rates => cli::rates::run(&engine).await,
        AppCommand::Refresh => cli::refresh::run(&engine).await,
        AppCommand::Stats => cli::stats::run(&engine).await,
    };

    // Closing the engine closes the repair queue, letting the worker finish.
    drop(engine);
    match repair_worker.await {
        Ok(applied) if applied > 0 => info!(applied, "Applied asset repairs"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Repair worker failed"),
    }
    store
        .persist()
        .with_context(|| format!("Failed to persist store in {}", data_path.display()))?;

    result
}
