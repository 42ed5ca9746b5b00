//! Per-asset and portfolio-wide valuation in the base currency.

use crate::core::config::AssetPosition;
use crate::core::currency::{RatesMap, convert_currency};
use crate::core::error::EngineError;
use crate::core::price::{AssetType, Quote, QuoteRequest};
use crate::market::rates::ExchangeRateService;
use crate::market::resolver::PriceResolver;
use crate::store::assets::{AssetRepair, AssetRepository};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub type RepairSender = mpsc::UnboundedSender<AssetRepair>;
pub type RepairReceiver = mpsc::UnboundedReceiver<AssetRepair>;

pub fn repair_queue() -> (RepairSender, RepairReceiver) {
    mpsc::unbounded_channel()
}

/// Applies queued repairs until every sender is dropped. Returns how many were applied.
pub async fn drain_repairs(mut rx: RepairReceiver, repository: Arc<dyn AssetRepository>) -> usize {
    let mut applied = 0;
    while let Some(repair) = rx.recv().await {
        match repository.apply_repair(&repair).await {
            Ok(()) => applied += 1,
            Err(e) => warn!(position = %repair.position_id, error = %e, "Asset repair failed"),
        }
    }
    debug!(applied, "Repair queue drained");
    applied
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriceSource {
    Market,
    /// No source could price the asset; the stored buy price stands in.
    CostBasis,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedAssetValue {
    pub id: String,
    pub symbol: String,
    pub name: Option<String>,
    pub asset_type: AssetType,
    pub quantity: f64,
    pub buy_price: f64,
    pub current_price: f64,
    pub currency: String,
    pub price_source: PriceSource,
    pub total_value_native: f64,
    pub total_value_in_base: f64,
    pub cost_basis_in_base: f64,
    pub pl_percent: f64,
    pub daily_change_in_base: f64,
    pub daily_change_percent: f64,
    pub weight_percent: f64,
    pub rank: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioMetrics {
    pub base_currency: String,
    pub total_value_in_base: f64,
    pub total_cost_in_base: f64,
    pub total_pl_percent: f64,
    pub daily_change_in_base: f64,
    pub per_asset_values: Vec<ResolvedAssetValue>,
}

fn validate(position: &AssetPosition) -> Result<(), EngineError> {
    let invalid = |reason: &str| EngineError::InvalidPosition {
        id: position.id.clone(),
        reason: reason.to_string(),
    };
    if position.symbol.trim().is_empty() {
        return Err(invalid("symbol is empty"));
    }
    if !position.quantity.is_finite() {
        return Err(invalid("quantity is not a finite number"));
    }
    if !position.buy_price.is_finite() {
        return Err(invalid("buy price is not a finite number"));
    }
    Ok(())
}

fn percent_change(current: f64, basis: f64) -> f64 {
    if basis != 0.0 {
        ((current - basis) / basis) * 100.0
    } else {
        0.0
    }
}

pub struct ValuationAggregator {
    resolver: Arc<PriceResolver>,
    rates: Arc<ExchangeRateService>,
    base_currency: String,
    max_concurrency: usize,
    repairs: Option<RepairSender>,
}

impl ValuationAggregator {
    pub fn new(
        resolver: Arc<PriceResolver>,
        rates: Arc<ExchangeRateService>,
        base_currency: &str,
        max_concurrency: usize,
    ) -> Self {
        Self {
            resolver,
            rates,
            base_currency: base_currency.to_uppercase(),
            max_concurrency: max_concurrency.max(1),
            repairs: None,
        }
    }

    pub fn with_repairs(mut self, repairs: RepairSender) -> Self {
        self.repairs = Some(repairs);
        self
    }

    /// Values every position concurrently and sums them in the base currency.
    ///
    /// `rates_override` replaces the exchange rate service, mainly for
    /// deterministic callers. Invalid positions are rejected before any I/O.
    pub async fn compute_valuation(
        &self,
        positions: &[AssetPosition],
        rates_override: Option<&RatesMap>,
    ) -> Result<PortfolioMetrics, EngineError> {
        positions.iter().try_for_each(validate)?;

        let rates = match rates_override {
            Some(rates) => rates.clone(),
            None => self.rates.get_rates().await,
        };

        let mut values: Vec<ResolvedAssetValue> = stream::iter(positions)
            .map(|position| self.value_position(position, &rates))
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let total_value_in_base: f64 = values.iter().map(|v| v.total_value_in_base).sum();
        let total_cost_in_base: f64 = values.iter().map(|v| v.cost_basis_in_base).sum();
        let daily_change_in_base: f64 = values.iter().map(|v| v.daily_change_in_base).sum();

        for value in &mut values {
            value.weight_percent = if total_value_in_base > 0.0 {
                value.total_value_in_base / total_value_in_base * 100.0
            } else {
                0.0
            };
        }
        values.sort_by(|a, b| a.rank.cmp(&b.rank).then_with(|| a.symbol.cmp(&b.symbol)));

        info!(
            assets = values.len(),
            total = total_value_in_base,
            base = %self.base_currency,
            "Computed portfolio valuation"
        );
        Ok(PortfolioMetrics {
            base_currency: self.base_currency.clone(),
            total_value_in_base,
            total_cost_in_base,
            total_pl_percent: percent_change(total_value_in_base, total_cost_in_base),
            daily_change_in_base,
            per_asset_values: values,
        })
    }

    async fn quote_for(&self, position: &AssetPosition) -> Option<Quote> {
        if position.asset_type == AssetType::Cash {
            return Some(Quote::new(
                &position.symbol,
                1.0,
                &position.currency.to_uppercase(),
                Utc::now(),
            ));
        }
        let request = QuoteRequest::new(
            &position.symbol,
            position.asset_type,
            position.exchange.as_deref(),
        );
        self.resolver
            .resolve_price(&request)
            .await
            .unwrap_or_else(|e| {
                warn!(position = %position.id, error = %e, "Could not resolve position");
                None
            })
    }

    async fn value_position(&self, position: &AssetPosition, rates: &RatesMap) -> ResolvedAssetValue {
        let quote = self.quote_for(position).await;

        let (current_price, currency, price_source) = match &quote {
            Some(q) => (q.price, q.currency.clone(), PriceSource::Market),
            None => (
                position.buy_price,
                position.currency.clone(),
                PriceSource::CostBasis,
            ),
        };
        let name = self.queue_repairs(position, quote.as_ref(), &currency);

        let total_value_native = current_price * position.quantity;
        let cost_basis_native = position.buy_price * position.quantity;
        let daily_change_native = quote.as_ref().map_or(0.0, |q| q.change()) * position.quantity;
        let base = self.base_currency.as_str();

        ResolvedAssetValue {
            id: position.id.clone(),
            symbol: position.symbol.clone(),
            name,
            asset_type: position.asset_type,
            quantity: position.quantity,
            buy_price: position.buy_price,
            current_price,
            total_value_in_base: convert_currency(total_value_native, &currency, base, rates),
            cost_basis_in_base: convert_currency(cost_basis_native, &currency, base, rates),
            pl_percent: percent_change(total_value_native, cost_basis_native),
            daily_change_in_base: convert_currency(daily_change_native, &currency, base, rates),
            daily_change_percent: quote.as_ref().map_or(0.0, |q| q.change_percent()),
            total_value_native,
            currency,
            price_source,
            weight_percent: 0.0,
            rank: position.rank,
        }
    }

    /// Publishes currency and name corrections; returns the name to display.
    fn queue_repairs(
        &self,
        position: &AssetPosition,
        quote: Option<&Quote>,
        currency: &str,
    ) -> Option<String> {
        let currency_fix = (quote.is_some() && !currency.eq_ignore_ascii_case(&position.currency))
            .then(|| currency.to_string());
        let missing_name = position
            .name
            .as_deref()
            .is_none_or(|n| n.trim().is_empty() || n == position.symbol);
        let name_fix = quote
            .and_then(|q| q.name.clone())
            .filter(|_| missing_name);

        let name = name_fix.clone().or_else(|| position.name.clone());
        if currency_fix.is_none() && name_fix.is_none() {
            return name;
        }

        let repair = AssetRepair {
            position_id: position.id.clone(),
            currency: currency_fix,
            name: name_fix,
        };
        debug!(?repair, "Queueing asset repair");
        if let Some(tx) = &self.repairs {
            if tx.send(repair).is_err() {
                warn!(position = %position.id, "Repair queue closed, dropping repair");
            }
        }
        name
    }
}
