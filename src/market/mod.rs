//! The market data engine: price resolution, exchange rates, batch refresh
//! and valuation, wired together from configuration.

pub mod rates;
pub mod refresh;
pub mod resolver;
#[cfg(test)]
pub(crate) mod testing;
pub mod valuation;

use crate::core::config::{AppConfig, AssetPosition};
use crate::core::currency::{self, RatesMap};
use crate::core::error::{EngineError, StoreError};
use crate::core::price::{AssetType, PriceResult, QuoteRequest, QuoteSource};
use crate::providers::RateSource;
use crate::providers::alphavantage::AlphaVantageProvider;
use crate::providers::finnhub::FinnhubProvider;
use crate::providers::frankfurter::FrankfurterProvider;
use crate::providers::tefas::TefasProvider;
use crate::providers::yahoo_finance::{YahooChartProvider, YahooQuoteProvider};
use crate::store::Store;
use crate::store::assets::{AssetRepository, PositionBook};
use crate::store::quotes::QuoteStore;
use crate::store::rates::RateStore;
use crate::store::usage::{ProviderUsageStat, UsageTracker};
use anyhow::{Context, Result};
use chrono::Utc;
use rates::ExchangeRateService;
use refresh::{BatchRefreshJob, RefreshReport};
use resolver::PriceResolver;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use valuation::{PortfolioMetrics, RepairReceiver, ValuationAggregator, repair_queue};

pub struct MarketDataEngine {
    base_currency: String,
    resolver: Arc<PriceResolver>,
    rates: Arc<ExchangeRateService>,
    refresh: BatchRefreshJob,
    valuation: ValuationAggregator,
    usage: UsageTracker,
    assets: Arc<dyn AssetRepository>,
}

impl MarketDataEngine {
    /// Builds the engine and hands back the receiving end of its repair queue,
    /// which the caller drains with [`valuation::drain_repairs`].
    pub fn from_config(config: &AppConfig, store: &dyn Store) -> Result<(Self, RepairReceiver)> {
        let quotes = QuoteStore::from_store(store).context("Failed to open quote store")?;
        let usage = UsageTracker::from_store(store).context("Failed to open usage store")?;
        let rate_store = RateStore::from_store(store).context("Failed to open rate store")?;
        let assets: Arc<dyn AssetRepository> = Arc::new(
            PositionBook::from_store(config.positions.clone(), store)
                .context("Failed to open asset repairs")?,
        );

        let providers = &config.providers;
        let yahoo = Arc::new(YahooQuoteProvider::new(
            &providers.yahoo.base_url,
            providers.yahoo.jitter_ms,
            providers.yahoo.timeout_secs,
        )?);

        let mut resolver = PriceResolver::new(
            quotes.clone(),
            usage.clone(),
            Duration::from_secs(config.cache.quote_ttl_secs),
        );
        let mut fund_source: Option<Arc<dyn QuoteSource>> = None;
        if let Some(tefas) = &providers.tefas {
            let source: Arc<dyn QuoteSource> = Arc::new(TefasProvider::new(
                &tefas.base_url,
                &tefas.currency,
                tefas.window_days,
                tefas.timeout_secs,
            )?);
            resolver = resolver.with_source(Arc::clone(&source));
            fund_source = Some(source);
        }
        resolver = resolver.with_source(yahoo.clone());
        if let Some(av) = &providers.alphavantage {
            resolver = resolver.with_source(Arc::new(AlphaVantageProvider::new(
                &av.base_url,
                av.resolve_api_key("ALPHA_VANTAGE_API_KEY"),
                av.timeout_secs,
            )?));
        }
        if let Some(finnhub) = &providers.finnhub {
            resolver = resolver.with_source(Arc::new(FinnhubProvider::new(
                &finnhub.base_url,
                finnhub.resolve_api_key("FINNHUB_API_KEY"),
                finnhub.timeout_secs,
            )?));
        }
        let resolver = Arc::new(resolver.with_last_resort(Arc::new(YahooChartProvider::new(
            &providers.yahoo.chart_base_url,
            providers.yahoo.timeout_secs,
        )?)));

        let mut rate_source: Option<Arc<dyn RateSource>> = None;
        if let Some(fx) = &providers.frankfurter {
            let source: Arc<dyn RateSource> =
                Arc::new(FrankfurterProvider::new(&fx.base_url, fx.timeout_secs)?);
            rate_source = Some(source);
        }
        let rates = Arc::new(ExchangeRateService::new(
            &config.base_currency,
            &config.rates,
            rate_store,
            rate_source,
            usage.clone(),
        ));

        let mut refresh = BatchRefreshJob::new(
            yahoo,
            quotes,
            Arc::clone(&assets),
            usage.clone(),
            config.refresh.batch_size,
            Duration::from_millis(config.refresh.pause_ms),
        );
        if let Some(source) = fund_source {
            refresh = refresh.with_fund_source(source);
        }

        let (repairs_tx, repairs_rx) = repair_queue();
        let valuation = ValuationAggregator::new(
            Arc::clone(&resolver),
            Arc::clone(&rates),
            &config.base_currency,
            config.valuation.max_concurrency,
        )
        .with_repairs(repairs_tx);

        debug!(base = %config.base_currency, "Market data engine ready");
        Ok((
            Self {
                base_currency: rates.base_currency().to_string(),
                resolver,
                rates,
                refresh,
                valuation,
                usage,
                assets,
            },
            repairs_rx,
        ))
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    pub fn assets(&self) -> Arc<dyn AssetRepository> {
        Arc::clone(&self.assets)
    }

    /// Current positions with any applied repairs.
    pub async fn tracked_positions(&self) -> Result<Vec<AssetPosition>, StoreError> {
        self.assets.list_positions().await
    }

    pub async fn get_market_price(
        &self,
        symbol: &str,
        asset_type: AssetType,
        exchange: Option<&str>,
    ) -> Result<Option<PriceResult>, EngineError> {
        let request = QuoteRequest::new(symbol, asset_type, exchange);
        let quote = self.resolver.resolve_price(&request).await?;
        Ok(quote.as_ref().map(PriceResult::from))
    }

    pub async fn convert_currency(
        &self,
        amount: f64,
        from: &str,
        to: &str,
        rates_override: Option<&RatesMap>,
    ) -> f64 {
        match rates_override {
            Some(rates) => currency::convert_currency(amount, from, to, rates),
            None => {
                let rates = self.rates.get_rates().await;
                currency::convert_currency(amount, from, to, &rates)
            }
        }
    }

    pub async fn get_exchange_rates(&self) -> RatesMap {
        self.rates.get_rates().await
    }

    pub async fn update_all_prices(&self) -> RefreshReport {
        self.refresh.refresh_all().await
    }

    pub async fn get_portfolio_metrics(
        &self,
        positions: &[AssetPosition],
        rates_override: Option<&RatesMap>,
    ) -> Result<PortfolioMetrics, EngineError> {
        self.valuation
            .compute_valuation(positions, rates_override)
            .await
    }

    /// Today's (UTC) usage rows, ordered by provider.
    pub async fn get_daily_stats(&self) -> Vec<ProviderUsageStat> {
        self.usage.daily_stats(Utc::now().date_naive()).await
    }
}
