use crate::core::currency::normalize_currency;
use crate::core::error::StoreError;
use crate::core::price::{AssetType, BatchQuoteSource, Quote, QuoteRequest, QuoteSource};
use crate::store::assets::AssetRepository;
use crate::store::quotes::QuoteStore;
use crate::store::usage::UsageTracker;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchError {
    pub symbols: Vec<String>,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RefreshReport {
    pub updated_count: usize,
    pub total_symbols: usize,
    pub errors: Vec<BatchError>,
}

/// Bulk-refreshes the quote store for every tracked symbol, one multi-symbol
/// call per batch. Fund codes go one request each to the fund source. A failed
/// request is recorded and the job moves on.
pub struct BatchRefreshJob {
    source: Arc<dyn BatchQuoteSource>,
    fund_source: Option<Arc<dyn QuoteSource>>,
    store: QuoteStore,
    assets: Arc<dyn AssetRepository>,
    usage: UsageTracker,
    batch_size: usize,
    pause: Duration,
}

impl BatchRefreshJob {
    pub fn new(
        source: Arc<dyn BatchQuoteSource>,
        store: QuoteStore,
        assets: Arc<dyn AssetRepository>,
        usage: UsageTracker,
        batch_size: usize,
        pause: Duration,
    ) -> Self {
        Self {
            source,
            fund_source: None,
            store,
            assets,
            usage,
            batch_size: batch_size.max(1),
            pause,
        }
    }

    pub fn with_fund_source(mut self, source: Arc<dyn QuoteSource>) -> Self {
        self.fund_source = Some(source);
        self
    }

    async fn tracked(&self) -> Result<(Vec<String>, Vec<String>), StoreError> {
        let symbols = self.assets.tracked_symbols().await?;
        let funds = match &self.fund_source {
            Some(_) => self.assets.tracked_funds().await?,
            None => Vec::new(),
        };
        Ok((symbols, funds))
    }

    async fn pace(&self, requests: &mut usize) {
        if *requests > 0 && !self.pause.is_zero() {
            tokio::time::sleep(self.pause).await;
        }
        *requests += 1;
    }

    pub async fn refresh_all(&self) -> RefreshReport {
        let (symbols, funds) = match self.tracked().await {
            Ok(tracked) => tracked,
            Err(e) => {
                warn!(error = %e, "Failed to list tracked symbols");
                return RefreshReport {
                    errors: vec![BatchError {
                        symbols: Vec::new(),
                        error: e.to_string(),
                    }],
                    ..RefreshReport::default()
                };
            }
        };

        let mut report = RefreshReport {
            total_symbols: symbols.len() + funds.len(),
            ..RefreshReport::default()
        };
        info!(
            total = symbols.len(),
            funds = funds.len(),
            batch_size = self.batch_size,
            "Starting price refresh"
        );

        let mut requests = 0;
        for (index, batch) in symbols.chunks(self.batch_size).enumerate() {
            self.pace(&mut requests).await;

            match self.source.fetch_batch(batch).await {
                Ok(quotes) => {
                    self.usage.track(self.source.name(), true).await;
                    for quote in quotes {
                        self.store_quote(quote).await;
                        report.updated_count += 1;
                    }
                    info!(batch = index + 1, updated = report.updated_count, "Batch refreshed");
                }
                Err(e) => {
                    self.usage.track(self.source.name(), false).await;
                    warn!(batch = index + 1, error = %e, "Batch refresh failed");
                    report.errors.push(BatchError {
                        symbols: batch.to_vec(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Some(fund_source) = &self.fund_source {
            for code in funds {
                self.pace(&mut requests).await;

                let request = QuoteRequest::new(&code, AssetType::Fund, None);
                match fund_source.try_resolve(&request).await {
                    Ok(mut quote) => {
                        self.usage.track(fund_source.name(), true).await;
                        quote.symbol = code;
                        self.store_quote(quote).await;
                        report.updated_count += 1;
                    }
                    Err(e) => {
                        self.usage.track(fund_source.name(), false).await;
                        warn!(fund = %code, error = %e, "Fund refresh failed");
                        report.errors.push(BatchError {
                            symbols: vec![code],
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            updated = report.updated_count,
            total = report.total_symbols,
            failed_batches = report.errors.len(),
            "Price refresh finished"
        );
        report
    }

    async fn store_quote(&self, mut quote: Quote) {
        quote.currency = normalize_currency(&quote.symbol, Some(&quote.currency));
        self.store.upsert_quote(&quote).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AssetPosition;
    use crate::market::testing::{ScriptedBatchSource, ScriptedSource};
    use chrono::{TimeZone, Utc};
    use crate::store::assets::PositionBook;
    use crate::store::memory::MemoryCollection;

    fn positions(count: usize) -> Vec<AssetPosition> {
        (0..count)
            .map(|i| AssetPosition {
                id: i.to_string(),
                symbol: format!("SYM{i:03}"),
                asset_type: AssetType::Stock,
                quantity: 1.0,
                buy_price: 1.0,
                currency: "USD".to_string(),
                name: None,
                exchange: None,
                rank: 0,
            })
            .collect()
    }

    fn job(source: Arc<ScriptedBatchSource>, count: usize, store: QuoteStore) -> BatchRefreshJob {
        BatchRefreshJob::new(
            source,
            store,
            Arc::new(PositionBook::new(
                positions(count),
                Arc::new(MemoryCollection::new()),
            )),
            UsageTracker::new(Arc::new(MemoryCollection::new())),
            50,
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_abort_the_rest() {
        let source = Arc::new(ScriptedBatchSource::new(vec![2]));
        let store = QuoteStore::new(Arc::new(MemoryCollection::new()));

        let report = job(source.clone(), 120, store.clone()).refresh_all().await;

        let batches = source.batches();
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 50);
        assert_eq!(batches[2].len(), 20);

        assert_eq!(report.total_symbols, 120);
        assert_eq!(report.updated_count, 70);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].symbols, batches[1]);

        assert!(store.get("SYM000").await.is_some());
        assert!(store.get("SYM050").await.is_none());
        assert!(store.get("SYM119").await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pauses_between_batches() {
        let source = Arc::new(ScriptedBatchSource::new(vec![]));
        let mut job = job(
            source.clone(),
            120,
            QuoteStore::new(Arc::new(MemoryCollection::new())),
        );
        job.pause = Duration::from_millis(1500);

        let started = tokio::time::Instant::now();
        let report = job.refresh_all().await;
        assert_eq!(report.updated_count, 120);
        assert!(report.errors.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn test_no_positions() {
        let source = Arc::new(ScriptedBatchSource::new(vec![]));
        let report = job(
            source.clone(),
            0,
            QuoteStore::new(Arc::new(MemoryCollection::new())),
        )
        .refresh_all()
        .await;
        assert_eq!(report, RefreshReport::default());
        assert!(source.batches().is_empty());
    }

    fn fund_job(
        fund_source: Arc<ScriptedSource>,
        positions: Vec<AssetPosition>,
        store: QuoteStore,
    ) -> BatchRefreshJob {
        BatchRefreshJob::new(
            Arc::new(ScriptedBatchSource::new(vec![])),
            store,
            Arc::new(PositionBook::new(positions, Arc::new(MemoryCollection::new()))),
            UsageTracker::new(Arc::new(MemoryCollection::new())),
            50,
            Duration::ZERO,
        )
        .with_fund_source(fund_source)
    }

    fn fund(id: &str, code: &str) -> AssetPosition {
        AssetPosition {
            id: id.to_string(),
            symbol: code.to_string(),
            asset_type: AssetType::Fund,
            quantity: 1000.0,
            buy_price: 0.3,
            currency: "TRY".to_string(),
            name: None,
            exchange: None,
            rank: 0,
        }
    }

    #[tokio::test]
    async fn test_old_fund_record_is_replaced() {
        let store = QuoteStore::new(Arc::new(MemoryCollection::new()));
        let old = Utc.with_ymd_and_hms(2026, 8, 19, 0, 0, 0).unwrap();
        store.upsert("AFT", 0.10, "TRY", old, None).await;

        let tefas = Arc::new(ScriptedSource::ok("tefas", 0.42, "TRY").only_for(AssetType::Fund));
        let report = fund_job(tefas.clone(), vec![fund("1", "AFT")], store.clone())
            .refresh_all()
            .await;

        assert_eq!(tefas.calls(), 1);
        assert_eq!(report.total_symbols, 1);
        assert_eq!(report.updated_count, 1);
        let record = store.get("AFT").await.unwrap();
        assert_eq!(record.price, 0.42);
        assert_eq!(record.currency, "TRY");
        assert!(record.updated_at > old);
    }

    #[tokio::test]
    async fn test_failed_fund_is_reported_and_others_continue() {
        let store = QuoteStore::new(Arc::new(MemoryCollection::new()));
        let tefas = Arc::new(ScriptedSource::failing("tefas"));
        let mut stock = positions(1).remove(0);
        stock.symbol = "AAPL".to_string();

        let report = fund_job(
            tefas.clone(),
            vec![fund("1", "AFT"), fund("2", "TTE"), stock],
            store.clone(),
        )
        .refresh_all()
        .await;

        assert_eq!(tefas.calls(), 2);
        assert_eq!(report.total_symbols, 3);
        assert_eq!(report.updated_count, 1);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].symbols, vec!["AFT"]);
        assert!(store.get("AAPL").await.is_some());
        assert!(store.get("AFT").await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fund_requests_are_paced() {
        let tefas = Arc::new(ScriptedSource::ok("tefas", 1.5, "TRY"));
        let mut job = fund_job(
            tefas.clone(),
            vec![fund("1", "AFT"), fund("2", "TTE"), fund("3", "YAY")],
            QuoteStore::new(Arc::new(MemoryCollection::new())),
        );
        job.pause = Duration::from_millis(1500);

        let started = tokio::time::Instant::now();
        let report = job.refresh_all().await;
        assert_eq!(report.updated_count, 3);
        assert!(started.elapsed() >= Duration::from_millis(3000));
    }
}
