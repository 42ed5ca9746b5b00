//! Provider fallback resolution of a single instrument's current quote.

use crate::core::cache::TtlCache;
use crate::core::currency::normalize_currency;
use crate::core::error::EngineError;
use crate::core::price::{AssetType, Quote, QuoteRequest, QuoteSource};
use crate::store::quotes::QuoteStore;
use crate::store::usage::UsageTracker;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Suffix-derived currency always replaces whatever the quote carried.
fn with_normalized_currency(mut quote: Quote) -> Quote {
    quote.currency = normalize_currency(&quote.symbol, Some(&quote.currency));
    quote
}

/// Resolves quotes through, in order: the memory cache, the quote store, the
/// ordered `sources`, a stale re-read of the store and the `last_resort`
/// sources. Every provider failure is logged, counted and skipped.
pub struct PriceResolver {
    cache: TtlCache<String, Quote>,
    cache_ttl: Duration,
    store: QuoteStore,
    usage: UsageTracker,
    sources: Vec<Arc<dyn QuoteSource>>,
    last_resort: Vec<Arc<dyn QuoteSource>>,
}

impl PriceResolver {
    pub fn new(store: QuoteStore, usage: UsageTracker, cache_ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(),
            cache_ttl,
            store,
            usage,
            sources: Vec::new(),
            last_resort: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn QuoteSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_last_resort(mut self, source: Arc<dyn QuoteSource>) -> Self {
        self.last_resort.push(source);
        self
    }

    pub fn cache(&self) -> &TtlCache<String, Quote> {
        &self.cache
    }

    /// `Ok(None)` means no source could price the instrument; callers fall
    /// back to the position's cost basis. Only an empty symbol is an error.
    #[instrument(skip(self, request), fields(symbol = %request.symbol, asset_type = %request.asset_type))]
    pub async fn resolve_price(&self, request: &QuoteRequest) -> Result<Option<Quote>, EngineError> {
        if request.symbol.is_empty() {
            return Err(EngineError::EmptySymbol);
        }
        let key = request.lookup_symbol();

        if request.asset_type == AssetType::Cash {
            return Ok(Some(Quote::new(&key, 1.0, &key, Utc::now())));
        }

        if let Some(quote) = self.cache.get(&key) {
            return Ok(Some(with_normalized_currency(quote)));
        }

        // Reads are served from the store without a freshness check; the
        // batch refresh job keeps it current.
        if let Some(record) = self.store.get(&key).await {
            debug!(symbol = %key, "Serving persisted quote");
            let quote = with_normalized_currency(record.into_quote());
            self.cache.set(key, quote.clone(), self.cache_ttl);
            return Ok(Some(quote));
        }

        if let Some(quote) = self.try_sources(&self.sources, request, &key).await {
            return Ok(Some(quote));
        }

        // The store may have been filled by a concurrent refresh since the first read.
        if let Some(record) = self.store.get(&key).await {
            warn!(symbol = %key, "All providers failed, serving stale persisted quote");
            return Ok(Some(with_normalized_currency(record.into_quote())));
        }

        if let Some(quote) = self.try_sources(&self.last_resort, request, &key).await {
            return Ok(Some(quote));
        }

        warn!(symbol = %key, "No source could price symbol");
        Ok(None)
    }

    async fn try_sources(
        &self,
        sources: &[Arc<dyn QuoteSource>],
        request: &QuoteRequest,
        key: &str,
    ) -> Option<Quote> {
        for source in sources.iter().filter(|s| s.supports(request.asset_type)) {
            match source.try_resolve(request).await {
                Ok(mut quote) => {
                    quote.symbol = key.to_string();
                    let quote = with_normalized_currency(quote);
                    info!(
                        provider = source.name(),
                        price = quote.price,
                        currency = %quote.currency,
                        "Resolved quote"
                    );
                    self.usage.track(source.name(), true).await;
                    self.store.upsert_quote(&quote).await;
                    self.cache.set(key.to_string(), quote.clone(), self.cache_ttl);
                    return Some(quote);
                }
                Err(e) => {
                    warn!(
                        provider = source.name(),
                        kind = e.kind(),
                        error = %e,
                        "Provider failed, trying next source"
                    );
                    self.usage.track(source.name(), false).await;
                }
            }
        }
        None
    }
}
