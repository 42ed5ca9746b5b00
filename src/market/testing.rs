//! Scripted in-process sources for exercising the engine without HTTP.

use crate::core::error::ProviderError;
use crate::core::price::{AssetType, BatchQuoteSource, Quote, QuoteRequest, QuoteSource};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub(crate) struct ScriptedSource {
    name: String,
    outcome: Option<(f64, String)>,
    only: Option<AssetType>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub(crate) fn ok(name: &str, price: f64, currency: &str) -> Self {
        Self {
            name: name.to_string(),
            outcome: Some((price, currency.to_string())),
            only: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            outcome: None,
            only: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn only_for(mut self, asset_type: AssetType) -> Self {
        self.only = Some(asset_type);
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for ScriptedSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, asset_type: AssetType) -> bool {
        self.only.is_none_or(|only| only == asset_type)
    }

    async fn try_resolve(&self, request: &QuoteRequest) -> Result<Quote, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Some((price, currency)) => {
                let mut quote = Quote::new(&request.lookup_symbol(), *price, currency, Utc::now());
                quote.previous_close = Some(price - 1.0);
                Ok(quote)
            }
            None => Err(ProviderError::unavailable(&self.name, "scripted failure")),
        }
    }
}

/// Quotes every requested symbol at a fixed price, failing on chosen call numbers.
pub(crate) struct ScriptedBatchSource {
    fail_on_calls: Vec<usize>,
    batches: Mutex<Vec<Vec<String>>>,
}

impl ScriptedBatchSource {
    pub(crate) fn new(fail_on_calls: Vec<usize>) -> Self {
        Self {
            fail_on_calls,
            batches: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchQuoteSource for ScriptedBatchSource {
    fn name(&self) -> &str {
        "scripted_batch"
    }

    async fn fetch_batch(&self, symbols: &[String]) -> Result<Vec<Quote>, ProviderError> {
        let call = {
            let mut batches = self.batches.lock().unwrap();
            batches.push(symbols.to_vec());
            batches.len()
        };
        if self.fail_on_calls.contains(&call) {
            return Err(ProviderError::rate_limited("scripted_batch", "too many requests"));
        }
        Ok(symbols
            .iter()
            .map(|s| Quote::new(s, 10.0, "USD", Utc::now()))
            .collect())
    }
}
