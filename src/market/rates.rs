//! Base-relative exchange rates, refreshed on a twice-daily publication schedule.

use crate::core::config::RatesConfig;
use crate::core::currency::RatesMap;
use crate::providers::RateSource;
use crate::store::rates::RateStore;
use crate::store::usage::UsageTracker;
use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq)]
pub enum ScheduleError {
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("invalid checkpoint time: {0}")]
    InvalidCheckpoint(String),

    #[error("checkpoint {time} does not exist on {date} in {tz}")]
    NonexistentLocalTime {
        date: NaiveDate,
        time: NaiveTime,
        tz: String,
    },
}

/// Morning and evening checkpoints at which upstream FX rates are republished.
#[derive(Debug, Clone)]
pub struct CheckpointSchedule {
    tz: Tz,
    morning: NaiveTime,
    evening: NaiveTime,
}

impl CheckpointSchedule {
    pub fn new(timezone: &str, morning: &str, evening: &str) -> Result<Self, ScheduleError> {
        let tz: Tz = timezone
            .parse()
            .map_err(|_| ScheduleError::UnknownTimezone(timezone.to_string()))?;
        let parse = |s: &str| {
            NaiveTime::parse_from_str(s, "%H:%M")
                .map_err(|_| ScheduleError::InvalidCheckpoint(s.to_string()))
        };
        Ok(Self {
            tz,
            morning: parse(morning)?,
            evening: parse(evening)?,
        })
    }

    pub fn from_config(config: &RatesConfig) -> Result<Self, ScheduleError> {
        Self::new(
            &config.timezone,
            &config.morning_checkpoint,
            &config.evening_checkpoint,
        )
    }

    fn checkpoint(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, ScheduleError> {
        match self.tz.from_local_datetime(&date.and_time(time)) {
            LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Ok(dt.with_timezone(&Utc)),
            LocalResult::None => Err(ScheduleError::NonexistentLocalTime {
                date,
                time,
                tz: self.tz.name().to_string(),
            }),
        }
    }

    /// Whether a rate written at `updated_at` predates the most recent
    /// checkpoint that has already passed at `now`.
    pub fn is_stale(&self, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> Result<bool, ScheduleError> {
        let today = now.with_timezone(&self.tz).date_naive();
        let morning = self.checkpoint(today, self.morning)?;
        let evening = self.checkpoint(today, self.evening)?;

        let last_checkpoint = if now >= evening {
            evening
        } else if now >= morning {
            morning
        } else {
            let yesterday = today.pred_opt().unwrap_or(today);
            self.checkpoint(yesterday, self.evening)?
        };
        Ok(updated_at < last_checkpoint)
    }
}

pub struct ExchangeRateService {
    base_currency: String,
    store: RateStore,
    source: Option<Arc<dyn RateSource>>,
    usage: UsageTracker,
    schedule: Option<CheckpointSchedule>,
    fallback_max_age: Duration,
    required: Vec<String>,
    emergency: RatesMap,
}

impl ExchangeRateService {
    pub fn new(
        base_currency: &str,
        config: &RatesConfig,
        store: RateStore,
        source: Option<Arc<dyn RateSource>>,
        usage: UsageTracker,
    ) -> Self {
        let schedule = match CheckpointSchedule::from_config(config) {
            Ok(schedule) => Some(schedule),
            Err(e) => {
                warn!(error = %e, "Invalid rate schedule, using a fixed maximum age");
                None
            }
        };
        Self {
            base_currency: base_currency.to_uppercase(),
            store,
            source,
            usage,
            schedule,
            fallback_max_age: Duration::hours(config.fallback_max_age_hours),
            required: config.required.iter().map(|c| c.to_uppercase()).collect(),
            emergency: config.emergency.clone(),
        }
    }

    pub fn base_currency(&self) -> &str {
        &self.base_currency
    }

    fn is_stale(&self, updated_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        let by_age = || now.signed_duration_since(updated_at) > self.fallback_max_age;
        match &self.schedule {
            Some(schedule) => schedule.is_stale(updated_at, now).unwrap_or_else(|e| {
                warn!(error = %e, "Checkpoint evaluation failed, using a fixed maximum age");
                by_age()
            }),
            None => by_age(),
        }
    }

    /// Never fails: serves stored rates, refreshing them first when stale, and
    /// falls back to the configured emergency constants for anything missing.
    pub async fn get_rates(&self) -> RatesMap {
        self.get_rates_at(Utc::now()).await
    }

    pub async fn get_rates_at(&self, now: DateTime<Utc>) -> RatesMap {
        let records = self.store.all(&self.base_currency).await;
        let mut rates: RatesMap = records
            .iter()
            .map(|r| (r.currency.clone(), r.rate))
            .collect();

        let required: Vec<&String> = self
            .required
            .iter()
            .filter(|c| **c != self.base_currency)
            .collect();
        let oldest = if required.is_empty() {
            records.iter().map(|r| r.updated_at).min()
        } else {
            required
                .iter()
                .map(|c| records.iter().find(|r| &r.currency == *c).map(|r| r.updated_at))
                .collect::<Option<Vec<_>>>()
                .and_then(|times| times.into_iter().min())
        };
        let stale = match oldest {
            Some(updated_at) => self.is_stale(updated_at, now),
            // A required currency is missing, or nothing is stored at all
            None => true,
        };

        if stale {
            self.refresh(&mut rates, now).await;
        } else {
            debug!("Stored exchange rates are fresh");
        }

        for (currency, rate) in &self.emergency {
            rates.entry(currency.to_uppercase()).or_insert_with(|| {
                warn!(currency = %currency, "Using emergency exchange rate");
                *rate
            });
        }
        rates.insert(self.base_currency.clone(), 1.0);
        rates
    }

    async fn refresh(&self, rates: &mut RatesMap, now: DateTime<Utc>) {
        let Some(source) = &self.source else {
            warn!("Exchange rates are stale and no rate source is configured");
            return;
        };
        match source.fetch_latest(&self.base_currency).await {
            Ok(mut fresh) => {
                self.usage.track(source.name(), true).await;
                fresh.insert(self.base_currency.clone(), 1.0);
                let written = self
                    .store
                    .upsert_all(&self.base_currency, &fresh, now)
                    .await;
                info!(count = fresh.len(), written, "Refreshed exchange rates");
                rates.extend(fresh);
            }
            Err(e) => {
                self.usage.track(source.name(), false).await;
                warn!(error = %e, "Failed to refresh exchange rates, serving stored values");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ProviderError;
    use crate::store::memory::MemoryCollection;
    use async_trait::async_trait;
    use chrono_tz::Europe::Berlin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn berlin(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Berlin
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .single()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn schedule() -> CheckpointSchedule {
        CheckpointSchedule::new("Europe/Berlin", "08:00", "17:00").unwrap()
    }

    #[test]
    fn test_evening_update_fresh_until_next_morning() {
        let updated = berlin(2026, 10, 15, 17, 5);
        assert!(!schedule().is_stale(updated, berlin(2026, 10, 15, 20, 0)).unwrap());
        assert!(!schedule().is_stale(updated, berlin(2026, 10, 16, 7, 59)).unwrap());
        assert!(schedule().is_stale(updated, berlin(2026, 10, 16, 8, 5)).unwrap());
    }

    #[test]
    fn test_update_just_before_checkpoint_is_stale() {
        let updated = berlin(2026, 10, 15, 7, 55);
        assert!(schedule().is_stale(updated, berlin(2026, 10, 15, 8, 5)).unwrap());
    }

    #[test]
    fn test_early_morning_checks_yesterday_evening() {
        let now = berlin(2026, 10, 16, 6, 0);
        assert!(schedule().is_stale(berlin(2026, 10, 15, 16, 59), now).unwrap());
        assert!(!schedule().is_stale(berlin(2026, 10, 15, 17, 0), now).unwrap());
    }

    #[test]
    fn test_invalid_schedule() {
        assert_eq!(
            CheckpointSchedule::new("Mars/Olympus", "08:00", "17:00").unwrap_err(),
            ScheduleError::UnknownTimezone("Mars/Olympus".to_string())
        );
        assert!(CheckpointSchedule::new("Europe/Berlin", "8am", "17:00").is_err());
    }

    #[test]
    fn test_checkpoint_in_dst_gap_is_an_error() {
        // 02:30 does not exist in Berlin on the spring-forward day
        let schedule = CheckpointSchedule::new("Europe/Berlin", "02:30", "17:00").unwrap();
        let now = berlin(2026, 3, 29, 12, 0);
        assert!(schedule.is_stale(now, now).is_err());
    }

    struct StaticRates {
        rates: Option<RatesMap>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RateSource for StaticRates {
        fn name(&self) -> &str {
            "static"
        }

        async fn fetch_latest(&self, _base: &str) -> Result<RatesMap, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rates
                .clone()
                .ok_or_else(|| ProviderError::unavailable("static", "offline"))
        }
    }

    fn service(source: Arc<StaticRates>, store: RateStore) -> ExchangeRateService {
        ExchangeRateService::new(
            "EUR",
            &RatesConfig::default(),
            store,
            Some(source),
            UsageTracker::new(Arc::new(MemoryCollection::new())),
        )
    }

    #[tokio::test]
    async fn test_stale_rates_are_fetched_and_all_persisted() {
        let source = Arc::new(StaticRates {
            rates: Some(RatesMap::from([
                ("USD".to_string(), 1.1),
                ("TRY".to_string(), 38.0),
                ("JPY".to_string(), 160.0),
            ])),
            calls: AtomicUsize::new(0),
        });
        let store = RateStore::new(Arc::new(MemoryCollection::new()));
        let service = service(source.clone(), store.clone());

        let now = berlin(2026, 10, 16, 9, 0);
        let rates = service.get_rates_at(now).await;
        assert_eq!(rates["EUR"], 1.0);
        assert_eq!(rates["JPY"], 160.0);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        // Every returned currency plus the base
        assert_eq!(store.all("EUR").await.len(), 4);

        // Fresh until the evening checkpoint
        service.get_rates_at(berlin(2026, 10, 16, 16, 0)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        service.get_rates_at(berlin(2026, 10, 16, 17, 30)).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fetch_failure_serves_stored_rates() {
        let source = Arc::new(StaticRates {
            rates: None,
            calls: AtomicUsize::new(0),
        });
        let store = RateStore::new(Arc::new(MemoryCollection::new()));
        let stored = RatesMap::from([("USD".to_string(), 1.12), ("TRY".to_string(), 36.0)]);
        store
            .upsert_all("EUR", &stored, berlin(2026, 10, 10, 9, 0))
            .await;

        let rates = service(source.clone(), store)
            .get_rates_at(berlin(2026, 10, 16, 9, 0))
            .await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(rates["USD"], 1.12);
        assert_eq!(rates["TRY"], 36.0);
    }

    #[tokio::test]
    async fn test_empty_store_and_failed_fetch_use_emergency_rates() {
        let source = Arc::new(StaticRates {
            rates: None,
            calls: AtomicUsize::new(0),
        });
        let store = RateStore::new(Arc::new(MemoryCollection::new()));

        let rates = service(source, store).get_rates().await;
        assert_eq!(rates["EUR"], 1.0);
        assert_eq!(rates["USD"], 1.09);
        assert_eq!(rates["TRY"], 37.5);
    }

    #[tokio::test]
    async fn test_missing_required_currency_forces_refresh() {
        let source = Arc::new(StaticRates {
            rates: Some(RatesMap::from([
                ("USD".to_string(), 1.1),
                ("TRY".to_string(), 38.0),
            ])),
            calls: AtomicUsize::new(0),
        });
        let store = RateStore::new(Arc::new(MemoryCollection::new()));
        let now = berlin(2026, 10, 16, 9, 0);
        store
            .upsert_all("EUR", &RatesMap::from([("USD".to_string(), 1.1)]), now)
            .await;

        service(source.clone(), store).get_rates_at(now).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rates_for_a_previous_base_are_refetched() {
        let source = Arc::new(StaticRates {
            rates: Some(RatesMap::from([
                ("USD".to_string(), 1.1),
                ("TRY".to_string(), 38.0),
            ])),
            calls: AtomicUsize::new(0),
        });
        let store = RateStore::new(Arc::new(MemoryCollection::new()));
        let now = berlin(2026, 10, 16, 9, 0);
        // Fresh, but relative to a base that is no longer configured
        store
            .upsert_all(
                "GBP",
                &RatesMap::from([("USD".to_string(), 1.3), ("TRY".to_string(), 45.0)]),
                now,
            )
            .await;

        let rates = service(source.clone(), store.clone()).get_rates_at(now).await;
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(rates["USD"], 1.1);
        assert_eq!(rates["TRY"], 38.0);
        assert_eq!(rates["EUR"], 1.0);
        assert_eq!(store.all("EUR").await.len(), 3);
    }
}
