// =============================================================================
// Price Cache: memoizes provider calls per (tickers, period)
// =============================================================================
//
// Entries expire after `ttl` and the map never holds more than `max_entries`
// tables; the oldest entry is evicted first.  The lock is never held across
// the provider call, so two concurrent misses for the same key may both
// fetch.  The last writer wins and both callers get a consistent table.
// =============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::market_data::{PriceProvider, PriceTable};
use crate::types::LookbackPeriod;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub tickers: Vec<String>,
    pub period: LookbackPeriod,
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.tickers.join(","), self.period)
    }
}

struct CacheEntry {
    table: Arc<PriceTable>,
    fetched_at: Instant,
}

/// Counters exposed on the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct PriceCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PriceCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Return a fresh cached table or fetch one through `provider`.
    ///
    /// Provider errors are returned as-is and never cached.
    pub async fn get_or_fetch(
        &self,
        provider: &dyn PriceProvider,
        tickers: &[String],
        period: LookbackPeriod,
    ) -> Result<Arc<PriceTable>> {
        let key = CacheKey {
            tickers: tickers.to_vec(),
            period,
        };

        if let Some(table) = self.get_fresh(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "price cache hit");
            return Ok(table);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        info!(key = %key, "price cache miss, fetching");
        let table = Arc::new(provider.fetch(tickers, period).await?);
        self.store(key, table.clone());
        Ok(table)
    }

    fn get_fresh(&self, key: &CacheKey) -> Option<Arc<PriceTable>> {
        let map = self.entries.read();
        map.get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.table.clone())
    }

    fn store(&self, key: CacheKey, table: Arc<PriceTable>) {
        let mut map = self.entries.write();
        map.retain(|_, entry| entry.fetched_at.elapsed() < self.ttl);

        while map.len() >= self.max_entries && !map.contains_key(&key) {
            let oldest = map
                .iter()
                .min_by_key(|(_, entry)| entry.fetched_at)
                .map(|(k, _)| k.clone());
            match oldest {
                Some(k) => {
                    debug!(key = %k, "evicting oldest cached table");
                    map.remove(&k);
                }
                None => break,
            }
        }

        map.insert(
            key,
            CacheEntry {
                table,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Drop every cached table.  Returns how many were removed.
    pub fn invalidate_all(&self) -> usize {
        let mut map = self.entries.write();
        let removed = map.len();
        map.clear();
        removed
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for PriceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceCache")
            .field("ttl", &self.ttl)
            .field("max_entries", &self.max_entries)
            .field("stats", &self.stats())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct CountingProvider {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingProvider {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail,
            }
        }
    }

    #[async_trait]
    impl PriceProvider for CountingProvider {
        async fn fetch(&self, tickers: &[String], _period: LookbackPeriod) -> Result<PriceTable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("provider down");
            }
            let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
            let rows = tickers.iter().map(|t| (t.clone(), vec![(date, 1.0)]));
            Ok(PriceTable::from_closes(rows)?)
        }
    }

    fn tickers(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let provider = CountingProvider::new(false);
        let cache = PriceCache::new(Duration::from_secs(60), 4);
        let universe = tickers(&["AAPL", "MSFT"]);

        let first = cache.get_or_fetch(&provider, &universe, LookbackPeriod::FiveYears).await.unwrap();
        let second = cache.get_or_fetch(&provider, &universe, LookbackPeriod::FiveYears).await.unwrap();

        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.entries), (1, 1, 1));
    }

    #[tokio::test]
    async fn different_period_is_a_different_key() {
        let provider = CountingProvider::new(false);
        let cache = PriceCache::new(Duration::from_secs(60), 4);
        let universe = tickers(&["AAPL"]);

        cache.get_or_fetch(&provider, &universe, LookbackPeriod::FiveYears).await.unwrap();
        cache.get_or_fetch(&provider, &universe, LookbackPeriod::OneYear).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_ttl_always_refetches() {
        let provider = CountingProvider::new(false);
        let cache = PriceCache::new(Duration::ZERO, 4);
        let universe = tickers(&["AAPL"]);

        cache.get_or_fetch(&provider, &universe, LookbackPeriod::FiveYears).await.unwrap();
        cache.get_or_fetch(&provider, &universe, LookbackPeriod::FiveYears).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn capacity_evicts_oldest() {
        let provider = CountingProvider::new(false);
        let cache = PriceCache::new(Duration::from_secs(60), 1);

        cache.get_or_fetch(&provider, &tickers(&["A"]), LookbackPeriod::FiveYears).await.unwrap();
        cache.get_or_fetch(&provider, &tickers(&["B"]), LookbackPeriod::FiveYears).await.unwrap();
        assert_eq!(cache.stats().entries, 1);

        // "A" was evicted, so it is fetched again.
        cache.get_or_fetch(&provider, &tickers(&["A"]), LookbackPeriod::FiveYears).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let provider = CountingProvider::new(true);
        let cache = PriceCache::new(Duration::from_secs(60), 4);
        let universe = tickers(&["AAPL"]);

        assert!(cache.get_or_fetch(&provider, &universe, LookbackPeriod::FiveYears).await.is_err());
        assert!(cache.get_or_fetch(&provider, &universe, LookbackPeriod::FiveYears).await.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats().entries, 0);
    }

    #[tokio::test]
    async fn invalidate_all_forces_refetch() {
        let provider = CountingProvider::new(false);
        let cache = PriceCache::new(Duration::from_secs(60), 4);
        let universe = tickers(&["AAPL"]);

        cache.get_or_fetch(&provider, &universe, LookbackPeriod::FiveYears).await.unwrap();
        assert_eq!(cache.invalidate_all(), 1);
        cache.get_or_fetch(&provider, &universe, LookbackPeriod::FiveYears).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }
}
