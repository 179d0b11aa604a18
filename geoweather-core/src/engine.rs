//! Cache-then-fetch resolution of a coordinate into a weather snapshot.

use chrono::{TimeDelta, Utc};
use std::sync::Arc;

use crate::{
    cache::CacheStore,
    error::WeatherError,
    model::{CacheEntry, Coordinate, WeatherSnapshot, cache_key},
    provider::WeatherFetcher,
};

/// How the engine uses its cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub ttl: TimeDelta,
    /// Rounding applied when deriving keys; `None` keeps raw coordinates.
    pub key_decimals: Option<u8>,
    pub serve_stale_on_error: bool,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: TimeDelta::milliseconds(600_000),
            key_decimals: None,
            serve_stale_on_error: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AcquisitionEngine {
    fetcher: Arc<dyn WeatherFetcher>,
    cache: CacheStore,
    policy: CachePolicy,
}

impl AcquisitionEngine {
    pub fn new(fetcher: Arc<dyn WeatherFetcher>, cache: CacheStore, policy: CachePolicy) -> Self {
        Self {
            fetcher,
            cache,
            policy,
        }
    }

    pub fn key_for(&self, coordinate: Coordinate) -> String {
        cache_key(coordinate, self.policy.key_decimals)
    }

    /// Resolve the current weather at `coordinate`.
    ///
    /// A fresh cache entry is returned without touching the network. Otherwise
    /// exactly one fetch is made; on success the result replaces the cached
    /// entry, on failure the error is returned and the cache is left as it was.
    pub async fn resolve_weather(&self, coordinate: Coordinate) -> Result<WeatherSnapshot, WeatherError> {
        let key = self.key_for(coordinate);
        let cached = self.cache.get(&key).await;

        if let Some(entry) = &cached {
            if entry.is_fresh(Utc::now(), self.policy.ttl) {
                tracing::debug!(key = %key, "cache hit");
                return Ok(entry.payload.clone());
            }
            tracing::debug!(key = %key, captured_at = %entry.captured_at, "cache entry expired");
        } else {
            tracing::debug!(key = %key, "cache miss");
        }

        match self.fetcher.fetch(coordinate).await {
            Ok(snapshot) => {
                let entry = CacheEntry::new(key, Utc::now(), snapshot);
                self.cache.put(&entry).await;
                Ok(entry.payload)
            }
            Err(e) => match cached {
                Some(stale) if self.policy.serve_stale_on_error => {
                    tracing::warn!(
                        key = %stale.key,
                        captured_at = %stale.captured_at,
                        error = %e,
                        "fetch failed, serving expired cache entry"
                    );
                    Ok(stale.payload)
                }
                _ => Err(e),
            },
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::cache::MemoryStore;
    use crate::model::tests::sample_snapshot;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fetcher double that counts calls and replays a fixed outcome.
    #[derive(Debug)]
    pub(crate) struct CountingFetcher {
        calls: AtomicUsize,
        outcome: Result<WeatherSnapshot, WeatherError>,
    }

    impl CountingFetcher {
        pub(crate) fn ok(snapshot: WeatherSnapshot) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                outcome: Ok(snapshot),
            })
        }

        pub(crate) fn failing(error: WeatherError) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                outcome: Err(error),
            })
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherFetcher for CountingFetcher {
        async fn fetch(&self, _coordinate: Coordinate) -> Result<WeatherSnapshot, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone()
        }
    }

    const BERLIN: Coordinate = Coordinate::new(52.5200, 13.4050);

    fn engine_with(fetcher: Arc<CountingFetcher>, policy: CachePolicy) -> (AcquisitionEngine, CacheStore) {
        let cache = CacheStore::new(Arc::new(MemoryStore::new()));
        (AcquisitionEngine::new(fetcher, cache.clone(), policy), cache)
    }

    #[tokio::test]
    async fn fresh_entry_avoids_network() {
        let fetcher = CountingFetcher::ok(sample_snapshot(30.0));
        let (engine, cache) = engine_with(fetcher.clone(), CachePolicy::default());
        let key = engine.key_for(BERLIN);
        let captured_at = Utc::now() - TimeDelta::milliseconds(1);
        cache.put(&CacheEntry::new(&key, captured_at, sample_snapshot(12.0))).await;

        let snapshot = engine.resolve_weather(BERLIN).await.expect("cache hit");

        assert_eq!(snapshot, sample_snapshot(12.0));
        assert_eq!(fetcher.calls(), 0);
        let entry = cache.get(&key).await.expect("entry kept");
        assert_eq!(entry.captured_at.timestamp_millis(), captured_at.timestamp_millis());
    }

    #[tokio::test]
    async fn expired_entry_forces_refetch_and_overwrite() {
        let fetcher = CountingFetcher::ok(sample_snapshot(30.0));
        let (engine, cache) = engine_with(fetcher.clone(), CachePolicy::default());
        let key = engine.key_for(BERLIN);
        let old = Utc::now() - TimeDelta::milliseconds(600_001);
        cache.put(&CacheEntry::new(&key, old, sample_snapshot(12.0))).await;

        let snapshot = engine.resolve_weather(BERLIN).await.expect("fetched");

        assert_eq!(snapshot, sample_snapshot(30.0));
        assert_eq!(fetcher.calls(), 1);
        let entry = cache.get(&key).await.expect("entry rewritten");
        assert!(entry.captured_at > old);
        assert_eq!(entry.payload, sample_snapshot(30.0));
    }

    #[tokio::test]
    async fn miss_populates_cache() {
        let fetcher = CountingFetcher::ok(sample_snapshot(21.5));
        let (engine, cache) = engine_with(fetcher.clone(), CachePolicy::default());

        let snapshot = engine.resolve_weather(BERLIN).await.expect("fetched");

        let entry = cache.get(&engine.key_for(BERLIN)).await.expect("populated");
        assert_eq!(entry.payload, snapshot);
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn failure_leaves_stale_entry_untouched() {
        let fetcher = CountingFetcher::failing(WeatherError::Network("timeout".into()));
        let (engine, cache) = engine_with(fetcher.clone(), CachePolicy::default());
        let key = engine.key_for(BERLIN);
        let stale = CacheEntry::new(&key, Utc::now() - TimeDelta::hours(2), sample_snapshot(5.0));
        cache.put(&stale).await;

        let err = engine.resolve_weather(BERLIN).await.unwrap_err();

        assert_eq!(err, WeatherError::Network("timeout".into()));
        assert_eq!(fetcher.calls(), 1);
        let after = cache.get(&key).await.expect("still present");
        assert_eq!(after.payload, stale.payload);
        assert_eq!(after.captured_at.timestamp_millis(), stale.captured_at.timestamp_millis());
    }

    #[tokio::test]
    async fn failure_without_entry_writes_nothing() {
        let fetcher = CountingFetcher::failing(WeatherError::Parse("bad".into()));
        let (engine, cache) = engine_with(fetcher, CachePolicy::default());

        assert!(engine.resolve_weather(BERLIN).await.is_err());
        assert!(cache.get(&engine.key_for(BERLIN)).await.is_none());
    }

    #[tokio::test]
    async fn stale_fallback_is_opt_in() {
        let fetcher = CountingFetcher::failing(WeatherError::Network("offline".into()));
        let policy = CachePolicy {
            serve_stale_on_error: true,
            ..CachePolicy::default()
        };
        let (engine, cache) = engine_with(fetcher, policy);
        let key = engine.key_for(BERLIN);
        let stale_at = Utc::now() - TimeDelta::hours(1);
        cache.put(&CacheEntry::new(&key, stale_at, sample_snapshot(5.0))).await;

        let snapshot = engine.resolve_weather(BERLIN).await.expect("stale payload");

        assert_eq!(snapshot, sample_snapshot(5.0));
        let after = cache.get(&key).await.expect("still present");
        assert_eq!(after.captured_at.timestamp_millis(), stale_at.timestamp_millis());
    }

    #[tokio::test]
    async fn stale_fallback_still_errors_without_entry() {
        let fetcher = CountingFetcher::failing(WeatherError::Network("offline".into()));
        let policy = CachePolicy {
            serve_stale_on_error: true,
            ..CachePolicy::default()
        };
        let (engine, _) = engine_with(fetcher, policy);

        assert!(engine.resolve_weather(BERLIN).await.is_err());
    }

    #[tokio::test]
    async fn rounded_keys_share_entries_across_jitter() {
        let fetcher = CountingFetcher::ok(sample_snapshot(18.4));
        let policy = CachePolicy {
            key_decimals: Some(3),
            ..CachePolicy::default()
        };
        let (engine, _) = engine_with(fetcher.clone(), policy);

        engine.resolve_weather(Coordinate::new(52.520_01, 13.404_98)).await.expect("first");
        engine.resolve_weather(Coordinate::new(52.519_97, 13.405_03)).await.expect("second");

        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn raw_keys_miss_on_jitter() {
        let fetcher = CountingFetcher::ok(sample_snapshot(18.4));
        let (engine, _) = engine_with(fetcher.clone(), CachePolicy::default());

        engine.resolve_weather(Coordinate::new(52.520_01, 13.404_98)).await.expect("first");
        engine.resolve_weather(Coordinate::new(52.519_97, 13.405_03)).await.expect("second");

        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn corrupt_entry_is_refetched_and_replaced() {
        let store = Arc::new(MemoryStore::new());
        let cache = CacheStore::new(store.clone());
        let fetcher = CountingFetcher::ok(sample_snapshot(9.0));
        let engine = AcquisitionEngine::new(fetcher.clone(), cache.clone(), CachePolicy::default());
        let key = engine.key_for(BERLIN);
        crate::cache::KvStore::set(store.as_ref(), &key, "][").await.expect("memory set");

        let snapshot = engine.resolve_weather(BERLIN).await.expect("fetched");

        assert_eq!(snapshot, sample_snapshot(9.0));
        assert_eq!(fetcher.calls(), 1);
        assert_eq!(cache.get(&key).await.map(|e| e.payload), Some(sample_snapshot(9.0)));
    }
}
