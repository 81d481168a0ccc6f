// =============================================================================
// Resilient Fetcher: network call with timeout, offline check, and
// cache fallback
// =============================================================================
//
//   offline            => any cached copy (age ignored)      [Offline]
//                         else DataUnavailable(Offline)
//   online, call ok    => write cache, return value          [Fresh]
//   online, call fails => any cached copy (age ignored)      [Cached]
//                         else DataUnavailable(Upstream)
//
// Failed calls never touch the cache. Every degraded read is logged and
// counted so that dashboards can tell cached data from fresh data.
// =============================================================================

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::error::{FetchError, UnavailableReason};
use crate::types::Freshness;

use super::connectivity::Connectivity;

/// Default per-call timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// A fetched payload and where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub value: T,
    pub freshness: Freshness,
    /// Epoch ms at which the served copy was stored (None for a live result).
    pub stored_at: Option<i64>,
}

impl<T> Fetched<T> {
    pub fn is_degraded(&self) -> bool {
        self.freshness.is_degraded()
    }
}

/// Wraps network calls with timeout + cache fallback.
pub struct ResilientFetcher {
    cache: Arc<TtlCache>,
    connectivity: Arc<dyn Connectivity>,
    timeout: Duration,
    degraded_reads: AtomicU64,
}

impl ResilientFetcher {
    pub fn new(cache: Arc<TtlCache>, connectivity: Arc<dyn Connectivity>, timeout: Duration) -> Self {
        Self {
            cache,
            connectivity,
            timeout,
            degraded_reads: AtomicU64::new(0),
        }
    }

    /// Number of results served from cache because of offline/failure.
    pub fn degraded_reads(&self) -> u64 {
        self.degraded_reads.load(Ordering::Relaxed)
    }

    /// Run `call` with the full offline/timeout/fallback policy.
    pub async fn fetch<T, F, Fut>(&self, key: &str, call: F) -> Result<Fetched<T>, FetchError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if !self.connectivity.is_online() {
            return self
                .fallback(key, Freshness::Offline)
                .ok_or_else(|| FetchError::DataUnavailable {
                    key: key.to_string(),
                    reason: UnavailableReason::Offline,
                });
        }

        let failure = match tokio::time::timeout(self.timeout, call()).await {
            Ok(Ok(value)) => {
                if let Err(e) = self.cache.set_as(key, &value) {
                    warn!(key, error = %e, "fetched payload could not be cached");
                }
                debug!(key, "fresh fetch stored in cache");
                return Ok(Fetched {
                    value,
                    freshness: Freshness::Fresh,
                    stored_at: None,
                });
            }
            Ok(Err(e)) => format!("{e:#}"),
            Err(_) => format!("timed out after {} ms", self.timeout.as_millis()),
        };

        warn!(key, error = %failure, "upstream fetch failed, trying cache");
        self.fallback(key, Freshness::Cached)
            .ok_or_else(|| FetchError::DataUnavailable {
                key: key.to_string(),
                reason: UnavailableReason::Upstream(failure),
            })
    }

    /// Serve from cache while the entry is inside its TTL, otherwise behave
    /// like [`fetch`](Self::fetch). Offline always goes through `fetch` so
    /// the result is flagged.
    pub async fn fetch_fresh_first<T, F, Fut>(
        &self,
        key: &str,
        call: F,
    ) -> Result<Fetched<T>, FetchError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        if self.connectivity.is_online() {
            if let Some(value) = self.cache.get_as::<T>(key) {
                debug!(key, "served from cache within TTL");
                return Ok(Fetched {
                    value,
                    freshness: Freshness::Fresh,
                    stored_at: self.cache.get_any_age(key).map(|e| e.stored_at),
                });
            }
        }
        self.fetch(key, call).await
    }

    /// Any cached copy of `key`, regardless of age, tagged with `freshness`.
    fn fallback<T: DeserializeOwned>(&self, key: &str, freshness: Freshness) -> Option<Fetched<T>> {
        let entry = self.cache.get_any_age(key)?;
        let value = match serde_json::from_value::<T>(entry.value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "cached payload has unexpected shape, ignoring");
                return None;
            }
        };

        self.degraded_reads.fetch_add(1, Ordering::Relaxed);
        warn!(
            key,
            mode = %freshness,
            age_ms = self.cache.age_ms(key).unwrap_or_default(),
            "serving cached data (degraded mode)"
        );
        Some(Fetched {
            value,
            freshness,
            stored_at: Some(entry.stored_at),
        })
    }
}

impl std::fmt::Debug for ResilientFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientFetcher")
            .field("timeout", &self.timeout)
            .field("online", &self.connectivity.is_online())
            .field("degraded_reads", &self.degraded_reads())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::DEFAULT_TTL;
    use crate::fetch::connectivity::NetworkMonitor;
    use std::sync::atomic::AtomicUsize;

    struct Harness {
        fetcher: ResilientFetcher,
        cache: Arc<TtlCache>,
        clock: Arc<ManualClock>,
        net: Arc<NetworkMonitor>,
    }

    fn harness(timeout: Duration) -> Harness {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let cache = Arc::new(TtlCache::with_clock(DEFAULT_TTL, clock.clone()));
        let net = Arc::new(NetworkMonitor::new("127.0.0.1:9"));
        let fetcher = ResilientFetcher::new(cache.clone(), net.clone(), timeout);
        Harness {
            fetcher,
            cache,
            clock,
            net,
        }
    }

    #[tokio::test]
    async fn success_returns_fresh_and_refreshes_cache() {
        let h = harness(DEFAULT_FETCH_TIMEOUT);
        let got = h.fetcher.fetch("k", || async { Ok(vec![1.0, 2.0]) }).await.unwrap();
        assert_eq!(got.value, vec![1.0, 2.0]);
        assert_eq!(got.freshness, Freshness::Fresh);
        assert!(!got.is_degraded());
        assert_eq!(h.cache.get_as::<Vec<f64>>("k"), Some(vec![1.0, 2.0]));
        assert_eq!(h.fetcher.degraded_reads(), 0);
    }

    #[tokio::test]
    async fn failure_with_stale_cache_serves_cached_and_flags_degraded() {
        let h = harness(DEFAULT_FETCH_TIMEOUT);
        h.cache.set_as("k", &42_u32).unwrap();
        h.clock.advance(10 * 60_000); // far past TTL

        let got: Fetched<u32> = h
            .fetcher
            .fetch("k", || async { Err(anyhow::anyhow!("HTTP 503")) })
            .await
            .unwrap();
        assert_eq!(got.value, 42);
        assert_eq!(got.freshness, Freshness::Cached);
        assert_eq!(got.stored_at, Some(1_000_000));
        assert_eq!(h.fetcher.degraded_reads(), 1);
    }

    #[tokio::test]
    async fn failure_without_cache_is_data_unavailable() {
        let h = harness(DEFAULT_FETCH_TIMEOUT);
        let err = h
            .fetcher
            .fetch::<u32, _, _>("k", || async { Err(anyhow::anyhow!("HTTP 500")) })
            .await
            .unwrap_err();
        match err {
            FetchError::DataUnavailable { key, reason } => {
                assert_eq!(key, "k");
                assert!(matches!(reason, UnavailableReason::Upstream(ref m) if m.contains("HTTP 500")));
            }
        }
    }

    #[tokio::test]
    async fn failed_call_never_writes_cache() {
        let h = harness(DEFAULT_FETCH_TIMEOUT);
        h.cache.set_as("k", &1_u32).unwrap();
        let before = h.cache.get_any_age("k").unwrap();
        h.clock.advance(5_000);
        let _ = h
            .fetcher
            .fetch::<u32, _, _>("k", || async { Err(anyhow::anyhow!("boom")) })
            .await;
        assert_eq!(h.cache.get_any_age("k").unwrap(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_falls_back_to_cache() {
        let h = harness(Duration::from_secs(5));
        h.cache.set_as("k", &"old".to_string()).unwrap();
        let got: Fetched<String> = h
            .fetcher
            .fetch("k", || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok("late".to_string())
            })
            .await
            .unwrap();
        assert_eq!(got.value, "old");
        assert_eq!(got.freshness, Freshness::Cached);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_without_cache_reports_timeout() {
        let h = harness(Duration::from_secs(5));
        let err = h
            .fetcher
            .fetch::<u32, _, _>("k", || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(1)
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn offline_ignores_ttl_and_skips_network() {
        let h = harness(DEFAULT_FETCH_TIMEOUT);
        h.cache.set_as("k", &7_u32).unwrap();
        h.clock.advance(60 * 60_000);
        h.net.set_online(false);

        let calls = AtomicUsize::new(0);
        let got: Fetched<u32> = h
            .fetcher
            .fetch("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(99)
            })
            .await
            .unwrap();
        assert_eq!(got.value, 7);
        assert_eq!(got.freshness, Freshness::Offline);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn offline_without_cache_is_offline_error() {
        let h = harness(DEFAULT_FETCH_TIMEOUT);
        h.net.set_online(false);
        let err = h
            .fetcher
            .fetch::<u32, _, _>("k", || async { Ok(1) })
            .await
            .unwrap_err();
        assert!(err.is_offline());
    }

    #[tokio::test]
    async fn fresh_first_skips_network_inside_ttl() {
        let h = harness(DEFAULT_FETCH_TIMEOUT);
        h.cache.set_as("k", &5_u32).unwrap();
        h.clock.advance(30_000);

        let calls = AtomicUsize::new(0);
        let got: Fetched<u32> = h
            .fetcher
            .fetch_fresh_first("k", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(6)
            })
            .await
            .unwrap();
        assert_eq!(got.value, 5);
        assert_eq!(got.freshness, Freshness::Fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        h.clock.advance(31_000);
        let got: Fetched<u32> = h
            .fetcher
            .fetch_fresh_first("k", || async { Ok(6) })
            .await
            .unwrap();
        assert_eq!(got.value, 6);
    }

    #[tokio::test]
    async fn cached_payload_of_wrong_shape_is_not_served() {
        let h = harness(DEFAULT_FETCH_TIMEOUT);
        h.cache.set("k", serde_json::json!({"not": "a number"}));
        let err = h
            .fetcher
            .fetch::<u32, _, _>("k", || async { Err(anyhow::anyhow!("down")) })
            .await
            .unwrap_err();
        assert!(!err.is_offline());
    }
}
