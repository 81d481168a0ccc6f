// =============================================================================
// TTL Cache: timestamped key/value store backing every network read
// =============================================================================
//
// `get` hides entries older than the TTL; missing and expired look the same to
// the caller. Stale entries are never removed: the resilient fetcher reads
// them through `get_any_age` when the network is down or failing.
//
// The whole map can be persisted to a JSON file (atomic tmp + rename) and
// restored on start-up. This file, together with the last-known-good asset
// list stored inside it, is the only state that survives a restart.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::clock::{Clock, SystemClock};

/// Default time-to-live for cached payloads.
pub const DEFAULT_TTL: Duration = Duration::from_millis(60_000);

/// One stored payload and the time it was written (epoch ms).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: serde_json::Value,
    pub stored_at: i64,
}

/// Thread-safe TTL cache. Cheap to share behind an `Arc`.
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    /// Create an empty cache using wall-clock time.
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    /// Create an empty cache driven by the given clock.
    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_ms: ttl.as_millis() as i64,
            clock,
        }
    }

    // -------------------------------------------------------------------------
    // Core contract
    // -------------------------------------------------------------------------

    /// Value for `key` if present and no older than the TTL.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        let now = self.clock.now_ms();
        let entries = self.entries.read();
        let entry = entries.get(key)?;
        if now - entry.stored_at > self.ttl_ms {
            debug!(key, age_ms = now - entry.stored_at, "cache entry expired");
            return None;
        }
        Some(entry.value.clone())
    }

    /// Insert or overwrite `key`, stamping it with the current time.
    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        let entry = CacheEntry {
            value,
            stored_at: self.clock.now_ms(),
        };
        self.entries.write().insert(key.into(), entry);
    }

    /// Entry for `key` regardless of its age.
    pub fn get_any_age(&self, key: &str) -> Option<CacheEntry> {
        self.entries.read().get(key).cloned()
    }

    // -------------------------------------------------------------------------
    // Typed helpers
    // -------------------------------------------------------------------------

    /// `get` followed by deserialisation; a payload of the wrong shape reads
    /// as absent.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|v| serde_json::from_value(v).ok())
    }

    /// Serialise `value` and store it under `key`.
    pub fn set_as<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let key = key.into();
        let json = serde_json::to_value(value)
            .with_context(|| format!("failed to serialise cache payload for {key}"))?;
        self.set(key, json);
        Ok(())
    }

    /// Age of the entry for `key` in milliseconds.
    pub fn age_ms(&self, key: &str) -> Option<i64> {
        let now = self.clock.now_ms();
        self.entries.read().get(key).map(|e| now - e.stored_at)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    // -------------------------------------------------------------------------
    // Persistence
    // -------------------------------------------------------------------------

    /// Write every entry (stale ones included) to `path` atomically.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let content = {
            let entries = self.entries.read();
            serde_json::to_string(&*entries).context("failed to serialise cache")?
        };

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp cache to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp cache to {}", path.display()))?;

        info!(path = %path.display(), entries = self.len(), "cache persisted (atomic)");
        Ok(())
    }

    /// Merge entries from a file written by [`persist`](Self::persist). A
    /// missing file restores nothing. Entries keep their original timestamps,
    /// so anything older than the TTL is still hidden from `get`.
    pub fn restore(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no cache file to restore");
            return Ok(0);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read cache from {}", path.display()))?;
        let loaded: HashMap<String, CacheEntry> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse cache from {}", path.display()))?;

        let count = loaded.len();
        self.entries.write().extend(loaded);
        info!(path = %path.display(), entries = count, "cache restored");
        Ok(count)
    }
}

impl Default for TtlCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl std::fmt::Debug for TtlCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("entries", &self.len())
            .field("ttl_ms", &self.ttl_ms)
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
    use serde_json::json;

    fn cache_at(start: i64) -> (TtlCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start));
        (TtlCache::with_clock(DEFAULT_TTL, clock.clone()), clock)
    }

    #[test]
    fn get_after_set_within_ttl_round_trips() {
        let (cache, clock) = cache_at(1_000);
        let payload = json!({"prices": [[1, 2.5], [2, 2.75]]});
        cache.set("history:btc", payload.clone());
        clock.advance(59_999);
        assert_eq!(cache.get("history:btc"), Some(payload));
    }

    #[test]
    fn get_at_exact_ttl_is_still_fresh() {
        let (cache, clock) = cache_at(0);
        cache.set("k", json!(1));
        clock.advance(60_000);
        assert_eq!(cache.get("k"), Some(json!(1)));
    }

    #[test]
    fn get_after_ttl_is_absent_but_entry_remains() {
        let (cache, clock) = cache_at(0);
        cache.set("k", json!("v"));
        clock.advance(60_001);
        assert_eq!(cache.get("k"), None);
        let stale = cache.get_any_age("k").unwrap();
        assert_eq!(stale.value, json!("v"));
        assert_eq!(stale.stored_at, 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn missing_key_is_absent() {
        let (cache, _) = cache_at(0);
        assert_eq!(cache.get("nope"), None);
        assert!(cache.get_any_age("nope").is_none());
    }

    #[test]
    fn set_overwrites_and_resets_clock() {
        let (cache, clock) = cache_at(0);
        cache.set("k", json!(1));
        clock.advance(50_000);
        cache.set("k", json!(2));
        clock.advance(50_000);
        assert_eq!(cache.get("k"), Some(json!(2)));
        assert_eq!(cache.age_ms("k"), Some(50_000));
    }

    #[test]
    fn typed_helpers_round_trip() {
        let (cache, _) = cache_at(0);
        cache.set_as("list", &vec!["bitcoin".to_string()]).unwrap();
        let back: Option<Vec<String>> = cache.get_as("list");
        assert_eq!(back, Some(vec!["bitcoin".to_string()]));
        let wrong: Option<u32> = cache.get_as("list");
        assert!(wrong.is_none());
    }

    #[test]
    fn persist_and_restore_keep_timestamps() {
        let dir = std::env::temp_dir().join(format!("pulse-cache-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cache.json");

        let (cache, _) = cache_at(5_000);
        cache.set("a", json!({"x": 1}));
        cache.persist(&path).unwrap();

        let (restored, clock) = cache_at(6_000);
        assert_eq!(restored.restore(&path).unwrap(), 1);
        assert_eq!(restored.get_any_age("a").unwrap().stored_at, 5_000);
        assert_eq!(restored.get("a"), Some(json!({"x": 1})));
        clock.advance(60_000);
        assert_eq!(restored.get("a"), None);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn restore_missing_file_is_empty() {
        let (cache, _) = cache_at(0);
        let path = std::env::temp_dir().join(format!("absent-{}.json", uuid::Uuid::new_v4()));
        assert_eq!(cache.restore(&path).unwrap(), 0);
        assert!(cache.is_empty());
    }
}
