//! TTL key/value storage.
//!
//! Entries are JSON values so any handler can cache its response body without
//! the store knowing the type. Expiry uses the tokio clock, which lets tests
//! drive it with `tokio::time::advance`.
//!
//! Each identity also carries a generation number that invalidation advances.
//! A read-through fill records the generation before it fetches and stores
//! its result only if no invalidation ran meanwhile, so a slow fetch cannot
//! put pre-mutation data back after a purge.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

use metrics::counter;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::lock::{mutex_lock, rw_read, rw_write};

const SOURCE: &str = "cache::store";

pub const METRIC_CACHE_HIT: &str = "voxline_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "voxline_cache_miss_total";
pub const METRIC_CACHE_INVALIDATED: &str = "voxline_cache_invalidated_total";
pub const METRIC_CACHE_SWEPT: &str = "voxline_cache_swept_total";

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct CacheStore {
    entries: RwLock<HashMap<String, CacheEntry>>,
    generations: Mutex<HashMap<String, u64>>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite `key`, visible until `ttl` from now.
    pub fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };
        rw_write(&self.entries, SOURCE, "set").insert(key.into(), entry);
    }

    /// Live value for `key`. An expired entry is removed on the way out.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        {
            let entries = rw_read(&self.entries, SOURCE, "get");
            match entries.get(key) {
                Some(entry) if entry.is_live(now) => {
                    counter!(METRIC_CACHE_HIT).increment(1);
                    return Some(entry.value.clone());
                }
                Some(_) => {}
                None => {
                    counter!(METRIC_CACHE_MISS).increment(1);
                    return None;
                }
            }
        }

        // Re-check under the write lock: a concurrent set may have refreshed it.
        let mut entries = rw_write(&self.entries, SOURCE, "get.expire");
        if let Some(entry) = entries.get(key)
            && entry.is_live(now)
        {
            counter!(METRIC_CACHE_HIT).increment(1);
            return Some(entry.value.clone());
        }
        entries.remove(key);
        counter!(METRIC_CACHE_MISS).increment(1);
        None
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key)?;
        match serde_json::from_value(value) {
            Ok(decoded) => Some(decoded),
            Err(err) => {
                warn!(
                    target = "voxline::cache",
                    key,
                    error = %err,
                    "Dropping cache entry with unexpected shape"
                );
                self.invalidate(key);
                None
            }
        }
    }

    pub fn set_json<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl: Duration) {
        let key = key.into();
        match serde_json::to_value(value) {
            Ok(value) => self.set(key, value, ttl),
            Err(err) => warn!(
                target = "voxline::cache",
                key = %key,
                error = %err,
                "Skipping cache write for unserializable value"
            ),
        }
    }

    /// Current generation of `scope`; zero until first advanced.
    pub fn generation(&self, scope: &str) -> u64 {
        mutex_lock(&self.generations, SOURCE, "generation")
            .get(scope)
            .copied()
            .unwrap_or(0)
    }

    /// Mark every fill of `scope` started before now as outdated. Call before
    /// purging that scope's keys.
    pub fn advance_generation(&self, scope: &str) -> u64 {
        let mut generations = mutex_lock(&self.generations, SOURCE, "advance_generation");
        let generation = generations.entry(scope.to_owned()).or_default();
        *generation += 1;
        *generation
    }

    /// Store `value` only while `scope` is still at `generation`. Returns
    /// whether the write happened.
    pub fn set_json_if_generation<T: Serialize>(
        &self,
        scope: &str,
        generation: u64,
        key: impl Into<String>,
        value: &T,
        ttl: Duration,
    ) -> bool {
        let key = key.into();
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    target = "voxline::cache",
                    key = %key,
                    error = %err,
                    "Skipping cache write for unserializable value"
                );
                return false;
            }
        };

        // The generation is checked while holding the entries lock; a purge
        // that follows an advance therefore either sees this entry or this
        // write sees the advanced generation.
        let mut entries = rw_write(&self.entries, SOURCE, "set_if_generation");
        if self.generation(scope) != generation {
            debug!(
                target = "voxline::cache",
                key = %key,
                "Discarding fill invalidated while in flight"
            );
            return false;
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
        true
    }

    /// Returns `true` when an entry was removed.
    pub fn invalidate(&self, key: &str) -> bool {
        let removed = rw_write(&self.entries, SOURCE, "invalidate")
            .remove(key)
            .is_some();
        if removed {
            counter!(METRIC_CACHE_INVALIDATED).increment(1);
        }
        removed
    }

    /// Remove every key matching `pattern`, expired or not. Returns the count.
    pub fn invalidate_pattern(&self, pattern: &Regex) -> usize {
        let removed = {
            let mut entries = rw_write(&self.entries, SOURCE, "invalidate_pattern");
            let before = entries.len();
            entries.retain(|key, _| !pattern.is_match(key));
            before - entries.len()
        };
        if removed > 0 {
            counter!(METRIC_CACHE_INVALIDATED).increment(removed as u64);
        }
        debug!(
            target = "voxline::cache",
            pattern = pattern.as_str(),
            removed,
            "Invalidated cache pattern"
        );
        removed
    }

    /// Compile `pattern` and invalidate with it. The only fallible cache call.
    pub fn invalidate_matching(&self, pattern: &str) -> Result<usize, regex::Error> {
        let regex = Regex::new(pattern)?;
        Ok(self.invalidate_pattern(&regex))
    }

    /// Drop every expired entry. Returns the count.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let removed = {
            let mut entries = rw_write(&self.entries, SOURCE, "sweep_expired");
            let before = entries.len();
            entries.retain(|_, entry| entry.is_live(now));
            before - entries.len()
        };
        if removed > 0 {
            counter!(METRIC_CACHE_SWEPT).increment(removed as u64);
        }
        removed
    }

    /// Number of stored entries, including ones that expired but were not yet
    /// read or swept.
    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[tokio::test(start_paused = true)]
    async fn entry_is_visible_until_expiry() {
        let store = CacheStore::new();
        store.set("dashboard:stats:u1", json!({"total_calls": 3}), MINUTE);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(
            store.get("dashboard:stats:u1"),
            Some(json!({"total_calls": 3}))
        );

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("dashboard:stats:u1"), None);
        assert!(store.is_empty(), "expired entry is removed on read");
    }

    #[tokio::test(start_paused = true)]
    async fn set_overwrites_value_and_expiry() {
        let store = CacheStore::new();
        store.set("k", json!(1), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;
        store.set("k", json!(2), Duration::from_secs(10));
        tokio::time::advance(Duration::from_secs(8)).await;
        assert_eq!(store.get("k"), Some(json!(2)));
    }

    #[test]
    fn invalidate_removes_single_key() {
        let store = CacheStore::new();
        store.set("a", json!(1), MINUTE);
        store.set("b", json!(2), MINUTE);
        assert!(store.invalidate("a"));
        assert!(!store.invalidate("a"));
        assert_eq!(store.get("a"), None);
        assert_eq!(store.get("b"), Some(json!(2)));
    }

    #[test]
    fn pattern_invalidation_only_touches_matching_keys() {
        let store = CacheStore::new();
        store.set("calls:search:u1:foo:1", json!([]), MINUTE);
        store.set("calls:search:u1:bar:2", json!([]), MINUTE);
        store.set("calls:search:u2:foo:1", json!([]), MINUTE);
        store.set("dashboard:stats:u1", json!({}), MINUTE);

        let removed = store
            .invalidate_matching("^calls:search:u1:")
            .expect("valid pattern");
        assert_eq!(removed, 2);
        assert_eq!(store.get("calls:search:u2:foo:1"), Some(json!([])));
        assert_eq!(store.get("dashboard:stats:u1"), Some(json!({})));
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let store = CacheStore::new();
        store.set("a", json!(1), MINUTE);
        assert!(store.invalidate_matching("(unclosed").is_err());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_only_expired_entries() {
        let store = CacheStore::new();
        store.set("short", json!(1), Duration::from_secs(5));
        store.set("long", json!(2), Duration::from_secs(500));
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("long"), Some(json!(2)));
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Stats {
        total_calls: u64,
    }

    #[test]
    fn json_helpers_round_trip_and_drop_bad_shapes() {
        let store = CacheStore::new();
        store.set_json("stats", &Stats { total_calls: 7 }, MINUTE);
        assert_eq!(
            store.get_json::<Stats>("stats"),
            Some(Stats { total_calls: 7 })
        );

        store.set("stats", json!("not an object"), MINUTE);
        assert_eq!(store.get_json::<Stats>("stats"), None);
        assert!(store.is_empty());
    }

    #[test]
    fn fill_is_dropped_after_generation_advances() {
        let store = CacheStore::new();
        let started = store.generation("u1");
        assert_eq!(started, 0);

        store.advance_generation("u1");
        assert!(!store.set_json_if_generation(
            "u1",
            started,
            "dashboard:stats:u1",
            &Stats { total_calls: 0 },
            MINUTE,
        ));
        assert!(store.is_empty());

        // Other scopes keep their own generation.
        assert!(store.set_json_if_generation(
            "u2",
            store.generation("u2"),
            "dashboard:stats:u2",
            &Stats { total_calls: 4 },
            MINUTE,
        ));
        assert_eq!(
            store.get_json::<Stats>("dashboard:stats:u2"),
            Some(Stats { total_calls: 4 })
        );
    }
}
