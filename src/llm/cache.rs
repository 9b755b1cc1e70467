//! TTL cache for provider model lists.
//!
//! The cache is a plain value `{entries, ttl, clock}` handed to whoever needs
//! it. Expiry is computed from an injected [`Clock`], so tests drive time with
//! a [`ManualClock`] instead of sleeping.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use super::ModelInfo;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = chrono::Duration::from_std(by).unwrap_or(chrono::Duration::MAX);
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now = now.checked_add_signed(by).unwrap_or(*now);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    models: Vec<ModelInfo>,
    fetched_at: DateTime<Utc>,
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Model lists keyed by provider name, valid for `ttl` after fetching.
pub struct ModelListCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ModelListCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        match (now - entry.fetched_at).to_std() {
            Ok(age) => age < self.ttl,
            // Fetched "in the future" (clock moved back): still fresh.
            Err(_) => true,
        }
    }

    /// Cached models for `provider`, if present and not expired.
    pub fn get(&self, provider: &str) -> Option<Vec<ModelInfo>> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        let found = entries
            .get(provider)
            .filter(|entry| self.is_fresh(entry, now))
            .map(|entry| entry.models.clone());

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, provider: impl Into<String>, models: Vec<ModelInfo>) {
        let entry = CacheEntry {
            models,
            fetched_at: self.clock.now(),
        };
        self.entries
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .insert(provider.into(), entry);
    }

    pub fn invalidate(&self, provider: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .remove(provider)
            .is_some()
    }

    /// Drops expired entries, returning how many were removed.
    pub fn evict_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| self.is_fresh(entry, now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().expect("valid date")
    }

    fn cache_with_clock(ttl_secs: u64) -> (ModelListCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let cache = ModelListCache::with_clock(Duration::from_secs(ttl_secs), clock.clone());
        (cache, clock)
    }

    #[test]
    fn test_entry_expires_after_ttl() {
        let (cache, clock) = cache_with_clock(300);
        cache.insert("openrouter", vec![ModelInfo::new("m1")]);

        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get("openrouter"), Some(vec![ModelInfo::new("m1")]));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get("openrouter"), None);

        let stats = cache.stats();
        assert_eq!(stats, CacheStats { hits: 1, misses: 1 });
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_providers_are_cached_separately() {
        let (cache, _clock) = cache_with_clock(60);
        cache.insert("a", vec![ModelInfo::new("m1")]);
        cache.insert("b", vec![ModelInfo::new("m2"), ModelInfo::new("m3")]);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("b").map(|m| m.len()), Some(2));
        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.get("a"), None);
    }

    #[test]
    fn test_evict_expired() {
        let (cache, clock) = cache_with_clock(60);
        cache.insert("old", vec![]);
        clock.advance(Duration::from_secs(30));
        cache.insert("new", vec![]);
        clock.advance(Duration::from_secs(30));

        assert_eq!(cache.evict_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("new").is_some());
    }

    #[test]
    fn test_clock_moving_backwards_keeps_entry() {
        let (cache, clock) = cache_with_clock(60);
        clock.advance(Duration::from_secs(100));
        cache.insert("p", vec![]);
        clock.set(start());
        assert!(cache.get("p").is_some());
    }
}
