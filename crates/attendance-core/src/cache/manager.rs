use anyhow::{Context, Result};
use chrono::Utc;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::store::{SharedStore, StoreError};

/// Prefix that separates cache entries from session and credential keys.
pub const CACHE_PREFIX: &str = "cache_";

/// Default time-to-live: 5 minutes.
pub const DEFAULT_TTL_MS: i64 = 5 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Value,
    /// Epoch milliseconds at write time
    pub timestamp: i64,
    /// Lifetime in milliseconds
    pub ttl: i64,
}

impl CacheEntry {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms - self.timestamp > self.ttl
    }

    pub fn age_display(&self, now_ms: i64) -> String {
        let minutes = (now_ms - self.timestamp) / 60_000;
        if minutes < 1 {
            // Clock skew lands here too
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

/// What happened to a `set` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheWrite {
    Stored,
    /// The store was full; `evicted` old entries were dropped first.
    StoredAfterEviction { evicted: usize },
    /// Still full after eviction. The value was not cached.
    Dropped,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    pub total_keys: usize,
    pub valid_keys: usize,
    pub expired_keys: usize,
    pub total_size: usize,
    pub total_size_kb: f64,
}

#[derive(Debug, Clone)]
pub struct EntrySummary {
    pub key: String,
    pub age: String,
    pub expired: bool,
}

/// Cache handle. Clone is cheap, the store is shared.
#[derive(Clone)]
pub struct TtlCache {
    store: SharedStore,
    default_ttl_ms: i64,
}

fn storage_key(key: &str) -> String {
    format!("{}{}", CACHE_PREFIX, key)
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl TtlCache {
    pub fn new(store: SharedStore) -> Self {
        Self::with_default_ttl(store, DEFAULT_TTL_MS)
    }

    pub fn with_default_ttl(store: SharedStore, default_ttl_ms: i64) -> Self {
        Self {
            store,
            default_ttl_ms,
        }
    }

    pub fn default_ttl_ms(&self) -> i64 {
        self.default_ttl_ms
    }

    /// Store a value with the default TTL.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<CacheWrite> {
        self.set(key, value, self.default_ttl_ms)
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl_ms: i64) -> Result<CacheWrite> {
        self.set_at(key, value, ttl_ms, now_ms())
    }

    pub(crate) fn set_at<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl_ms: i64,
        now: i64,
    ) -> Result<CacheWrite> {
        let entry = CacheEntry {
            value: serde_json::to_value(value)
                .with_context(|| format!("Failed to serialize cache value: {}", key))?,
            timestamp: now,
            ttl: ttl_ms,
        };
        let contents = serde_json::to_string(&entry)?;
        let full_key = storage_key(key);

        match self.store.set_item(&full_key, &contents) {
            Ok(()) => Ok(CacheWrite::Stored),
            Err(StoreError::QuotaExceeded { needed, quota }) => {
                warn!(cache = key, needed, quota, "Store full, evicting oldest cache entries");
                let evicted = self.evict_oldest_half()?;
                match self.store.set_item(&full_key, &contents) {
                    Ok(()) => Ok(CacheWrite::StoredAfterEviction { evicted }),
                    Err(e) => {
                        warn!(cache = key, error = %e, "Cache write dropped after eviction");
                        Ok(CacheWrite::Dropped)
                    }
                }
            }
            Err(e) => Err(e).with_context(|| format!("Failed to write cache entry: {}", key)),
        }
    }

    /// Fetch a value, removing it if it has expired.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_at(key, now_ms())
    }

    pub(crate) fn get_at<T: DeserializeOwned>(&self, key: &str, now: i64) -> Option<T> {
        let full_key = storage_key(key);
        let raw = match self.store.get_item(&full_key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!(cache = key, error = %e, "Failed to read cache entry");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                debug!(cache = key, error = %e, "Unparseable cache entry");
                return None;
            }
        };

        if entry.is_expired_at(now) {
            if let Err(e) = self.store.remove_item(&full_key) {
                debug!(cache = key, error = %e, "Failed to remove expired cache entry");
            }
            return None;
        }

        serde_json::from_value(entry.value).ok()
    }

    pub fn has(&self, key: &str) -> bool {
        self.get::<Value>(key).is_some()
    }

    pub(crate) fn has_at(&self, key: &str, now: i64) -> bool {
        self.get_at::<Value>(key, now).is_some()
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.store
            .remove_item(&storage_key(key))
            .with_context(|| format!("Failed to remove cache entry: {}", key))
    }

    /// Remove every cache entry. Other keys in the store are left alone.
    pub fn clear(&self) -> Result<()> {
        for key in self.cache_keys()? {
            self.store.remove_item(&key)?;
        }
        Ok(())
    }

    /// Evict `ceil(n / 2)` of the oldest cache entries. Returns how many went.
    pub fn evict_oldest_half(&self) -> Result<usize> {
        let mut aged: Vec<(String, i64)> = self
            .cache_keys()?
            .into_iter()
            .map(|key| {
                let timestamp = self
                    .store
                    .get_item(&key)
                    .ok()
                    .flatten()
                    .and_then(|raw| serde_json::from_str::<CacheEntry>(&raw).ok())
                    .map(|entry| entry.timestamp)
                    .unwrap_or(0);
                (key, timestamp)
            })
            .collect();

        aged.sort_by_key(|(_, timestamp)| *timestamp);

        let remove_count = aged.len().div_ceil(2);
        for (key, _) in aged.iter().take(remove_count) {
            self.store.remove_item(key)?;
        }
        debug!(evicted = remove_count, "Evicted oldest cache entries");
        Ok(remove_count)
    }

    /// Total bytes held by cache entries.
    pub fn size(&self) -> usize {
        self.cache_keys()
            .unwrap_or_default()
            .iter()
            .filter_map(|key| self.store.get_item(key).ok().flatten())
            .map(|raw| raw.len())
            .sum()
    }

    pub fn stats(&self) -> Result<CacheStats> {
        self.stats_at(now_ms())
    }

    pub(crate) fn stats_at(&self, now: i64) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for key in self.cache_keys()? {
            let raw = self.store.get_item(&key)?.unwrap_or_default();
            stats.total_keys += 1;
            stats.total_size += raw.len();
            match serde_json::from_str::<CacheEntry>(&raw) {
                Ok(entry) if !entry.is_expired_at(now) => stats.valid_keys += 1,
                _ => stats.expired_keys += 1,
            }
        }
        stats.total_size_kb = (stats.total_size as f64 / 1024.0 * 100.0).round() / 100.0;
        Ok(stats)
    }

    /// Per-entry listing for display, oldest first.
    pub fn entries(&self) -> Result<Vec<EntrySummary>> {
        let now = now_ms();
        let mut entries: Vec<(i64, EntrySummary)> = Vec::new();
        for key in self.cache_keys()? {
            let Some(raw) = self.store.get_item(&key)? else {
                continue;
            };
            let name = key.trim_start_matches(CACHE_PREFIX).to_string();
            match serde_json::from_str::<CacheEntry>(&raw) {
                Ok(entry) => entries.push((
                    entry.timestamp,
                    EntrySummary {
                        key: name,
                        age: entry.age_display(now),
                        expired: entry.is_expired_at(now),
                    },
                )),
                Err(_) => entries.push((
                    0,
                    EntrySummary {
                        key: name,
                        age: "unknown".to_string(),
                        expired: true,
                    },
                )),
            }
        }
        entries.sort_by_key(|(timestamp, _)| *timestamp);
        Ok(entries.into_iter().map(|(_, summary)| summary).collect())
    }

    fn cache_keys(&self) -> Result<Vec<String>> {
        Ok(self
            .store
            .keys()?
            .into_iter()
            .filter(|key| key.starts_with(CACHE_PREFIX))
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
