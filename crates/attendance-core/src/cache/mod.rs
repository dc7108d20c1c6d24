//! TTL cache on top of the key-value store.
//!
//! Entries live under `cache_<key>` next to the session fields and carry
//! their own timestamp and time-to-live. Expired entries are removed the
//! first time they are read. When the store is full, the oldest half of
//! the cache entries is evicted and the write is retried once.

pub mod manager;

pub use manager::{CacheEntry, CacheStats, CacheWrite, EntrySummary, TtlCache, CACHE_PREFIX};
