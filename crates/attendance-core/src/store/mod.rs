//! Persistent key-value storage.
//!
//! The portal keeps cache entries and session fields in a single flat
//! namespace of string keys and string values, bounded by a byte quota.
//! Two backends are provided:
//!
//! - `MemoryStore`: process-local, used by tests and short-lived tools
//! - `FileStore`: a JSON map in the cache directory, rewritten on each change

pub mod file;
pub mod memory;

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Default quota, matching what browsers grant a single origin.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage quota exceeded: {needed} bytes needed, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage file is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Flat string-to-string store shared by the cache and the session.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Fails with `StoreError::QuotaExceeded` when the write does not fit.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn remove_item(&self, key: &str) -> Result<(), StoreError>;

    fn keys(&self) -> Result<Vec<String>, StoreError>;
}

pub type SharedStore = Arc<dyn KeyValueStore>;

/// Bytes a map occupies, counting keys and values.
pub(crate) fn used_bytes(items: &BTreeMap<String, String>) -> usize {
    items.iter().map(|(k, v)| k.len() + v.len()).sum()
}

/// Check whether replacing `key` with `value` stays within `quota`.
pub(crate) fn check_quota(
    items: &BTreeMap<String, String>,
    key: &str,
    value: &str,
    quota: usize,
) -> Result<(), StoreError> {
    let existing = items.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
    let needed = used_bytes(items) - existing + key.len() + value.len();
    if needed > quota {
        return Err(StoreError::QuotaExceeded { needed, quota });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_quota_counts_replacement_once() {
        let mut items = BTreeMap::new();
        items.insert("k".to_string(), "12345".to_string());
        // Replacing the same key with an equal-size value fits exactly
        assert!(check_quota(&items, "k", "abcde", 6).is_ok());
        assert!(matches!(
            check_quota(&items, "other", "x", 6),
            Err(StoreError::QuotaExceeded { needed: 8, quota: 6 })
        ));
    }
}
