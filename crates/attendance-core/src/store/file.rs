use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

use super::{check_quota, KeyValueStore, StoreError, DEFAULT_QUOTA_BYTES};

/// Store file name in cache directory
const STORE_FILE: &str = "storage.json";

/// Store backed by one JSON file, loaded once and rewritten after every change.
pub struct FileStore {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
    quota: usize,
}

impl FileStore {
    pub fn open(cache_dir: &Path) -> Result<Self, StoreError> {
        Self::open_with_quota(cache_dir, DEFAULT_QUOTA_BYTES)
    }

    pub fn open_with_quota(cache_dir: &Path, quota: usize) -> Result<Self, StoreError> {
        std::fs::create_dir_all(cache_dir)?;
        let path = cache_dir.join(STORE_FILE);

        let items = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&contents) {
                Ok(items) => items,
                Err(e) => {
                    // An unreadable store is treated like a wiped browser profile
                    warn!(path = %path.display(), error = %e, "Discarding corrupt store file");
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), keys = items.len(), "Store opened");
        Ok(Self {
            path,
            items: Mutex::new(items),
            quota,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, items: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let contents = serde_json::to_string_pretty(items)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
        let items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        check_quota(&items, key, value, self.quota)?;
        let previous = items.insert(key.to_string(), value.to_string());
        // Memory never holds a value the file does not
        if let Err(e) = self.persist(&items) {
            match previous {
                Some(previous) => items.insert(key.to_string(), previous),
                None => items.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StoreError> {
        let mut items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        if let Some(previous) = items.remove(key) {
            if let Err(e) = self.persist(&items) {
                items.insert(key.to_string(), previous);
                return Err(e);
            }
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StoreError> {
        let items = self.items.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(items.keys().cloned().collect())
    }
}
