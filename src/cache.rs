use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{ScoutError, ScoutResult};

/// Computed results keyed by dataset path and versioned by a hash of the file
/// contents. A changed file misses and is recomputed; nothing else expires.
pub struct DatasetCache<T> {
    entries: Mutex<HashMap<PathBuf, CacheEntry<T>>>,
}

struct CacheEntry<T> {
    version: String,
    value: Arc<T>,
}

impl<T> Default for DatasetCache<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> DatasetCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_load<F>(&self, path: &Path, load: F) -> ScoutResult<Arc<T>>
    where
        F: FnOnce(&Path) -> ScoutResult<T>,
    {
        let version = dataset_version(path)?;
        let key = path.to_path_buf();

        {
            let guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(entry) = guard.get(&key) {
                if entry.version == version {
                    debug!(path = %path.display(), "dataset cache hit");
                    return Ok(entry.value.clone());
                }
            }
        }

        debug!(path = %path.display(), version = %version, "dataset cache miss");
        let value = Arc::new(load(path)?);
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        guard.insert(
            key,
            CacheEntry {
                version,
                value: value.clone(),
            },
        );
        Ok(value)
    }

    pub fn invalidate(&self, path: &Path) -> bool {
        let mut guard = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        guard.remove(path).is_some()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hex SHA-256 of the file contents.
pub fn dataset_version(path: &Path) -> ScoutResult<String> {
    let bytes = fs::read(path).map_err(|err| {
        ScoutError::DataUnavailable(format!("cannot read {}: {err}", path.display()))
    })?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}
