//! Persistent memo of concept-id lookups.
//!
//! Stored as a JSON object mapping a lower-cased drug name to the resolved id,
//! or `null` when the service reported no such drug. The whole file is
//! rewritten atomically after every new entry.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use crate::fs_util::write_atomic;
use crate::{DrugScanError, Result};

type Entries = BTreeMap<String, Option<String>>;

#[derive(Debug, Default)]
pub struct LookupCache {
    entries: Mutex<Entries>,
    path: Option<PathBuf>,
}

impl LookupCache {
    /// Cache that never touches the filesystem.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the cache at `path`. A missing file is an empty cache.
    pub fn try_load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = std::fs::read(&path)?;
            serde_json::from_slice::<Entries>(&content).map_err(|e| {
                DrugScanError::CacheCorruption(format!("{}: {e}", path.display()))
            })?
        } else {
            Entries::new()
        };
        debug!(path = %path.display(), entries = entries.len(), "Loaded lookup cache");
        Ok(Self {
            entries: Mutex::new(entries),
            path: Some(path),
        })
    }

    /// Like [`try_load`](Self::try_load), but an unreadable or corrupt file
    /// yields an empty cache. The bad file is overwritten on the next insert.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match Self::try_load(path.clone()) {
            Ok(cache) => cache,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Lookup cache unusable, starting empty");
                Self {
                    entries: Mutex::new(Entries::new()),
                    path: Some(path),
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// `None` on a miss; `Some(None)` for a cached "not found".
    pub fn get(&self, name: &str) -> Option<Option<String>> {
        self.lock().get(&name.to_lowercase()).cloned()
    }

    /// Record a resolution and persist the cache.
    pub fn insert(&self, name: &str, value: Option<String>) -> Result<()> {
        let mut entries = self.lock();
        entries.insert(name.to_lowercase(), value);
        self.persist(&entries)
    }

    /// Cached value for `name`, resolving and recording it on a miss.
    ///
    /// `resolve` runs without the cache lock held. Failed resolutions are not
    /// cached. A failure to persist a fresh value is logged and the value is
    /// still returned.
    pub fn get_or_resolve<F>(&self, name: &str, resolve: F) -> Result<Option<String>>
    where
        F: FnOnce(&str) -> Result<Option<String>>,
    {
        let key = name.to_lowercase();
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }
        let value = resolve(&key)?;
        if let Err(e) = self.insert(&key, value.clone()) {
            warn!(name = %key, error = %e, "Failed to persist lookup cache");
        }
        Ok(value)
    }

    fn persist(&self, entries: &Entries) -> Result<()> {
        match &self.path {
            Some(path) => write_atomic(path, &serde_json::to_vec_pretty(entries)?),
            None => Ok(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let cache = LookupCache::try_load(dir.path().join("cache.json")).unwrap();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_persist_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");

        let cache = LookupCache::load(&path);
        cache.insert("Aspirin", Some("1112807".into())).unwrap();
        cache.insert("unobtainium", None).unwrap();

        let reloaded = LookupCache::try_load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("aspirin"), Some(Some("1112807".into())));
        assert_eq!(reloaded.get("unobtainium"), Some(None));
        assert_eq!(reloaded.get("tylenol"), None);
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, b"{\"aspirin\": ").unwrap();

        assert!(matches!(
            LookupCache::try_load(&path),
            Err(DrugScanError::CacheCorruption(_))
        ));

        let cache = LookupCache::load(&path);
        assert!(cache.is_empty());
        cache.insert("aspirin", Some("1".into())).unwrap();
        assert_eq!(LookupCache::try_load(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_get_or_resolve_memoizes() {
        let cache = LookupCache::in_memory();
        let calls = Cell::new(0);
        let resolve = |name: &str| -> Result<Option<String>> {
            calls.set(calls.get() + 1);
            Ok(if name == "aspirin" { Some("42".to_string()) } else { None })
        };

        assert_eq!(cache.get_or_resolve("Aspirin", resolve).unwrap(), Some("42".into()));
        assert_eq!(cache.get_or_resolve("ASPIRIN", resolve).unwrap(), Some("42".into()));
        assert_eq!(cache.get_or_resolve("nothing", resolve).unwrap(), None);
        assert_eq!(cache.get_or_resolve("nothing", resolve).unwrap(), None);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_failed_resolution_not_cached() {
        let cache = LookupCache::in_memory();
        let result = cache.get_or_resolve("aspirin", |_| {
            Err(DrugScanError::ExternalService("timeout".into()))
        });
        assert!(result.is_err());
        assert!(cache.get("aspirin").is_none());
    }
}
