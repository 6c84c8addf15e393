//! Key/value stores behind the result cache.
//!
//! - `MemoryStore`: entries behind `Arc`, swapped whole on upsert
//! - `JsonFileStore`: one JSON file per key, written to a unique temp file then renamed

use super::CacheError;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

/// A payload and the moment it was fetched. Replaced whole, never patched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<P> {
    pub key: String,
    pub payload: P,
    pub fetched_at: DateTime<Utc>,
}

/// Key and timestamp of a stored entry, without its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub key: String,
    pub fetched_at: DateTime<Utc>,
}

/// Get-by-key / upsert-by-key storage.
pub trait CacheStore<P>: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Arc<CacheEntry<P>>>, CacheError>;

    fn upsert(&self, entry: CacheEntry<P>) -> Result<(), CacheError>;

    fn entries(&self) -> Result<Vec<EntryInfo>, CacheError>;

    /// Drop every entry; returns how many were removed.
    fn clear(&self) -> Result<usize, CacheError>;
}

// ── in-memory ──────────────────────────────────────────────────────

#[derive(Debug)]
pub struct MemoryStore<P> {
    entries: RwLock<HashMap<String, Arc<CacheEntry<P>>>>,
}

impl<P> Default for MemoryStore<P> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<P> MemoryStore<P> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P: Send + Sync> CacheStore<P> for MemoryStore<P> {
    fn get(&self, key: &str) -> Result<Option<Arc<CacheEntry<P>>>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn upsert(&self, entry: CacheEntry<P>) -> Result<(), CacheError> {
        let entry = Arc::new(entry);
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<EntryInfo>, CacheError> {
        let entries = self.entries.read().map_err(|_| CacheError::Poisoned)?;
        let mut infos: Vec<EntryInfo> = entries
            .values()
            .map(|e| EntryInfo {
                key: e.key.clone(),
                fetched_at: e.fetched_at,
            })
            .collect();
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.write().map_err(|_| CacheError::Poisoned)?;
        let n = entries.len();
        entries.clear();
        Ok(n)
    }
}

// ── JSON files ─────────────────────────────────────────────────────

/// One `<blake3(key)>.json` file per entry under a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let digest = blake3::hash(key.as_bytes()).to_hex();
        self.dir.join(format!("{}.json", &digest[..32]))
    }

    fn json_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        Ok(paths)
    }
}

impl<P> CacheStore<P> for JsonFileStore
where
    P: Serialize + DeserializeOwned + Send + Sync,
{
    fn get(&self, key: &str) -> Result<Option<Arc<CacheEntry<P>>>, CacheError> {
        let path = self.path_for(key);
        let json = match fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let entry: CacheEntry<P> = serde_json::from_str(&json)?;
        // A digest collision would hand back someone else's entry.
        if entry.key != key {
            return Ok(None);
        }
        Ok(Some(Arc::new(entry)))
    }

    fn upsert(&self, entry: CacheEntry<P>) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(&entry.key);
        let json = serde_json::to_vec_pretty(&entry)?;
        // Each writer gets its own temp file; the rename is the only shared step.
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&json)?;
        tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<EntryInfo>, CacheError> {
        let mut infos = Vec::new();
        for path in self.json_files()? {
            let json = fs::read_to_string(&path)?;
            match serde_json::from_str::<EntryInfo>(&json) {
                Ok(info) => infos.push(info),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "unreadable cache file"),
            }
        }
        infos.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(infos)
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let files = self.json_files()?;
        for path in &files {
            fs::remove_file(path)?;
        }
        Ok(files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(key: &str, payload: Vec<u32>) -> CacheEntry<Vec<u32>> {
        CacheEntry {
            key: key.to_string(),
            payload,
            fetched_at: Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn memory_store_replaces_whole_entries() {
        let store = MemoryStore::new();
        store.upsert(entry("k", vec![1])).unwrap();
        let first = store.get("k").unwrap().unwrap();
        store.upsert(entry("k", vec![2, 3])).unwrap();
        // readers holding the old Arc keep a consistent snapshot
        assert_eq!(first.payload, vec![1]);
        assert_eq!(store.get("k").unwrap().unwrap().payload, vec![2, 3]);
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn memory_store_lists_and_clears() {
        let store = MemoryStore::new();
        store.upsert(entry("b", vec![])).unwrap();
        store.upsert(entry("a", vec![])).unwrap();
        let keys: Vec<_> = store.entries().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(CacheStore::<Vec<u32>>::clear(&store).unwrap(), 2);
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("cache"));
        assert!(CacheStore::<Vec<u32>>::get(&store, "details:GP").unwrap().is_none());

        store.upsert(entry("details:GP", vec![7, 8])).unwrap();
        let got: Arc<CacheEntry<Vec<u32>>> = store.get("details:GP").unwrap().unwrap();
        assert_eq!(got.payload, vec![7, 8]);
        assert_eq!(got.fetched_at, entry("x", vec![]).fetched_at);

        let infos = CacheStore::<Vec<u32>>::entries(&store).unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].key, "details:GP");
        assert!(!dir.path().join("cache").read_dir().unwrap().any(|e| {
            e.unwrap().path().extension().and_then(|s| s.to_str()) == Some("tmp")
        }));
    }

    #[test]
    fn json_store_concurrent_upserts_and_reads() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(JsonFileStore::new(dir.path()));
        for round in 0..20u32 {
            let writers: Vec<_> = (0..8u32)
                .map(|t| {
                    let store = Arc::clone(&store);
                    std::thread::spawn(move || store.upsert(entry("latest_prices", vec![round, t])))
                })
                .collect();
            let reader = {
                let store = Arc::clone(&store);
                std::thread::spawn(move || CacheStore::<Vec<u32>>::get(&*store, "latest_prices").map(|_| ()))
            };
            for writer in writers {
                writer.join().unwrap().unwrap();
            }
            reader.join().unwrap().unwrap();
            let got: Arc<CacheEntry<Vec<u32>>> = store.get("latest_prices").unwrap().unwrap();
            assert_eq!(got.payload[0], round);
        }
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn json_store_clear_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.upsert(entry("a", vec![1])).unwrap();
        store.upsert(entry("b", vec![2])).unwrap();
        assert_eq!(CacheStore::<Vec<u32>>::clear(&store).unwrap(), 2);
        assert!(CacheStore::<Vec<u32>>::entries(&store).unwrap().is_empty());
    }

    #[test]
    fn json_store_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        store.upsert(entry("a", vec![1])).unwrap();
        let path = store.path_for("a");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            CacheStore::<Vec<u32>>::get(&store, "a"),
            Err(CacheError::Serialization(_))
        ));
    }
}
