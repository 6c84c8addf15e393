//! On-disk result cache administration: listing and clearing entries.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use lilycast_core::cache::{is_fresh, CacheStore, EntryInfo, JsonFileStore};
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::CacheConfig;
use crate::market::{CacheTtls, INDICES_KEY, PRICES_KEY};

/// One cached entry with its age and freshness.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryStatus {
    pub key: String,
    pub fetched_at: DateTime<Utc>,
    pub age_secs: i64,
    pub ttl_secs: i64,
    pub fresh: bool,
}

/// Handle on the cache directory used by the market services.
#[derive(Debug, Clone)]
pub struct CacheAdmin {
    dir: PathBuf,
    store: JsonFileStore,
    ttls: CacheTtls,
}

impl CacheAdmin {
    pub fn new(dir: impl AsRef<Path>, ttls: CacheTtls) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            store: JsonFileStore::new(&dir),
            dir,
            ttls,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(&config.dir, CacheTtls::from(config))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// TTL governing `key`.
    pub fn ttl_for(&self, key: &str) -> Duration {
        match key {
            PRICES_KEY => self.ttls.prices,
            INDICES_KEY => self.ttls.indices,
            _ => self.ttls.details,
        }
    }

    /// Every entry, sorted by key, judged against `now`.
    pub fn status(&self, now: DateTime<Utc>) -> Result<Vec<EntryStatus>> {
        let entries: Vec<EntryInfo> = CacheStore::<serde_json::Value>::entries(&self.store)
            .with_context(|| format!("Failed to list cache entries in {}", self.dir.display()))?;
        Ok(entries
            .into_iter()
            .map(|info| {
                let ttl = self.ttl_for(&info.key);
                EntryStatus {
                    age_secs: now.signed_duration_since(info.fetched_at).num_seconds(),
                    ttl_secs: ttl.num_seconds(),
                    fresh: is_fresh(info.fetched_at, now, ttl),
                    key: info.key,
                    fetched_at: info.fetched_at,
                }
            })
            .collect())
    }

    /// Number of cached entries.
    pub fn len(&self) -> Result<usize> {
        Ok(self.status(Utc::now())?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Remove every entry; returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let removed = CacheStore::<serde_json::Value>::clear(&self.store)
            .with_context(|| format!("Failed to clear cache in {}", self.dir.display()))?;
        tracing::info!(dir = %self.dir.display(), removed, "cleared cache");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lilycast_core::cache::CacheEntry;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn put(store: &JsonFileStore, key: &str, fetched_at: DateTime<Utc>) {
        store
            .upsert(CacheEntry {
                key: key.to_string(),
                payload: serde_json::json!([]),
                fetched_at,
            })
            .unwrap();
    }

    #[test]
    fn status_applies_per_key_ttls() {
        let dir = tempfile::tempdir().unwrap();
        let admin = CacheAdmin::new(dir.path(), CacheTtls::default());
        put(&admin.store, INDICES_KEY, at(0));
        put(&admin.store, PRICES_KEY, at(0));
        put(&admin.store, "details:GP", at(0));

        let status = admin.status(at(200)).unwrap();
        let by_key: Vec<(&str, bool)> = status.iter().map(|s| (s.key.as_str(), s.fresh)).collect();
        assert_eq!(
            by_key,
            vec![("details:GP", true), ("latest_prices", true), ("market_indices", false)]
        );
        assert_eq!(status[2].age_secs, 200);
        assert_eq!(status[2].ttl_secs, 120);
    }

    #[test]
    fn clear_empties_the_directory() {
        let dir = tempfile::tempdir().unwrap();
        let admin = CacheAdmin::new(dir.path().join("cache"), CacheTtls::default());
        assert!(admin.is_empty().unwrap());
        put(&admin.store, INDICES_KEY, at(0));
        put(&admin.store, "details:GP", at(0));
        assert_eq!(admin.len().unwrap(), 2);
        assert_eq!(admin.clear().unwrap(), 2);
        assert!(admin.is_empty().unwrap());
    }
}
