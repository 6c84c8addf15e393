//! Serve-from-cache-until-stale, with fallback to the last good payload.
//!
//! Freshness: an entry is fresh while `now - fetched_at < ttl`, measured over
//! the full elapsed duration. An entry stamped in the future counts as fresh.

use super::clock::{Clock, SystemClock};
use super::store::{CacheEntry, CacheStore};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::fmt::Display;
use std::sync::Arc;

pub fn is_fresh(fetched_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    now.signed_duration_since(fetched_at) < ttl
}

/// A stored entry and whether it is still within its TTL.
#[derive(Debug, Clone)]
pub struct Lookup<P> {
    pub entry: Arc<CacheEntry<P>>,
    pub fresh: bool,
}

/// Where a served payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Cached and within TTL.
    Cache,
    /// Just refreshed.
    Refreshed,
    /// Refresh failed; last known payload.
    Stale,
    /// Refresh failed and nothing was cached.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Served<P> {
    pub payload: P,
    pub origin: Origin,
    pub fetched_at: Option<DateTime<Utc>>,
}

/// TTL cache in front of an expensive refresh.
pub struct ResultCache<P> {
    store: Arc<dyn CacheStore<P>>,
    clock: Arc<dyn Clock>,
}

impl<P> Clone for ResultCache<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<P> ResultCache<P>
where
    P: Clone + Default,
{
    pub fn new(store: Arc<dyn CacheStore<P>>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn CacheStore<P>>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// `(payload, is_fresh)` for `key`, or `None` when nothing is stored.
    /// Store failures read as a miss.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<Lookup<P>> {
        let entry = match self.store.get(key) {
            Ok(entry) => entry?,
            Err(e) => {
                tracing::warn!(key, error = %e, "cache read failed");
                return None;
            }
        };
        let fresh = is_fresh(entry.fetched_at, self.clock.now(), ttl);
        Some(Lookup { entry, fresh })
    }

    /// Store `payload` stamped with the current time.
    pub fn put(&self, key: &str, payload: P) -> DateTime<Utc> {
        let fetched_at = self.clock.now();
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            fetched_at,
        };
        if let Err(e) = self.store.upsert(entry) {
            tracing::warn!(key, error = %e, "cache write failed");
        }
        fetched_at
    }

    /// Serve the cached payload while fresh; otherwise refresh. A failed
    /// refresh serves the last payload if one exists, else `P::default()`.
    pub fn get_or_refresh<F, E>(&self, key: &str, ttl: Duration, refresh: F) -> Served<P>
    where
        F: FnOnce() -> Result<P, E>,
        E: Display,
    {
        let cached = self.get(key, ttl);
        if let Some(hit) = cached.as_ref().filter(|l| l.fresh) {
            return Served {
                payload: hit.entry.payload.clone(),
                origin: Origin::Cache,
                fetched_at: Some(hit.entry.fetched_at),
            };
        }

        match refresh() {
            Ok(payload) => {
                let fetched_at = self.put(key, payload.clone());
                Served {
                    payload,
                    origin: Origin::Refreshed,
                    fetched_at: Some(fetched_at),
                }
            }
            Err(e) => match cached {
                Some(stale) => {
                    tracing::warn!(key, error = %e, "refresh failed, serving stale payload");
                    Served {
                        payload: stale.entry.payload.clone(),
                        origin: Origin::Stale,
                        fetched_at: Some(stale.entry.fetched_at),
                    }
                }
                None => {
                    tracing::warn!(key, error = %e, "refresh failed with nothing cached");
                    Served {
                        payload: P::default(),
                        origin: Origin::Empty,
                        fetched_at: None,
                    }
                }
            },
        }
    }
}
