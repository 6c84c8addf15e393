//! TTL-governed result cache over pluggable key/value stores.

pub mod clock;
pub mod result_cache;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use result_cache::{is_fresh, Lookup, Origin, ResultCache, Served};
pub use store::{CacheEntry, CacheStore, EntryInfo, JsonFileStore, MemoryStore};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache lock poisoned")]
    Poisoned,
}
