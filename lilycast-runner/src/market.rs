//! Cached market services: price board, index snapshot, company details and
//! uncached price history.
//!
//! Every cached call follows the same policy: serve while fresh, refresh when
//! missing or stale, and on a failed refresh serve the last payload (or an
//! empty one). A page that parses to nothing counts as a failed refresh so a
//! broken page never replaces a good snapshot.

use chrono::{Duration, NaiveDate};
use lilycast_core::cache::{CacheStore, Clock, JsonFileStore, MemoryStore, ResultCache, Served, SystemClock};
use lilycast_core::data::{
    parse_archive_page, parse_company_page, parse_indices, parse_price_board, CompanyQuote, ContentSource,
    DataError, IndexSnapshot, Page, PriceBoardRow, SeriesMerger,
};
use lilycast_core::domain::Series;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use crate::config::CacheConfig;

pub const PRICES_KEY: &str = "latest_prices";
pub const INDICES_KEY: &str = "market_indices";

/// Longest history the day-end archive is asked for.
pub const MAX_HISTORY_DAYS: i64 = 730;

pub fn details_key(symbol: &str) -> String {
    format!("details:{}", symbol.trim().to_uppercase())
}

/// Chart range for [`MarketService::history`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryRange {
    #[serde(rename = "1D")]
    OneDay,
    #[serde(rename = "5D")]
    FiveDays,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "6M")]
    SixMonths,
    #[serde(rename = "1Y")]
    OneYear,
    #[serde(rename = "2Y")]
    TwoYears,
}

impl HistoryRange {
    /// Calendar days requested from the archive. A one-day chart still loads
    /// the full window.
    pub fn days(self) -> i64 {
        let days = match self {
            Self::OneDay => 730,
            Self::FiveDays => 7,
            Self::OneMonth => 30,
            Self::SixMonths => 180,
            Self::OneYear => 365,
            Self::TwoYears => 730,
        };
        days.min(MAX_HISTORY_DAYS)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OneDay => "1D",
            Self::FiveDays => "5D",
            Self::OneMonth => "1M",
            Self::SixMonths => "6M",
            Self::OneYear => "1Y",
            Self::TwoYears => "2Y",
        }
    }
}

impl fmt::Display for HistoryRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "1D" => Ok(Self::OneDay),
            "5D" => Ok(Self::FiveDays),
            "1M" => Ok(Self::OneMonth),
            "6M" => Ok(Self::SixMonths),
            "1Y" => Ok(Self::OneYear),
            "2Y" => Ok(Self::TwoYears),
            other => Err(format!("unknown range '{other}' (expected 1D, 5D, 1M, 6M, 1Y or 2Y)")),
        }
    }
}

/// TTLs per cached endpoint.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheTtls {
    pub prices: Duration,
    pub indices: Duration,
    pub details: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheTtls {
    fn from(config: &CacheConfig) -> Self {
        Self {
            prices: config.prices_ttl(),
            indices: config.indices_ttl(),
            details: config.details_ttl(),
        }
    }
}

/// Market data endpoints behind result caches.
#[derive(Clone)]
pub struct MarketService {
    source: Arc<dyn ContentSource>,
    prices: ResultCache<Vec<PriceBoardRow>>,
    indices: ResultCache<Vec<IndexSnapshot>>,
    details: ResultCache<Option<CompanyQuote>>,
    ttls: CacheTtls,
}

impl MarketService {
    /// Caches held in process memory.
    pub fn in_memory(source: Arc<dyn ContentSource>, ttls: CacheTtls, clock: Arc<dyn Clock>) -> Self {
        Self::with_stores(
            source,
            Arc::new(MemoryStore::<Vec<PriceBoardRow>>::new()),
            Arc::new(MemoryStore::<Vec<IndexSnapshot>>::new()),
            Arc::new(MemoryStore::<Option<CompanyQuote>>::new()),
            ttls,
            clock,
        )
    }

    /// Caches persisted as JSON files under `dir`, shared across runs.
    pub fn persistent(source: Arc<dyn ContentSource>, dir: impl AsRef<Path>, ttls: CacheTtls) -> Self {
        let store = Arc::new(JsonFileStore::new(dir.as_ref()));
        Self::with_stores(source, store.clone(), store.clone(), store, ttls, Arc::new(SystemClock))
    }

    pub fn with_stores(
        source: Arc<dyn ContentSource>,
        prices: Arc<dyn CacheStore<Vec<PriceBoardRow>>>,
        indices: Arc<dyn CacheStore<Vec<IndexSnapshot>>>,
        details: Arc<dyn CacheStore<Option<CompanyQuote>>>,
        ttls: CacheTtls,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            source,
            prices: ResultCache::with_clock(prices, clock.clone()),
            indices: ResultCache::with_clock(indices, clock.clone()),
            details: ResultCache::with_clock(details, clock),
            ttls,
        }
    }

    /// Full price board.
    pub fn latest_prices(&self) -> Served<Vec<PriceBoardRow>> {
        self.prices.get_or_refresh(PRICES_KEY, self.ttls.prices, || {
            let rows = parse_price_board(&self.source.fetch(&Page::LatestPrices)?);
            non_empty(rows, "price board")
        })
    }

    /// One row of the price board.
    pub fn price(&self, symbol: &str) -> Option<PriceBoardRow> {
        let symbol = symbol.trim().to_uppercase();
        self.latest_prices().payload.into_iter().find(|row| row.symbol == symbol)
    }

    /// DSEX, DSES and DS30.
    pub fn indices(&self) -> Served<Vec<IndexSnapshot>> {
        self.indices.get_or_refresh(INDICES_KEY, self.ttls.indices, || {
            let indices = parse_indices(&self.source.fetch(&Page::Home)?);
            non_empty(indices, "index snapshot")
        })
    }

    /// Normalized company page fields.
    pub fn company_details(&self, symbol: &str) -> Served<Option<CompanyQuote>> {
        let symbol = symbol.trim().to_uppercase();
        self.details.get_or_refresh(&details_key(&symbol), self.ttls.details, || {
            let page = Page::Company { symbol: symbol.clone() };
            parse_company_page(&symbol, &self.source.fetch(&page)?)
                .map(Some)
                .ok_or_else(|| DataError::SourceUnavailable(format!("no fields parsed for {symbol}")))
        })
    }

    /// Daily bars for `range` ending `today`, with today's bar replaced by the
    /// live quote when one is available. Not cached; failing sources yield
    /// fewer bars rather than an error. Without archive bars there is no
    /// history to extend, so the live quote is not consulted.
    pub fn history(&self, symbol: &str, range: HistoryRange, today: NaiveDate) -> Series {
        let symbol = symbol.trim().to_uppercase();
        let page = Page::DayEndArchive {
            symbol: symbol.clone(),
            start: today - Duration::days(range.days()),
            end: today,
        };
        let bars = match self.source.fetch(&page) {
            Ok(markup) => parse_archive_page(&markup),
            Err(e) => {
                tracing::warn!(symbol = %symbol, %range, error = %e, "history fetch failed");
                Vec::new()
            }
        };

        if bars.is_empty() {
            tracing::debug!(symbol = %symbol, %range, "no archive bars, skipping live quote");
            return Series::default();
        }

        // the live quote must be current, so it bypasses the details cache
        let live = match self.source.fetch(&Page::Company { symbol: symbol.clone() }) {
            Ok(markup) => parse_company_page(&symbol, &markup).and_then(|quote| quote.live_bar(today)),
            Err(e) => {
                tracing::debug!(symbol = %symbol, error = %e, "no live quote for history");
                None
            }
        };

        let (series, stats) = SeriesMerger::new().source("day_end_archive", bars).live_bar(live).merge();
        tracing::debug!(symbol = %symbol, %range, rows = series.len(), live = stats.live_replaced, "history");
        series
    }
}

fn non_empty<T>(items: Vec<T>, what: &str) -> Result<Vec<T>, DataError> {
    if items.is_empty() {
        Err(DataError::SourceUnavailable(format!("{what} parsed to nothing")))
    } else {
        Ok(items)
    }
}
