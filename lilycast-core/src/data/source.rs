//! Content source trait and structured error types.
//!
//! The ContentSource trait abstracts over where page markup comes from (the
//! exchange website, canned fixtures) so parsers never touch the network and
//! tests can hand in markup directly.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Base URL of the exchange website.
pub const DEFAULT_BASE_URL: &str = "https://www.dsebd.org";

/// Structured error types for data acquisition.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("archive error: {0}")]
    Archive(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A page the exchange publishes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Page {
    /// Company quote page.
    Company { symbol: String },
    /// Latest share price board for every listed instrument.
    LatestPrices,
    /// Home page; carries the index snapshot.
    Home,
    /// Day-end archive for one instrument over a date range.
    DayEndArchive {
        symbol: String,
        start: NaiveDate,
        end: NaiveDate,
    },
}

impl Page {
    /// Path and query relative to the site root.
    pub fn path(&self) -> String {
        match self {
            Page::Company { symbol } => format!("/displayCompany.php?name={symbol}"),
            Page::LatestPrices => "/latest_share_price_scroll_by_value.php".to_string(),
            Page::Home => "/".to_string(),
            Page::DayEndArchive { symbol, start, end } => format!(
                "/day_end_archive.php?startDate={start}&endDate={end}\
                 &inst={symbol}&archive=data"
            ),
        }
    }

    pub fn url(&self, base: &str) -> String {
        format!("{}{}", base.trim_end_matches('/'), self.path())
    }
}

/// Supplies raw markup for a page.
///
/// Empty markup is a valid answer and parses to zero records downstream.
pub trait ContentSource: Send + Sync {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    fn fetch(&self, page: &Page) -> Result<String, DataError>;
}

/// Fixed markup keyed by page. Unknown pages are `SourceUnavailable`.
#[derive(Debug, Default)]
pub struct StaticSource {
    pages: RwLock<HashMap<Page, String>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, page: Page, markup: impl Into<String>) -> Self {
        self.insert(page, markup);
        self
    }

    pub fn insert(&self, page: Page, markup: impl Into<String>) {
        if let Ok(mut pages) = self.pages.write() {
            pages.insert(page, markup.into());
        }
    }

    pub fn remove(&self, page: &Page) {
        if let Ok(mut pages) = self.pages.write() {
            pages.remove(page);
        }
    }
}

impl ContentSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch(&self, page: &Page) -> Result<String, DataError> {
        let pages = self
            .pages
            .read()
            .map_err(|_| DataError::SourceUnavailable("static source lock poisoned".into()))?;
        pages
            .get(page)
            .cloned()
            .ok_or_else(|| DataError::SourceUnavailable(format!("no markup for {}", page.path())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_without_double_slash() {
        let page = Page::Company {
            symbol: "GP".into(),
        };
        assert_eq!(
            page.url("https://www.dsebd.org/"),
            "https://www.dsebd.org/displayCompany.php?name=GP"
        );
    }

    #[test]
    fn archive_url_carries_range() {
        let page = Page::DayEndArchive {
            symbol: "GP".into(),
            start: NaiveDate::from_ymd_opt(2025, 4, 16).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 5, 1).unwrap(),
        };
        let url = page.url(DEFAULT_BASE_URL);
        assert!(url.contains("startDate=2025-04-16"));
        assert!(url.contains("endDate=2025-05-01"));
        assert!(url.contains("inst=GP"));
    }

    #[test]
    fn static_source_serves_and_misses() {
        let source = StaticSource::new().with_page(Page::Home, "<html></html>");
        assert_eq!(source.fetch(&Page::Home).unwrap(), "<html></html>");
        assert!(matches!(
            source.fetch(&Page::LatestPrices),
            Err(DataError::SourceUnavailable(_))
        ));
        source.remove(&Page::Home);
        assert!(source.fetch(&Page::Home).is_err());
    }
}
