//! Series loading for the forecast pipeline.
//!
//! Gathers one instrument's bars from every configured source and merges
//! them, lowest precedence first:
//! 1. Archive CSV rows dated on or before the cutoff
//! 2. Scraped day-end archive rows dated after the cutoff
//! 3. The live company quote, as the as-of day's bar, only when the as-of
//!    date is the current session
//!
//! The merged series is cut to the history span ending on the as-of date.
//! A failing source is logged and skipped. Loading only fails when every
//! attempted source failed.

use chrono::{Duration, Months, NaiveDate};
use lilycast_core::data::{
    parse_archive_page, parse_company_page, ArchiveReader, ContentSource, DataError, MergeStats, Page,
    SeriesMerger,
};
use lilycast_core::domain::{DailyBar, PartialBar, Series};
use serde::Serialize;
use std::path::PathBuf;

use crate::config::LilycastConfig;

/// Options controlling how a series is assembled.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub archive_path: Option<PathBuf>,
    pub cutoff: NaiveDate,
    pub scrape_window_days: i64,
    pub history_years: u32,
    pub include_live_quote: bool,
    /// Today's session date. The live quote belongs to this date only; `None`
    /// treats every as-of date as current.
    pub session_date: Option<NaiveDate>,
}

impl LoadOptions {
    pub fn from_config(config: &LilycastConfig) -> Self {
        Self {
            archive_path: config.archive.path.clone(),
            cutoff: config.forecast.archive_cutoff,
            scrape_window_days: config.forecast.scrape_window_days,
            history_years: config.forecast.history_years,
            include_live_quote: config.forecast.include_live_quote,
            session_date: None,
        }
    }

    pub fn with_session_date(mut self, date: NaiveDate) -> Self {
        self.session_date = Some(date);
        self
    }

    /// Whether the live quote may stand in for the `as_of` bar.
    pub fn live_quote_applies(&self, as_of: NaiveDate) -> bool {
        self.include_live_quote && self.session_date.map_or(true, |today| as_of >= today)
    }

    /// Date range requested from the day-end archive, or `None` when the
    /// archive covers everything up to `as_of`.
    pub fn scrape_range(&self, as_of: NaiveDate) -> Option<(NaiveDate, NaiveDate)> {
        let after_cutoff = self.cutoff.succ_opt()?;
        if as_of < after_cutoff {
            return None;
        }
        let window_start = as_of - Duration::days(self.scrape_window_days);
        Some((window_start.max(after_cutoff), as_of))
    }

    /// First date kept after trimming to the trailing history span.
    pub fn history_start(&self, as_of: NaiveDate) -> NaiveDate {
        as_of
            .checked_sub_months(Months::new(12 * self.history_years))
            .unwrap_or(NaiveDate::MIN)
    }
}

/// What one source contributed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceReport {
    pub name: &'static str,
    pub bars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A merged, trimmed series and where it came from.
#[derive(Debug, Clone)]
pub struct LoadedSeries {
    pub symbol: String,
    pub series: Series,
    pub stats: MergeStats,
    pub sources: Vec<SourceReport>,
}

/// Per-source outcomes collected while loading.
#[derive(Default)]
struct SourceLog {
    reports: Vec<SourceReport>,
    last_error: Option<DataError>,
}

impl SourceLog {
    /// Record `result`; a failure is logged and yields `T::default()`.
    fn absorb<T: Default>(
        &mut self,
        symbol: &str,
        name: &'static str,
        result: Result<T, DataError>,
        count: impl Fn(&T) -> usize,
    ) -> T {
        match result {
            Ok(value) => {
                self.reports.push(SourceReport {
                    name,
                    bars: count(&value),
                    error: None,
                });
                value
            }
            Err(e) => {
                tracing::warn!(symbol, source = name, error = %e, "source unavailable, continuing");
                self.reports.push(SourceReport {
                    name,
                    bars: 0,
                    error: Some(e.to_string()),
                });
                self.last_error = Some(e);
                T::default()
            }
        }
    }
}

/// Load and merge every source for `symbol` as of `as_of`.
pub fn load_series(
    source: &dyn ContentSource,
    symbol: &str,
    as_of: NaiveDate,
    opts: &LoadOptions,
) -> Result<LoadedSeries, DataError> {
    let symbol = symbol.trim().to_uppercase();
    let mut log = SourceLog::default();

    let archive = match &opts.archive_path {
        Some(path) => log.absorb(
            &symbol,
            "archive",
            ArchiveReader::new(opts.cutoff).read_path(path, &symbol),
            Vec::len,
        ),
        None => Vec::new(),
    };

    let scraped = match opts.scrape_range(as_of) {
        Some((start, end)) => log.absorb(
            &symbol,
            "day_end_archive",
            scrape_archive(source, &symbol, start, end, opts.cutoff),
            Vec::len,
        ),
        None => Vec::new(),
    };

    let live = if opts.live_quote_applies(as_of) {
        log.absorb(&symbol, "live_quote", live_quote(source, &symbol, as_of), |b| {
            usize::from(b.is_some())
        })
    } else {
        None
    };

    if log.reports.iter().all(|r| r.error.is_some()) {
        if let Some(e) = log.last_error {
            return Err(e);
        }
    }

    let (merged, stats) = SeriesMerger::new()
        .source("archive", archive)
        .source("day_end_archive", scraped)
        .live_bar(live)
        .merge();
    let series = merged.since(opts.history_start(as_of)).until(as_of);
    tracing::debug!(
        symbol = %symbol,
        merged = merged.len(),
        kept = series.len(),
        overridden = stats.overridden,
        incomplete = stats.incomplete,
        %as_of,
        "loaded series"
    );

    Ok(LoadedSeries {
        symbol,
        series,
        stats,
        sources: log.reports,
    })
}

fn scrape_archive(
    source: &dyn ContentSource,
    symbol: &str,
    start: NaiveDate,
    end: NaiveDate,
    cutoff: NaiveDate,
) -> Result<Vec<PartialBar>, DataError> {
    let page = Page::DayEndArchive {
        symbol: symbol.to_string(),
        start,
        end,
    };
    let markup = source.fetch(&page)?;
    Ok(parse_archive_page(&markup)
        .into_iter()
        .filter(|bar| bar.date.is_some_and(|d| d > cutoff))
        .collect())
}

fn live_quote(source: &dyn ContentSource, symbol: &str, as_of: NaiveDate) -> Result<Option<DailyBar>, DataError> {
    let markup = source.fetch(&Page::Company {
        symbol: symbol.to_string(),
    })?;
    Ok(parse_company_page(symbol, &markup).and_then(|quote| quote.live_bar(as_of)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lilycast_core::data::StaticSource;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn opts() -> LoadOptions {
        LoadOptions {
            archive_path: None,
            cutoff: d(2025, 4, 15),
            scrape_window_days: 730,
            history_years: 2,
            include_live_quote: true,
            session_date: None,
        }
    }

    #[test]
    fn scrape_range_starts_after_cutoff() {
        let o = opts();
        assert_eq!(o.scrape_range(d(2025, 6, 1)), Some((d(2025, 4, 16), d(2025, 6, 1))));
        assert_eq!(o.scrape_range(d(2025, 4, 15)), None);
        let narrow = LoadOptions {
            scrape_window_days: 10,
            ..opts()
        };
        assert_eq!(narrow.scrape_range(d(2025, 6, 1)), Some((d(2025, 5, 22), d(2025, 6, 1))));
    }

    #[test]
    fn history_start_is_whole_years_back() {
        assert_eq!(opts().history_start(d(2025, 6, 1)), d(2023, 6, 1));
    }

    #[test]
    fn every_source_failing_is_an_error() {
        let source = StaticSource::new();
        assert!(load_series(&source, "GP", d(2025, 6, 1), &opts()).is_err());
    }

    #[test]
    fn missing_live_quote_is_not_fatal() {
        let as_of = d(2025, 4, 18);
        let markup = r#"<table>
            <tr><th>DATE</th><th>OPENP*</th><th>HIGH</th><th>LOW</th><th>CLOSEP*</th><th>VOLUME</th></tr>
            <tr><td>2025-04-17</td><td>10</td><td>11</td><td>9</td><td>10.5</td><td>100</td></tr>
            <tr><td>2025-04-10</td><td>10</td><td>11</td><td>9</td><td>10.5</td><td>100</td></tr>
        </table>"#;
        let source = StaticSource::new().with_page(
            Page::DayEndArchive {
                symbol: "GP".into(),
                start: d(2025, 4, 16),
                end: as_of,
            },
            markup,
        );
        let loaded = load_series(&source, "gp", as_of, &opts()).unwrap();
        assert_eq!(loaded.symbol, "GP");
        // the 04-10 row predates the cutoff and belongs to the archive
        assert_eq!(loaded.series.len(), 1);
        assert_eq!(loaded.sources.len(), 2);
        assert!(loaded.sources[1].error.is_some());
        assert_eq!(loaded.stats.sources, 2);
    }

    #[test]
    fn live_quote_only_for_the_current_session() {
        let o = opts().with_session_date(d(2025, 6, 1));
        assert!(o.live_quote_applies(d(2025, 6, 1)));
        assert!(!o.live_quote_applies(d(2025, 5, 31)));
        assert!(opts().live_quote_applies(d(2020, 1, 1)));
        let off = LoadOptions {
            include_live_quote: false,
            ..opts()
        };
        assert!(!off.live_quote_applies(d(2025, 6, 1)));
    }

    #[test]
    fn backdated_load_skips_live_quote_and_later_rows() {
        let as_of = d(2025, 5, 1);
        let archive = r#"<table>
            <tr><th>DATE</th><th>OPENP*</th><th>HIGH</th><th>LOW</th><th>CLOSEP*</th><th>VOLUME</th></tr>
            <tr><td>2025-04-20</td><td>10</td><td>11</td><td>9</td><td>10.5</td><td>100</td></tr>
            <tr><td>2025-05-01</td><td>10</td><td>11</td><td>9</td><td>10.8</td><td>100</td></tr>
            <tr><td>2025-05-02</td><td>10</td><td>11</td><td>9</td><td>11.0</td><td>100</td></tr>
        </table>"#;
        let company = r#"<table class="table table-bordered background-white">
            <tr><th>Last Trading Price</th><td>99.0</td></tr></table>"#;
        let source = StaticSource::new()
            .with_page(
                Page::DayEndArchive {
                    symbol: "GP".into(),
                    start: d(2025, 4, 16),
                    end: as_of,
                },
                archive,
            )
            .with_page(Page::Company { symbol: "GP".into() }, company);
        let o = opts().with_session_date(d(2025, 6, 1));
        let loaded = load_series(&source, "GP", as_of, &o).unwrap();
        assert_eq!(loaded.series.last().unwrap().date, as_of);
        assert_eq!(loaded.series.last().unwrap().close, 10.8);
        assert_eq!(loaded.series.len(), 2);
        assert!(loaded.sources.iter().all(|s| s.name != "live_quote"));
    }
}
