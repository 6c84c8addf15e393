//! Series merging across sources.
//!
//! Sources are applied in precedence order, lowest first. For a given date the
//! last source to supply a bar wins wholesale; there is no field-level mixing.
//! Bars still missing a price after resolution are dropped.

use crate::domain::{DailyBar, PartialBar, Series};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Counts describing one merge, for logging and reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub sources: usize,
    pub input_bars: usize,
    /// Bars without a date.
    pub undated: usize,
    /// Dates whose bar was replaced by a later source.
    pub overridden: usize,
    /// Dates dropped because the winning bar was incomplete.
    pub incomplete: usize,
    pub live_replaced: bool,
}

/// Merges per-source bars for one instrument into a [`Series`].
#[derive(Debug, Clone, Default)]
pub struct SeriesMerger {
    sources: Vec<(String, Vec<PartialBar>)>,
    live: Option<DailyBar>,
}

impl SeriesMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source; each call outranks every earlier one.
    pub fn source(mut self, name: impl Into<String>, bars: Vec<PartialBar>) -> Self {
        self.sources.push((name.into(), bars));
        self
    }

    /// Current-session quote; replaces any bar already present for its date.
    pub fn live_bar(mut self, bar: Option<DailyBar>) -> Self {
        self.live = bar;
        self
    }

    pub fn merge(self) -> (Series, MergeStats) {
        let mut stats = MergeStats {
            sources: self.sources.len(),
            ..MergeStats::default()
        };
        let mut by_date: BTreeMap<NaiveDate, PartialBar> = BTreeMap::new();

        for (name, bars) in self.sources {
            let before = stats.overridden;
            stats.input_bars += bars.len();
            for bar in bars {
                let Some(date) = bar.date else {
                    stats.undated += 1;
                    continue;
                };
                if by_date.insert(date, bar).is_some() {
                    stats.overridden += 1;
                }
            }
            tracing::debug!(source = %name, overridden = stats.overridden - before, "applied source");
        }

        if let Some(live) = self.live {
            stats.live_replaced = by_date.insert(live.date, live.into()).is_some();
        }

        let mut complete = BTreeMap::new();
        for (date, bar) in by_date {
            match bar.complete() {
                Some(bar) => {
                    complete.insert(date, bar);
                }
                None => stats.incomplete += 1,
            }
        }

        let series = Series::from_keyed(complete);
        tracing::debug!(rows = series.len(), ?stats, "merged series");
        (series, stats)
    }
}

/// Merge sources given lowest precedence first.
pub fn merge_sources(sources: Vec<Vec<PartialBar>>) -> Series {
    sources
        .into_iter()
        .enumerate()
        .fold(SeriesMerger::new(), |m, (i, bars)| m.source(format!("source-{i}"), bars))
        .merge()
        .0
}
