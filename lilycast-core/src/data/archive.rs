//! Historical archive CSV reader.
//!
//! The bulk archive holds one row per (date, instrument) for every listed
//! code. Rows are pre-validated upstream, so close-only rows are accepted and
//! become flat bars.

use super::normalize::{parse_date, parse_number};
use super::source::DataError;
use crate::domain::PartialBar;
use chrono::NaiveDate;
use csv::ReaderBuilder;
use serde::Deserialize;
use std::io::Read;
use std::path::Path;

/// Last date the bulk archive is authoritative for; later sessions come from
/// the live day-end archive page.
pub fn default_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 15).unwrap_or(NaiveDate::MIN)
}

#[derive(Debug, Deserialize)]
struct ArchiveRow {
    #[serde(alias = "date", alias = "DATE")]
    #[serde(rename = "Date")]
    date: String,
    #[serde(alias = "trading_code", alias = "TRADING CODE", alias = "Symbol")]
    #[serde(rename = "Trading_Code")]
    code: String,
    #[serde(rename = "Close", alias = "close", alias = "CLOSEP")]
    close: Option<String>,
    #[serde(rename = "Open", alias = "open", default)]
    open: Option<String>,
    #[serde(rename = "High", alias = "high", default)]
    high: Option<String>,
    #[serde(rename = "Low", alias = "low", default)]
    low: Option<String>,
    #[serde(rename = "Volume", alias = "volume", default)]
    volume: Option<String>,
}

/// Reads one instrument's rows from the bulk archive, up to a cutoff date.
#[derive(Debug, Clone)]
pub struct ArchiveReader {
    cutoff: NaiveDate,
}

impl Default for ArchiveReader {
    fn default() -> Self {
        Self {
            cutoff: default_cutoff(),
        }
    }
}

impl ArchiveReader {
    pub fn new(cutoff: NaiveDate) -> Self {
        Self { cutoff }
    }

    pub fn cutoff(&self) -> NaiveDate {
        self.cutoff
    }

    pub fn read_path(&self, path: impl AsRef<Path>, symbol: &str) -> Result<Vec<PartialBar>, DataError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .map_err(|e| DataError::Archive(format!("cannot open {}: {e}", path.display())))?;
        self.read(file, symbol)
    }

    /// Rows for `symbol` dated on or before the cutoff, sorted by date.
    pub fn read<R: Read>(&self, input: R, symbol: &str) -> Result<Vec<PartialBar>, DataError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(input);

        let symbol = symbol.trim().to_uppercase();
        let mut bars = Vec::new();
        let mut skipped = 0usize;

        for result in reader.deserialize::<ArchiveRow>() {
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    skipped += 1;
                    tracing::debug!(error = %e, "skipping unreadable archive row");
                    continue;
                }
            };
            if row.code.to_uppercase() != symbol {
                continue;
            }
            let Some(date) = parse_date(&row.date) else {
                skipped += 1;
                continue;
            };
            if date > self.cutoff {
                continue;
            }
            match to_bar(date, &row) {
                Some(bar) => bars.push(bar),
                None => skipped += 1,
            }
        }

        bars.sort_by_key(|b| b.date);
        tracing::debug!(symbol = %symbol, rows = bars.len(), skipped, cutoff = %self.cutoff, "read archive");
        Ok(bars)
    }
}

fn to_bar(date: NaiveDate, row: &ArchiveRow) -> Option<PartialBar> {
    let num = |v: &Option<String>| v.as_deref().and_then(parse_number);
    let close = num(&row.close)?;
    Some(PartialBar {
        date: Some(date),
        open: Some(num(&row.open).unwrap_or(close)),
        high: Some(num(&row.high).unwrap_or(close)),
        low: Some(num(&row.low).unwrap_or(close)),
        close: Some(close),
        volume: Some(num(&row.volume).unwrap_or(0.0)),
    })
}
