//! Parsers for the exchange pages the system reads.
//!
//! Each parser is a pure function of markup. Missing tables produce empty
//! results; rows that do not parse are skipped.

use super::extract::{RawRow, RawTable, TableExtractor, TableSelector};
use super::normalize::{normalize_rows, parse_date, parse_number, HOLDING_RULES, QUOTE_RULES};
use crate::domain::{CanonicalField, DailyBar, FieldValue, MetricRecord, PartialBar};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::ops::Range;

const QUOTE_TABLE_CLASS: &str = "table table-bordered background-white";
/// Quote-class tables read as key/value rows.
const KEY_VALUE_TABLES: usize = 3;
/// Positions of the financial performance and P/E tables among quote-class tables.
const FINANCIAL_TABLE: usize = 6;
const PE_TABLE: usize = 7;
const PRICE_BOARD_CLASS: &str = "shares-table";
const PRICE_BOARD_MIN_CELLS: usize = 11;
const INDEX_NAMES: &[&str] = &["DSEX", "DSES", "DS30"];

// ── Company quote ──────────────────────────────────────────────────

/// Normalized fields from a company quote page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyQuote {
    pub symbol: String,
    pub metrics: MetricRecord,
}

impl CompanyQuote {
    pub fn last_traded_price(&self) -> Option<f64> {
        self.metrics.number(CanonicalField::LastTradedPrice)
    }

    /// Same-day bar synthesized from the quote. Open, high and low fall back
    /// to the last traded price; volume defaults to zero. `None` without a
    /// last traded price, or when the prices contradict each other.
    pub fn live_bar(&self, date: NaiveDate) -> Option<DailyBar> {
        let ltp = self.last_traded_price()?;
        let field = |f| self.metrics.number(f).unwrap_or(ltp);
        let bar = PartialBar {
            date: Some(date),
            open: Some(field(CanonicalField::Open)),
            high: Some(field(CanonicalField::High)),
            low: Some(field(CanonicalField::Low)),
            close: Some(ltp),
            volume: Some(self.metrics.number(CanonicalField::Volume).unwrap_or(0.0)),
        }
        .complete()?;
        if !bar.is_sane() {
            tracing::warn!(
                symbol = %self.symbol,
                open = bar.open,
                high = bar.high,
                low = bar.low,
                close = bar.close,
                "implausible live quote, skipping"
            );
            return None;
        }
        Some(bar)
    }
}

/// Parse a company page. Quote, basic-information and dividend tables are
/// folded into one record, basic EPS and NAV come from the last row of the
/// financial table, P/E from the last row of the P/E table, and the share
/// holding line is picked up from whichever table carries it. `None` when
/// nothing normalized.
pub fn parse_company_page(symbol: &str, markup: &str) -> Option<CompanyQuote> {
    let extractor = TableExtractor::parse(markup);
    let tables = extractor.tables(&TableSelector::Class(QUOTE_TABLE_CLASS.into()));
    let mut metrics = MetricRecord::new();
    for table in tables.iter().take(KEY_VALUE_TABLES) {
        metrics.absorb(normalize_rows(&table.rows, QUOTE_RULES));
    }

    let mut put = |field, value: Option<f64>| {
        if let Some(v) = value {
            metrics.insert_first(field, FieldValue::Number(v));
        }
    };
    if let Some(row) = tables.get(FINANCIAL_TABLE).and_then(last_data_row) {
        put(CanonicalField::EpsBasic, first_nonzero(row, 1..6));
        put(CanonicalField::Nav, first_nonzero(row, 6..10));
    }
    if let Some(row) = tables.get(PE_TABLE).and_then(last_data_row) {
        put(CanonicalField::PeBasic, first_nonzero(row, 1..4));
    }

    for table in extractor.tables(&TableSelector::All) {
        metrics.absorb(normalize_rows(&table.rows, HOLDING_RULES));
    }

    if metrics.is_empty() {
        tracing::debug!(symbol, "company page yielded no fields");
        return None;
    }
    Some(CompanyQuote {
        symbol: symbol.to_uppercase(),
        metrics,
    })
}

/// Last row of a table that has a header row, when it has more than a label.
fn last_data_row(table: &RawTable) -> Option<&RawRow> {
    if table.rows.len() < 2 {
        return None;
    }
    table.rows.last().filter(|row| row.len() > 1)
}

/// First cell in `cells` that parses to a non-zero number.
fn first_nonzero(row: &RawRow, cells: Range<usize>) -> Option<f64> {
    row.iter()
        .skip(cells.start)
        .take(cells.len())
        .filter_map(|cell| parse_number(cell))
        .find(|v| *v != 0.0)
}

// ── Latest price board ─────────────────────────────────────────────

/// One instrument on the latest share price board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBoardRow {
    pub symbol: String,
    pub ltp: f64,
    pub high: f64,
    pub low: f64,
    /// Closing price; the board shows `0` until the session closes.
    pub close: Option<f64>,
    pub ycp: f64,
    pub change: f64,
    pub percent_change: f64,
    pub trade: u64,
    pub value: f64,
    pub volume: u64,
    pub open: f64,
}

pub fn parse_price_board(markup: &str) -> Vec<PriceBoardRow> {
    let extractor = TableExtractor::parse(markup);
    let Some(table) = extractor.first(&TableSelector::Class(PRICE_BOARD_CLASS.into())) else {
        return Vec::new();
    };
    table
        .rows_with_at_least(PRICE_BOARD_MIN_CELLS)
        .filter_map(price_board_row)
        .collect()
}

fn price_board_row(cells: &RawRow) -> Option<PriceBoardRow> {
    let num = |i: usize| parse_number(&cells[i]);
    let count = |i: usize| num(i).filter(|v| *v >= 0.0).map(|v| v.round() as u64);

    let symbol = cells[1].trim().to_string();
    if symbol.is_empty() {
        return None;
    }
    let close = num(5)?;
    let close = (close != 0.0).then_some(close);
    let ycp = num(6)?;
    let change = num(7)?;
    let percent_change = if ycp > 0.0 {
        (change / ycp * 100.0 * 100.0).round() / 100.0
    } else {
        0.0
    };

    Some(PriceBoardRow {
        symbol,
        ltp: num(2)?,
        high: num(3)?,
        low: num(4)?,
        close,
        ycp,
        change,
        percent_change,
        trade: count(8)?,
        value: num(9)?,
        volume: count(10)?,
        open: close.unwrap_or(ycp),
    })
}

// ── Day-end archive ────────────────────────────────────────────────

/// Column positions inside an archive table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ArchiveColumns {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl ArchiveColumns {
    /// Layout of the exchange archive: #, DATE, TRADING CODE, LTP, HIGH, LOW,
    /// OPENP, CLOSEP, YCP, TRADE, VALUE, VOLUME.
    const POSITIONAL: Self = Self {
        date: 1,
        open: 6,
        high: 4,
        low: 5,
        close: 7,
        volume: 11,
    };

    fn width(&self) -> usize {
        [self.date, self.open, self.high, self.low, self.close, self.volume]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Resolve by header names: DATE, HIGH, LOW and VOLUME exactly, OPEN and
    /// CLOSE by substring.
    fn from_header(header: &RawRow) -> Option<Self> {
        let upper: Vec<String> = header.iter().map(|h| h.trim().to_uppercase()).collect();
        let exact = |name: &str| upper.iter().position(|h| h == name);
        let containing = |name: &str| upper.iter().position(|h| h.contains(name));
        Some(Self {
            date: exact("DATE")?,
            high: exact("HIGH")?,
            low: exact("LOW")?,
            volume: exact("VOLUME")?,
            open: containing("OPEN")?,
            close: containing("CLOSE")?,
        })
    }

    /// Positional layout, accepted only when the first wide row carries a date
    /// where the layout expects one.
    fn positional_for(table: &RawTable) -> Option<Self> {
        let layout = Self::POSITIONAL;
        table
            .rows_with_at_least(layout.width())
            .find_map(|row| parse_date(&row[layout.date]))
            .map(|_| layout)
    }

    fn read(&self, row: &RawRow) -> Option<PartialBar> {
        if row.len() < self.width() {
            return None;
        }
        let date = parse_date(&row[self.date])?;
        Some(PartialBar {
            date: Some(date),
            open: parse_number(&row[self.open]),
            high: parse_number(&row[self.high]),
            low: parse_number(&row[self.low]),
            close: parse_number(&row[self.close]),
            volume: parse_number(&row[self.volume]),
        })
    }
}

/// Parse a day-end archive page into date-keyed partial bars, sorted by date.
///
/// Columns are located by header name; tables whose header does not resolve
/// fall back to the exchange's positional layout.
pub fn parse_archive_page(markup: &str) -> Vec<PartialBar> {
    let tables = TableExtractor::parse(markup).tables(&TableSelector::All);
    let resolved = tables
        .iter()
        .find_map(|t| t.header().and_then(ArchiveColumns::from_header).map(|c| (t, c, true)))
        .or_else(|| {
            tables
                .iter()
                .find_map(|t| ArchiveColumns::positional_for(t).map(|c| (t, c, false)))
        });

    let Some((table, columns, named)) = resolved else {
        return Vec::new();
    };
    let rows = if named { table.body() } else { &table.rows[..] };
    let mut bars: Vec<PartialBar> = rows.iter().filter_map(|r| columns.read(r)).collect();
    bars.sort_by_key(|b| b.date);
    tracing::debug!(rows = bars.len(), named, "parsed archive table");
    bars
}

// ── Market indices ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub name: String,
    pub value: f64,
    pub change: f64,
    pub percent_change: f64,
}

/// Parse the index snapshot from the home page.
///
/// Reads the `LeftColHome` block layout first and falls back to scanning
/// tables for rows naming a known index.
pub fn parse_indices(markup: &str) -> Vec<IndexSnapshot> {
    let extractor = TableExtractor::parse(markup);
    let blocks = extractor.blocks("div.LeftColHome div._row", "div.midrow", "div[class*='m_col-']");
    let from_blocks: Vec<IndexSnapshot> = blocks
        .iter()
        .filter(|row| row.len() >= 4 && row[0].contains("Index"))
        .filter_map(|row| {
            let name = index_name(&row[0])?;
            Some(IndexSnapshot {
                name: name.to_string(),
                value: parse_number(&row[1])?,
                change: parse_number(&row[2])?,
                percent_change: parse_number(&row[3])?,
            })
        })
        .collect();
    if !from_blocks.is_empty() {
        return from_blocks;
    }

    let mut found: Vec<IndexSnapshot> = Vec::new();
    for table in extractor.tables(&TableSelector::All) {
        for row in &table.rows {
            let Some(name) = row.first().and_then(|c| index_name(c)) else {
                continue;
            };
            if found.iter().any(|s| s.name == name) {
                continue;
            }
            let numbers: Vec<f64> = row[1..].iter().filter_map(|c| parse_number(c)).take(3).collect();
            if let [value, change, percent_change] = numbers[..] {
                found.push(IndexSnapshot {
                    name: name.to_string(),
                    value,
                    change,
                    percent_change,
                });
            }
        }
    }
    found
}

fn index_name(text: &str) -> Option<&'static str> {
    INDEX_NAMES.iter().copied().find(|name| text.contains(name))
}
