//! Field normalization: source labels → canonical fields, text → typed values.
//!
//! Keys are matched against an ordered rule table; the first rule whose key
//! pattern matches decides the outcome. Order is the contract: exclusion rules
//! (`FieldRule::Ignore`) sit directly above the generic rule they shadow, so
//! "Adjusted Opening Price" is dropped before "opening price" can claim it.
//!
//! A value that fails to parse leaves its field absent. Nothing in this module
//! returns an error.

use crate::data::extract::RawRow;
use crate::domain::{CanonicalField, FieldValue, MetricRecord};
use chrono::NaiveDate;

/// How a rule recognises a key. Keys are compared after [`canonical_key`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyMatch {
    /// Key contains the pattern.
    Contains(&'static str),
    /// Key contains every pattern.
    AllOf(&'static [&'static str]),
    /// Key equals the pattern.
    Exact(&'static str),
}

impl KeyMatch {
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Contains(p) => key.contains(p),
            Self::AllOf(ps) => ps.iter().all(|p| key.contains(p)),
            Self::Exact(p) => key == *p,
        }
    }
}

/// What to do with the value once a key matched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldRule {
    /// Matched on purpose and dropped.
    Ignore,
    Number(CanonicalField),
    /// Numeric when it parses, otherwise kept as trimmed text.
    NumberOrText(CanonicalField),
    Text(CanonicalField),
    /// `"low - high"`; each half parsed on its own.
    Range {
        low: CanonicalField,
        high: CanonicalField,
    },
    /// `"1.20 2.35%"`: first token absolute change, second token percent.
    ChangeWithPercent {
        change: CanonicalField,
        percent: CanonicalField,
    },
    /// Number in front of the first `%`, e.g. `"10% (2024)"`.
    PercentPrefix(CanonicalField),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchRule {
    pub key: KeyMatch,
    pub rule: FieldRule,
}

const fn rule(key: KeyMatch, rule: FieldRule) -> MatchRule {
    MatchRule { key, rule }
}

use CanonicalField as F;
use FieldRule as R;
use KeyMatch as K;

/// Match table for company quote pages (market information, basic
/// information and dividend tables). Order matters; see module docs.
pub const QUOTE_RULES: &[MatchRule] = &[
    rule(K::Contains("last trading price"), R::Number(F::LastTradedPrice)),
    rule(K::Contains("adjusted opening price"), R::Ignore),
    rule(K::Contains("opening price"), R::Number(F::Open)),
    rule(K::Contains("open price"), R::Number(F::Open)),
    rule(K::Contains("yesterdays closing price"), R::Number(F::YesterdayClose)),
    rule(K::Contains("adjusted closing price"), R::Ignore),
    rule(K::Contains("closing price"), R::Number(F::Close)),
    rule(K::Contains("days range"), R::Range { low: F::Low, high: F::High }),
    rule(K::Contains("day range"), R::Range { low: F::Low, high: F::High }),
    rule(K::Contains("52 week"), R::Range { low: F::Week52Low, high: F::Week52High }),
    rule(K::Contains("days volume"), R::Number(F::Volume)),
    rule(K::Contains("days trade"), R::Number(F::TradeCount)),
    rule(K::Contains("days value"), R::Number(F::TradedValue)),
    rule(K::Contains("market capitalization"), R::Number(F::MarketCap)),
    rule(K::Contains("market cap"), R::Number(F::MarketCap)),
    rule(K::Exact("change*"), R::ChangeWithPercent { change: F::Change, percent: F::PercentChange }),
    rule(K::Contains("sector"), R::Text(F::Sector)),
    rule(K::Contains("market category"), R::Text(F::Category)),
    rule(K::Contains("category"), R::Text(F::Category)),
    rule(K::Contains("face/par value"), R::NumberOrText(F::FaceValue)),
    rule(K::Contains("face value"), R::NumberOrText(F::FaceValue)),
    rule(K::Contains("market lot"), R::NumberOrText(F::MarketLot)),
    rule(K::Contains("authorized capital"), R::Number(F::AuthorizedCapital)),
    rule(K::Contains("paid-up capital"), R::Number(F::PaidUpCapital)),
    rule(K::Contains("paid up capital"), R::Number(F::PaidUpCapital)),
    rule(K::Contains("total number of securities"), R::Number(F::OutstandingShares)),
    rule(K::Contains("outstanding securities"), R::Number(F::OutstandingShares)),
    rule(K::Contains("listing year"), R::Number(F::ListingYear)),
    rule(K::AllOf(&["cash", "dividend"]), R::PercentPrefix(F::DividendYield)),
];

/// Rules applied to every table on a company page, wherever the label sits.
pub const HOLDING_RULES: &[MatchRule] = &[rule(K::Contains("share holding percentage"), R::Text(F::ShareHolding))];

/// What happened to one (key, value) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No rule matched the key.
    Unmatched,
    /// An exclusion rule matched.
    Excluded,
    /// The rule matched and this many values parsed.
    Parsed(usize),
    /// The rule matched but nothing parsed.
    Failed,
}

/// Lower-case, drop apostrophes, collapse whitespace.
pub fn canonical_key(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}' | '`'))
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// First rule in `rules` matching `key`.
pub fn match_key<'r>(key: &str, rules: &'r [MatchRule]) -> Option<&'r MatchRule> {
    let key = canonical_key(key);
    rules.iter().find(|r| r.key.matches(&key))
}

/// Tolerant numeric parse: strips thousands separators, currency and percent
/// symbols. `None` when what remains is not a finite number.
pub fn parse_number(text: &str) -> Option<f64> {
    let lowered = text.trim().to_lowercase();
    let stripped = ["à§³", "tk.", "tk", "bdt"]
        .iter()
        .fold(lowered, |acc, token| acc.replace(token, ""));
    let cleaned: String = stripped
        .chars()
        .filter(|c| !matches!(c, ',' | '%' | '$' | '\u{09F3}') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '-') {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Calendar date in any of the layouts exchange pages and archives use.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    const FORMATS: &[&str] = &["%Y-%m-%d", "%d-%m-%Y", "%d/%m/%Y", "%Y/%m/%d", "%b %d, %Y", "%d %b %Y"];
    let text = text.trim();
    // Timestamps such as "2025-04-15 00:00:00" keep only the date part.
    let head = text.split_whitespace().next().unwrap_or_default();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .or_else(|| NaiveDate::parse_from_str(head, "%Y-%m-%d").ok())
}

/// Split `"low - high"` and parse both halves independently.
pub fn parse_range(text: &str) -> (Option<f64>, Option<f64>) {
    let halves = match text.split_once(" - ") {
        Some(pair) => Some(pair),
        None => {
            let parts: Vec<&str> = text.split('-').collect();
            (parts.len() == 2).then(|| (parts[0], parts[1]))
        }
    };
    match halves {
        Some((low, high)) => (parse_number(low), parse_number(high)),
        None => (None, None),
    }
}

/// Normalize one pair into `record` using `rules`.
pub fn normalize_pair(key: &str, value: &str, rules: &[MatchRule], record: &mut MetricRecord) -> Outcome {
    let Some(matched) = match_key(key, rules) else {
        return Outcome::Unmatched;
    };
    let value = value.trim();
    let mut parsed = 0;
    let mut put = |field: CanonicalField, v: Option<FieldValue>| {
        if let Some(v) = v {
            record.insert_first(field, v);
            parsed += 1;
        }
    };

    match matched.rule {
        FieldRule::Ignore => return Outcome::Excluded,
        FieldRule::Number(field) => put(field, parse_number(value).map(FieldValue::Number)),
        FieldRule::NumberOrText(field) => {
            let v = parse_number(value)
                .map(FieldValue::Number)
                .or_else(|| (!value.is_empty()).then(|| FieldValue::Text(value.to_string())));
            put(field, v);
        }
        FieldRule::Text(field) => {
            put(field, (!value.is_empty()).then(|| FieldValue::Text(value.to_string())));
        }
        FieldRule::Range { low, high } => {
            let (lo, hi) = parse_range(value);
            put(low, lo.map(FieldValue::Number));
            put(high, hi.map(FieldValue::Number));
        }
        FieldRule::ChangeWithPercent { change, percent } => {
            let mut tokens = value.split_whitespace();
            put(change, tokens.next().and_then(parse_number).map(FieldValue::Number));
            put(percent, tokens.next().and_then(parse_number).map(FieldValue::Number));
        }
        FieldRule::PercentPrefix(field) => {
            let v = value
                .split_once('%')
                .and_then(|(head, _)| parse_number(head))
                .map(FieldValue::Number);
            put(field, v);
        }
    }

    if parsed == 0 {
        tracing::debug!(key, value, "field matched but did not parse");
        Outcome::Failed
    } else {
        Outcome::Parsed(parsed)
    }
}

/// Normalize key/value rows. Rows with four or more cells carry two pairs
/// (cells 0/1 and 2/3), rows with two or three carry one, shorter rows are skipped.
pub fn normalize_rows<'a, I>(rows: I, rules: &[MatchRule]) -> MetricRecord
where
    I: IntoIterator<Item = &'a RawRow>,
{
    let mut record = MetricRecord::new();
    for row in rows {
        match row.len() {
            0 | 1 => continue,
            2 | 3 => {
                normalize_pair(&row[0], &row[1], rules, &mut record);
            }
            _ => {
                normalize_pair(&row[0], &row[1], rules, &mut record);
                normalize_pair(&row[2], &row[3], rules, &mut record);
            }
        }
    }
    record
}
