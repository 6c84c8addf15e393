//! Canonical metric names and the records normalized pages are folded into.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fixed set of metric names every source-specific label is mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    LastTradedPrice,
    Open,
    High,
    Low,
    Close,
    YesterdayClose,
    Volume,
    TradeCount,
    TradedValue,
    Change,
    PercentChange,
    MarketCap,
    Week52Low,
    Week52High,
    Sector,
    Category,
    FaceValue,
    MarketLot,
    DividendYield,
    AuthorizedCapital,
    PaidUpCapital,
    OutstandingShares,
    ListingYear,
    EpsBasic,
    Nav,
    PeBasic,
    ShareHolding,
}

impl CanonicalField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LastTradedPrice => "last_traded_price",
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::YesterdayClose => "yesterday_close",
            Self::Volume => "volume",
            Self::TradeCount => "trade_count",
            Self::TradedValue => "traded_value",
            Self::Change => "change",
            Self::PercentChange => "percent_change",
            Self::MarketCap => "market_cap",
            Self::Week52Low => "week52_low",
            Self::Week52High => "week52_high",
            Self::Sector => "sector",
            Self::Category => "category",
            Self::FaceValue => "face_value",
            Self::MarketLot => "market_lot",
            Self::DividendYield => "dividend_yield",
            Self::AuthorizedCapital => "authorized_capital",
            Self::PaidUpCapital => "paid_up_capital",
            Self::OutstandingShares => "outstanding_shares",
            Self::ListingYear => "listing_year",
            Self::EpsBasic => "eps_basic",
            Self::Nav => "nav",
            Self::PeBasic => "pe_basic",
            Self::ShareHolding => "share_holding",
        }
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed value of a normalized field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

/// One normalized metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    pub field: CanonicalField,
    pub value: FieldValue,
}

/// Fields that survived normalization for one page or row.
///
/// The first successfully parsed value for a field wins; later duplicates are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricRecord {
    values: BTreeMap<CanonicalField, FieldValue>,
}

impl MetricRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the field is already set. Returns whether the value was kept.
    pub fn insert_first(&mut self, field: CanonicalField, value: FieldValue) -> bool {
        if self.values.contains_key(&field) {
            return false;
        }
        self.values.insert(field, value);
        true
    }

    pub fn get(&self, field: CanonicalField) -> Option<&FieldValue> {
        self.values.get(&field)
    }

    pub fn number(&self, field: CanonicalField) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_number)
    }

    pub fn text(&self, field: CanonicalField) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn contains(&self, field: CanonicalField) -> bool {
        self.values.contains_key(&field)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Fold another record in; fields already present here are kept.
    pub fn absorb(&mut self, other: MetricRecord) {
        for (field, value) in other.values {
            self.insert_first(field, value);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = MetricValue> + '_ {
        self.values.iter().map(|(field, value)| MetricValue {
            field: *field,
            value: value.clone(),
        })
    }
}
