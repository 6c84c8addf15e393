//! Series — one instrument's ordered, de-duplicated daily bars.

use super::bar::DailyBar;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Ordered sequence of [`DailyBar`] for one instrument.
///
/// Dates are strictly increasing. Built by the series merger and never
/// mutated afterwards; narrowing produces a new series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<DailyBar>", into = "Vec<DailyBar>")]
pub struct Series {
    bars: Vec<DailyBar>,
}

/// The bars handed to [`Series::new`] were not strictly increasing by date.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("series dates must be strictly increasing (violation at {date})")]
pub struct UnorderedSeries {
    pub date: NaiveDate,
}

impl Series {
    pub fn new(bars: Vec<DailyBar>) -> Result<Self, UnorderedSeries> {
        if let Some(pair) = bars.windows(2).find(|w| w[0].date >= w[1].date) {
            return Err(UnorderedSeries { date: pair[1].date });
        }
        Ok(Self { bars })
    }

    /// Build from a date-keyed map, which is ordered and unique by construction.
    pub(crate) fn from_keyed(bars: std::collections::BTreeMap<NaiveDate, DailyBar>) -> Self {
        Self {
            bars: bars.into_values().collect(),
        }
    }

    pub fn bars(&self) -> &[DailyBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first(&self) -> Option<&DailyBar> {
        self.bars.first()
    }

    pub fn last(&self) -> Option<&DailyBar> {
        self.bars.last()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&DailyBar> {
        self.bars
            .binary_search_by_key(&date, |b| b.date)
            .ok()
            .map(|i| &self.bars[i])
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    /// Bars dated on or after `start`.
    pub fn since(&self, start: NaiveDate) -> Series {
        let from = self.bars.partition_point(|b| b.date < start);
        Series {
            bars: self.bars[from..].to_vec(),
        }
    }

    /// Bars dated on or before `end`.
    pub fn until(&self, end: NaiveDate) -> Series {
        let to = self.bars.partition_point(|b| b.date <= end);
        Series {
            bars: self.bars[..to].to_vec(),
        }
    }

    /// Deterministic BLAKE3 digest over dates and OHLCV values.
    pub fn fingerprint(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for bar in &self.bars {
            hasher.update(bar.date.to_string().as_bytes());
            hasher.update(&bar.open.to_le_bytes());
            hasher.update(&bar.high.to_le_bytes());
            hasher.update(&bar.low.to_le_bytes());
            hasher.update(&bar.close.to_le_bytes());
            hasher.update(&bar.volume.to_le_bytes());
        }
        hasher.finalize().to_hex().to_string()
    }
}

impl TryFrom<Vec<DailyBar>> for Series {
    type Error = UnorderedSeries;

    fn try_from(bars: Vec<DailyBar>) -> Result<Self, Self::Error> {
        Series::new(bars)
    }
}

impl From<Series> for Vec<DailyBar> {
    fn from(series: Series) -> Self {
        series.bars
    }
}
