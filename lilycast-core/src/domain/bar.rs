//! DailyBar — the fundamental market data unit.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single instrument on a single session date.
///
/// Produced by completing a [`PartialBar`]; a bar that exists always has all
/// four prices and a non-negative volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl DailyBar {
    /// Basic OHLC sanity check: high >= low, open/close inside the range, positive prices.
    pub fn is_sane(&self) -> bool {
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
            && self.open > 0.0
            && self.close > 0.0
    }
}

/// A date-keyed bar as delivered by one source, before the merger decides
/// whether it is usable. Any price may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialBar {
    pub date: Option<NaiveDate>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

impl PartialBar {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Self::default()
        }
    }

    /// Promote to a [`DailyBar`] when the date and all four prices are present
    /// and finite. A missing volume counts as zero; a negative one rejects the bar.
    pub fn complete(&self) -> Option<DailyBar> {
        let finite = |v: Option<f64>| v.filter(|x| x.is_finite());
        let volume = match self.volume {
            None => 0.0,
            Some(v) if v.is_finite() && v >= 0.0 => v,
            Some(_) => return None,
        };
        Some(DailyBar {
            date: self.date?,
            open: finite(self.open)?,
            high: finite(self.high)?,
            low: finite(self.low)?,
            close: finite(self.close)?,
            volume,
        })
    }
}

impl From<DailyBar> for PartialBar {
    fn from(bar: DailyBar) -> Self {
        Self {
            date: Some(bar.date),
            open: Some(bar.open),
            high: Some(bar.high),
            low: Some(bar.low),
            close: Some(bar.close),
            volume: Some(bar.volume),
        }
    }
}
