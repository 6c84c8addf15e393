//! Domain types for lilycast

pub mod bar;
pub mod metric;
pub mod series;

pub use bar::{DailyBar, PartialBar};
pub use metric::{CanonicalField, FieldValue, MetricRecord, MetricValue};
pub use series::Series;

/// Instrument trading code, upper-cased.
pub type Symbol = String;
