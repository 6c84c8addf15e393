//! Lilycast Core — table extraction, field normalization, series merging,
//! windowing, the recurrent forecast model and the result cache.
//!
//! This crate contains the acquisition-to-forecast pipeline pieces:
//! - Domain types (daily bars, partial bars, series, canonical metrics)
//! - Table extraction over fetched markup and tolerant field normalization
//! - Exchange page parsers, the archive CSV reader and the series merger
//! - Min-max scaling, sliding windows and a stacked LSTM with Adam
//! - A TTL result cache over in-memory or JSON-file stores
//!
//! Nothing here performs I/O except `data::http` and `cache::JsonFileStore`.

pub mod cache;
pub mod data;
pub mod domain;
pub mod ml;
