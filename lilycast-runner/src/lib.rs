//! Lilycast Runner — configuration, forecasting pipeline, worker thread and
//! cached market services.
//!
//! This crate builds on `lilycast-core` to provide:
//! - TOML configuration with defaults for every section
//! - Series loading across archive, scraped and live sources
//! - The forecast pipeline with a single failure boundary
//! - A worker thread with a deadline around each forecast
//! - Price board, index, company and history services behind result caches
//! - Cache directory status and clearing

pub mod cache;
pub mod config;
pub mod data_loader;
pub mod forecast;
pub mod market;
pub mod worker;

pub use cache::{CacheAdmin, EntryStatus};
pub use config::{ArchiveConfig, CacheConfig, ConfigError, ForecastConfig, LilycastConfig, SourceConfig};
pub use data_loader::{load_series, LoadOptions, LoadedSeries, SourceReport};
pub use forecast::{forecast_series, ForecastError, ForecastOutcome, ForecastReport, Forecaster};
pub use market::{details_key, CacheTtls, HistoryRange, MarketService, INDICES_KEY, PRICES_KEY};
pub use worker::{spawn_forecast, ForecastHandle};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn forecaster_is_send_sync() {
        assert_send::<Forecaster>();
        assert_sync::<Forecaster>();
    }

    #[test]
    fn market_service_is_send_sync() {
        assert_send::<MarketService>();
        assert_sync::<MarketService>();
    }

    #[test]
    fn outcomes_are_send() {
        assert_send::<ForecastOutcome>();
        assert_send::<ForecastError>();
        assert_send::<ForecastHandle>();
    }

    #[test]
    fn config_is_send_sync() {
        assert_send::<LilycastConfig>();
        assert_sync::<LilycastConfig>();
    }
}
