//! TOML configuration for forecasting, caching and content fetching.
//!
//! Every section is `#[serde(default)]`, so an empty or partial file yields
//! the defaults for whatever it leaves out.

use chrono::{Duration, NaiveDate};
use lilycast_core::data::archive::default_cutoff;
use lilycast_core::data::source::DEFAULT_BASE_URL;
use lilycast_core::ml::ModelConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Full workspace configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LilycastConfig {
    pub model: ModelConfig,
    pub forecast: ForecastConfig,
    pub cache: CacheConfig,
    pub archive: ArchiveConfig,
    pub source: SourceConfig,
}

/// Data-sufficiency floor, horizon and history span for one forecast call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Minimum merged rows before a model is trained.
    pub min_rows: usize,
    pub prediction_days: usize,
    /// Trailing years of history kept, relative to the as-of date.
    pub history_years: u32,
    /// Last date served by the archive; later dates come from scraping.
    pub archive_cutoff: NaiveDate,
    /// Calendar days of day-end archive requested per scrape.
    pub scrape_window_days: i64,
    /// Include the live company quote as the as-of day's bar.
    pub include_live_quote: bool,
    /// Worker deadline.
    pub timeout_secs: u64,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_rows: 100,
            prediction_days: 7,
            history_years: 2,
            archive_cutoff: default_cutoff(),
            scrape_window_days: 730,
            include_live_quote: true,
            timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub dir: PathBuf,
    pub indices_ttl_secs: i64,
    pub prices_ttl_secs: i64,
    pub details_ttl_secs: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".lilycast-cache"),
            indices_ttl_secs: 120,
            prices_ttl_secs: 300,
            details_ttl_secs: 86_400,
        }
    }
}

impl CacheConfig {
    pub fn indices_ttl(&self) -> Duration {
        Duration::seconds(self.indices_ttl_secs)
    }

    pub fn prices_ttl(&self) -> Duration {
        Duration::seconds(self.prices_ttl_secs)
    }

    pub fn details_ttl(&self) -> Duration {
        Duration::seconds(self.details_ttl_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Bulk archive CSV; forecasting runs on scraped data alone without it.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 3,
            retry_delay_ms: 500,
        }
    }
}

impl LilycastConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Like [`load`](Self::load), but a missing file means defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            Some(path) => {
                tracing::debug!(path = %path.display(), "config file not found, using defaults");
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let f = &self.forecast;
        if f.min_rows <= self.model.lookback {
            return Err(ConfigError::Invalid(format!(
                "forecast.min_rows ({}) must exceed model.lookback ({})",
                f.min_rows, self.model.lookback
            )));
        }
        if f.prediction_days == 0 {
            return Err(ConfigError::Invalid("forecast.prediction_days must be at least 1".into()));
        }
        if f.history_years == 0 {
            return Err(ConfigError::Invalid("forecast.history_years must be at least 1".into()));
        }
        if f.scrape_window_days <= 0 {
            return Err(ConfigError::Invalid("forecast.scrape_window_days must be positive".into()));
        }
        if f.timeout_secs == 0 {
            return Err(ConfigError::Invalid("forecast.timeout_secs must be positive".into()));
        }

        let c = &self.cache;
        for (name, secs) in [
            ("indices_ttl_secs", c.indices_ttl_secs),
            ("prices_ttl_secs", c.prices_ttl_secs),
            ("details_ttl_secs", c.details_ttl_secs),
        ] {
            if secs < 0 {
                return Err(ConfigError::Invalid(format!("cache.{name} must not be negative")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LilycastConfig::default();
        config.validate().unwrap();
        assert_eq!(config.model.lookback, 60);
        assert_eq!(config.forecast.min_rows, 100);
        assert_eq!(config.forecast.prediction_days, 7);
        assert_eq!(config.cache.indices_ttl(), Duration::seconds(120));
        assert_eq!(config.cache.prices_ttl(), Duration::seconds(300));
        assert_eq!(config.cache.details_ttl(), Duration::hours(24));
        assert_eq!(config.forecast.archive_cutoff, NaiveDate::from_ymd_opt(2025, 4, 15).unwrap());
    }

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(LilycastConfig::from_toml_str("").unwrap(), LilycastConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = LilycastConfig::from_toml_str(
            r#"
            [model]
            epochs = 3

            [forecast]
            prediction_days = 14
            archive_cutoff = "2025-01-31"

            [cache]
            dir = "/tmp/lilycast"

            [archive]
            path = "data/DSE_Data.csv"
            "#,
        )
        .unwrap();
        assert_eq!(config.model.epochs, 3);
        assert_eq!(config.model.hidden_units, 50);
        assert_eq!(config.forecast.prediction_days, 14);
        assert_eq!(config.forecast.min_rows, 100);
        assert_eq!(config.forecast.archive_cutoff, NaiveDate::from_ymd_opt(2025, 1, 31).unwrap());
        assert_eq!(config.cache.dir, PathBuf::from("/tmp/lilycast"));
        assert_eq!(config.cache.prices_ttl_secs, 300);
        assert_eq!(config.archive.path, Some(PathBuf::from("data/DSE_Data.csv")));
    }

    #[test]
    fn min_rows_must_exceed_lookback() {
        let err = LilycastConfig::from_toml_str("[forecast]\nmin_rows = 60\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(msg) if msg.contains("min_rows")));
    }

    #[test]
    fn bad_model_section_is_invalid() {
        let err = LilycastConfig::from_toml_str("[model]\ndropout = 1.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = LilycastConfig::from_toml_str("[forecast\nmin_rows = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("lilycast.toml");
        assert_eq!(
            LilycastConfig::load_or_default(Some(&missing)).unwrap(),
            LilycastConfig::default()
        );
        assert!(matches!(LilycastConfig::load(&missing), Err(ConfigError::Io { .. })));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lilycast.toml");
        std::fs::write(&path, "[cache]\nindices_ttl_secs = 60\n").unwrap();
        let config = LilycastConfig::load(&path).unwrap();
        assert_eq!(config.cache.indices_ttl(), Duration::seconds(60));
    }
}
