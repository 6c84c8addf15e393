//! Forecast pipeline: load, scale, window, train, backfit, roll forward.
//!
//! [`Forecaster::forecast`] is the single failure boundary. Everything below
//! it returns [`ForecastError`]; the boundary logs the error with context and
//! converts it into [`ForecastOutcome::Unavailable`] with empty series.

use chrono::{Duration, NaiveDate};
use lilycast_core::cache::{Clock, SystemClock};
use lilycast_core::data::{ContentSource, DataError, MergeStats};
use lilycast_core::domain::Series;
use lilycast_core::ml::{
    build_windows, roll_forward, ForecastModel, ForecastPoint, MinMaxScaler, ModelConfig, ModelError, Trend,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::config::{ForecastConfig, LilycastConfig};
use crate::data_loader::{load_series, LoadOptions, LoadedSeries, SourceReport};

/// Errors that end a forecast call.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("insufficient data: {rows} rows, at least {required} required")]
    InsufficientData { rows: usize, required: usize },

    #[error("model error: {0}")]
    Model(#[from] ModelError),

    #[error("forecast worker panicked")]
    WorkerPanicked,

    #[error("forecast timed out after {secs}s")]
    TimedOut { secs: u64 },

    #[error("no source produced data: {0}")]
    Source(#[from] DataError),
}

/// A completed forecast.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub symbol: String,
    /// Every close in the trimmed series.
    pub actual: Vec<ForecastPoint>,
    /// The first `lookback` closes, then one backfit per later date, then
    /// `prediction_days` future points on consecutive calendar days.
    pub prediction: Vec<ForecastPoint>,
    pub trend: Trend,
    pub rows: usize,
    pub dataset_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_loss: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeStats>,
}

impl ForecastReport {
    /// Points past the last actual date.
    pub fn future(&self) -> &[ForecastPoint] {
        let last = self.actual.last().map(|p| p.date);
        let from = self
            .prediction
            .iter()
            .position(|p| Some(p.date) > last)
            .unwrap_or(self.prediction.len());
        &self.prediction[from..]
    }
}

/// What a forecast call hands back: a report, or an explicit refusal.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastOutcome {
    Ready(ForecastReport),
    Unavailable {
        symbol: String,
        reason: String,
        rows: usize,
        actual: Vec<ForecastPoint>,
        prediction: Vec<ForecastPoint>,
    },
}

impl ForecastOutcome {
    pub fn unavailable(symbol: impl Into<String>, reason: impl Into<String>, rows: usize) -> Self {
        Self::Unavailable {
            symbol: symbol.into(),
            reason: reason.into(),
            rows,
            actual: Vec::new(),
            prediction: Vec::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Self::Ready(report) => &report.symbol,
            Self::Unavailable { symbol, .. } => symbol,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    pub fn report(&self) -> Option<&ForecastReport> {
        match self {
            Self::Ready(report) => Some(report),
            Self::Unavailable { .. } => None,
        }
    }
}

/// Train and forecast on an already-merged series.
///
/// Refuses with [`ForecastError::InsufficientData`] below
/// `max(min_rows, lookback + 1)` rows.
pub fn forecast_series(
    symbol: &str,
    series: &Series,
    model_config: &ModelConfig,
    forecast_config: &ForecastConfig,
) -> Result<ForecastReport, ForecastError> {
    let lookback = model_config.lookback;
    let rows = series.len();
    let required = forecast_config.min_rows.max(lookback + 1);
    if rows < required {
        return Err(ForecastError::InsufficientData { rows, required });
    }

    let closes = series.closes();
    let dates = series.dates();
    let scaler = MinMaxScaler::fit(&closes)?;
    let scaled = scaler.transform_all(&closes);
    let windows = build_windows(&scaled, lookback)?;

    let mut model = ForecastModel::new(model_config.clone())?;
    let training = model.fit(&windows)?;
    let backfit = scaler.inverse_all(&model.backfit(&windows)?);
    let future = scaler.inverse_all(&roll_forward(&model, &scaled, forecast_config.prediction_days)?);

    let (Some(&last_close), Some(&last_date), Some(&first_future)) = (closes.last(), dates.last(), future.first())
    else {
        return Err(ModelError::InvalidConfig("prediction_days must be at least 1".into()).into());
    };
    if !future.iter().chain(&backfit).all(|v| v.is_finite()) {
        return Err(ModelError::NonFinite { stage: "inverse scaling" }.into());
    }

    let actual: Vec<ForecastPoint> = dates
        .iter()
        .zip(&closes)
        .map(|(&date, &value)| ForecastPoint {
            date,
            value,
            is_actual: true,
        })
        .collect();

    let mut prediction = Vec::with_capacity(rows + future.len());
    prediction.extend_from_slice(&actual[..lookback]);
    prediction.extend(dates[lookback..].iter().zip(&backfit).map(|(&date, &value)| ForecastPoint {
        date,
        value,
        is_actual: false,
    }));
    prediction.extend(future.iter().enumerate().map(|(i, &value)| ForecastPoint {
        date: last_date + Duration::days(i as i64 + 1),
        value,
        is_actual: false,
    }));

    let trend = Trend::classify(last_close, first_future);
    tracing::info!(
        symbol,
        rows,
        windows = windows.len(),
        final_loss = ?training.final_loss(),
        %trend,
        "forecast ready"
    );

    Ok(ForecastReport {
        symbol: symbol.to_string(),
        actual,
        prediction,
        trend,
        rows,
        dataset_hash: series.fingerprint(),
        final_loss: training.final_loss(),
        sources: Vec::new(),
        merge: None,
    })
}

/// Runs forecasts against one content source and configuration.
#[derive(Clone)]
pub struct Forecaster {
    source: Arc<dyn ContentSource>,
    config: LilycastConfig,
    clock: Arc<dyn Clock>,
}

impl Forecaster {
    pub fn new(source: Arc<dyn ContentSource>, config: LilycastConfig) -> Self {
        Self {
            source,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Clock deciding which as-of date is the current session.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &LilycastConfig {
        &self.config
    }

    /// Forecast `symbol` as of `as_of`. Never fails: any error becomes
    /// [`ForecastOutcome::Unavailable`].
    pub fn forecast(&self, symbol: &str, as_of: NaiveDate) -> ForecastOutcome {
        let symbol = symbol.trim().to_uppercase();
        let opts = LoadOptions::from_config(&self.config).with_session_date(self.clock.now().date_naive());
        let (rows, result) = match load_series(self.source.as_ref(), &symbol, as_of, &opts) {
            Ok(loaded) => (loaded.series.len(), self.forecast_loaded(loaded)),
            Err(e) => (0, Err(ForecastError::from(e))),
        };

        match result {
            Ok(report) => ForecastOutcome::Ready(report),
            Err(e) => {
                if matches!(e, ForecastError::InsufficientData { .. }) {
                    tracing::warn!(symbol = %symbol, rows, %as_of, error = %e, "prediction unavailable");
                } else {
                    tracing::error!(
                        symbol = %symbol,
                        rows,
                        %as_of,
                        source = self.source.name(),
                        error = ?e,
                        "prediction failed"
                    );
                }
                ForecastOutcome::unavailable(symbol, e.to_string(), rows)
            }
        }
    }

    fn forecast_loaded(&self, loaded: LoadedSeries) -> Result<ForecastReport, ForecastError> {
        let mut report = forecast_series(&loaded.symbol, &loaded.series, &self.config.model, &self.config.forecast)?;
        report.sources = loaded.sources;
        report.merge = Some(loaded.stats);
        Ok(report)
    }
}
