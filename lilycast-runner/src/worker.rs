//! Background forecast thread.
//!
//! Training is CPU-bound, so each forecast runs on its own named thread and
//! reports back over an `mpsc` channel. The caller waits with a deadline; a
//! panic or a missed deadline becomes an unavailable outcome and the thread
//! is left to finish on its own.

use chrono::NaiveDate;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::forecast::{ForecastError, ForecastOutcome, Forecaster};

/// A forecast running on a worker thread.
pub struct ForecastHandle {
    symbol: String,
    rx: Receiver<ForecastOutcome>,
    thread: Option<JoinHandle<()>>,
}

/// Spawn a forecast for `symbol` on a dedicated thread.
pub fn spawn_forecast(forecaster: Arc<Forecaster>, symbol: &str, as_of: NaiveDate) -> ForecastHandle {
    let symbol = symbol.trim().to_uppercase();
    let (tx, rx) = mpsc::channel();
    let thread_symbol = symbol.clone();
    let spawned = thread::Builder::new()
        .name(format!("lilycast-forecast-{symbol}"))
        .spawn(move || {
            let outcome = forecaster.forecast(&thread_symbol, as_of);
            // receiver gone means the caller stopped waiting
            let _ = tx.send(outcome);
        });

    let thread = match spawned {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::error!(symbol = %symbol, error = %e, "failed to spawn forecast thread");
            None
        }
    };
    ForecastHandle { symbol, rx, thread }
}

impl ForecastHandle {
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Block until the forecast finishes or `timeout` elapses.
    pub fn wait(mut self, timeout: Duration) -> ForecastOutcome {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => {
                if let Some(thread) = self.thread.take() {
                    let _ = thread.join();
                }
                outcome
            }
            Err(RecvTimeoutError::Timeout) => {
                let e = ForecastError::TimedOut { secs: timeout.as_secs() };
                tracing::error!(symbol = %self.symbol, error = %e, "abandoning forecast");
                ForecastOutcome::unavailable(self.symbol, e.to_string(), 0)
            }
            Err(RecvTimeoutError::Disconnected) => {
                // the sender dropped without sending: the thread panicked or never ran
                if let Some(thread) = self.thread.take() {
                    let _ = thread.join();
                }
                let e = ForecastError::WorkerPanicked;
                tracing::error!(symbol = %self.symbol, error = %e, "forecast worker died");
                ForecastOutcome::unavailable(self.symbol, e.to_string(), 0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LilycastConfig;
    use lilycast_core::data::{ContentSource, DataError, Page, StaticSource};

    struct Panicking;

    impl ContentSource for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn fetch(&self, _page: &Page) -> Result<String, DataError> {
            panic!("source exploded");
        }
    }

    struct Slow;

    impl ContentSource for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        fn fetch(&self, _page: &Page) -> Result<String, DataError> {
            thread::sleep(Duration::from_millis(500));
            Err(DataError::SourceUnavailable("slow".into()))
        }
    }

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn forecaster(source: impl ContentSource + 'static) -> Arc<Forecaster> {
        Arc::new(Forecaster::new(Arc::new(source), LilycastConfig::default()))
    }

    #[test]
    fn finished_forecast_is_returned() {
        let handle = spawn_forecast(forecaster(StaticSource::new()), "gp", as_of());
        assert_eq!(handle.symbol(), "GP");
        let outcome = handle.wait(Duration::from_secs(30));
        assert_eq!(outcome.symbol(), "GP");
        assert!(!outcome.is_ready());
    }

    #[test]
    fn panic_becomes_unavailable() {
        let outcome = spawn_forecast(forecaster(Panicking), "GP", as_of()).wait(Duration::from_secs(30));
        match outcome {
            ForecastOutcome::Unavailable { reason, actual, .. } => {
                assert!(reason.contains("panicked"));
                assert!(actual.is_empty());
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
    }

    #[test]
    fn timeout_becomes_unavailable() {
        let outcome = spawn_forecast(forecaster(Slow), "GP", as_of()).wait(Duration::from_millis(10));
        match outcome {
            ForecastOutcome::Unavailable { reason, .. } => assert!(reason.contains("timed out")),
            other => panic!("expected unavailable, got {other:?}"),
        }
    }
}
