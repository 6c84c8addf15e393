//! Blocking HTTP content source for the exchange website.
//!
//! Retries transient failures with exponential backoff. Parsing happens
//! elsewhere; this only turns a [`Page`] into markup.

use super::source::{ContentSource, DataError, Page, DEFAULT_BASE_URL};
use std::time::Duration;

pub struct HttpContentSource {
    client: reqwest::blocking::Client,
    base_url: String,
    max_retries: u32,
    base_delay: Duration,
}

impl HttpContentSource {
    pub fn new() -> Result<Self, DataError> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(|e| DataError::SourceUnavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            max_retries: 3,
            base_delay: Duration::from_millis(500),
        })
    }

    pub fn with_retries(mut self, max_retries: u32, base_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.base_delay = base_delay;
        self
    }

    fn fetch_with_retry(&self, url: &str) -> Result<String, DataError> {
        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.base_delay * 2u32.pow(attempt - 1);
                tracing::debug!(url, attempt, ?delay, "retrying fetch");
                std::thread::sleep(delay);
            }

            match self.client.get(url).send() {
                Ok(resp) => {
                    let status = resp.status();

                    if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        last_error = Some(DataError::Http {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                        continue;
                    }

                    if !status.is_success() {
                        return Err(DataError::Http {
                            status: status.as_u16(),
                            url: url.to_string(),
                        });
                    }

                    return resp
                        .text()
                        .map_err(|e| DataError::SourceUnavailable(format!("unreadable body from {url}: {e}")));
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(DataError::NetworkUnreachable(e.to_string()));
                        continue;
                    }
                    return Err(DataError::NetworkUnreachable(e.to_string()));
                }
            }
        }

        Err(last_error.unwrap_or_else(|| DataError::SourceUnavailable("max retries exceeded".into())))
    }
}

impl ContentSource for HttpContentSource {
    fn name(&self) -> &str {
        "dse_http"
    }

    fn fetch(&self, page: &Page) -> Result<String, DataError> {
        let url = page.url(&self.base_url);
        let markup = self.fetch_with_retry(&url)?;
        tracing::debug!(url, bytes = markup.len(), "fetched page");
        Ok(markup)
    }
}
