//! Chart page HTTP client
//!
//! Fetches the raw markup for one chart date from
//! `{base_url}/{YYYY-MM-DD}/`. Requests carry a User-Agent and a client-wide
//! timeout. Their start times can be spaced out to stay polite to the
//! upstream site; callers wait for that slot with [`ChartSource::ready`]
//! before the request timeout starts.

use async_trait::async_trait;
use chartkeep_common::time::DATE_FORMAT;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

pub const DEFAULT_BASE_URL: &str = "https://www.billboard.com/charts/hot-100";
const USER_AGENT: &str = concat!("chartkeep/", env!("CARGO_PKG_VERSION"));

/// Transport failures; all of them are retried on the next run
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
}

/// Source of raw chart markup, one page per chart date
#[async_trait]
pub trait ChartSource: Send + Sync {
    /// Wait until the source accepts another request
    ///
    /// Not covered by the request timeout.
    async fn ready(&self) {}

    async fn fetch(&self, date: NaiveDate) -> Result<String, TransportError>;
}

/// Enforces a minimum interval between request starts
pub(crate) struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
        }
    }

    /// Wait if necessary to comply with the interval
    pub(crate) async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;

        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        *last = Some(Instant::now());
    }
}

/// reqwest-backed [`ChartSource`]
pub struct HttpChartSource {
    http_client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    rate_limiter: Arc<RateLimiter>,
}

impl HttpChartSource {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        request_spacing: Duration,
    ) -> Result<Self, TransportError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            rate_limiter: Arc::new(RateLimiter::new(request_spacing)),
        })
    }

    /// Page URL for a chart date
    pub fn url_for(&self, date: NaiveDate) -> String {
        format!("{}/{}/", self.base_url, date.format(DATE_FORMAT))
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl ChartSource for HttpChartSource {
    async fn ready(&self) {
        self.rate_limiter.wait().await;
    }

    async fn fetch(&self, date: NaiveDate) -> Result<String, TransportError> {
        let url = self.url_for(date);
        tracing::debug!(%date, url = %url, "Fetching chart page");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                url,
            });
        }

        response.text().await.map_err(|e| self.classify(e))
    }
}
