//! Page fetching with exponential backoff retry logic.
//!
//! The extraction core only knows the [`Fetch`] contract: give it a URL, get
//! back a status and a body, or an error. Everything about politeness and
//! retrying lives here.
//!
//! # Architecture
//!
//! - [`Fetch`]: Core trait for fetching one URL
//! - [`HttpFetcher`]: `reqwest` client with fixed headers and a politeness delay
//! - [`RetryFetch`]: Decorator that adds retry logic to any `Fetch` implementation
//!
//! # Retry Strategy
//!
//! - Transport errors and configured statuses (5xx, 408, 429) are retried
//! - Exponential backoff starting at `base_delay`, capped at `max_delay`
//! - Random jitter (0-250ms) added to prevent thundering herd

use crate::config::FetchConfig;
use crate::error::FetchError;
use rand::{Rng, rng};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderValue};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

/// A fetched document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Final URL after redirects; relative links resolve against it.
    pub url: String,
    pub status: u16,
    pub body: String,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Trait for fetching one document.
///
/// Implementors may retry, throttle or cache; callers never retry on their own.
pub trait Fetch {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

impl<T: Fetch> Fetch for &T {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        (**self).fetch(url).await
    }
}

/// HTTP fetcher backed by a shared `reqwest::Client`.
pub struct HttpFetcher {
    client: reqwest::Client,
    download_delay: StdDuration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8"),
        );
        if let Ok(lang) = HeaderValue::from_str(&config.accept_language) {
            headers.insert(ACCEPT_LANGUAGE, lang);
        }

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(StdDuration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            download_delay: StdDuration::from_millis(config.download_delay_ms),
        })
    }
}

impl fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("download_delay", &self.download_delay)
            .finish()
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        if !self.download_delay.is_zero() {
            sleep(self.download_delay).await;
        }

        let target = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let t0 = Instant::now();
        let response = self
            .client
            .get(target)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = response.text().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        debug!(
            status,
            bytes = body.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched page"
        );
        Ok(FetchedPage {
            url: final_url,
            status,
            body,
        })
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetch`] implementation.
///
/// The delay between retries follows this formula:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..max_jitter)
/// ```
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
    max_jitter_ms: u64,
    retry_statuses: Vec<u16>,
}

impl<T> RetryFetch<T>
where
    T: Fetch,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: StdDuration::from_secs(30),
            max_jitter_ms: 250,
            retry_statuses: vec![500, 502, 503, 504, 408, 429],
        }
    }

    pub fn from_config(inner: T, config: &FetchConfig) -> Self {
        Self {
            max_delay: StdDuration::from_millis(config.max_delay_ms),
            retry_statuses: config.retry_statuses.clone(),
            ..Self::new(
                inner,
                config.max_retries,
                StdDuration::from_millis(config.base_delay_ms),
            )
        }
    }

    pub fn with_jitter(mut self, max_jitter_ms: u64) -> Self {
        self.max_jitter_ms = max_jitter_ms;
        self
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = if self.max_jitter_ms == 0 {
            0
        } else {
            rng().random_range(0..=self.max_jitter_ms)
        };
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> Fetch for RetryFetch<T>
where
    T: Fetch,
{
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let failure = match self.inner.fetch(url).await {
                Ok(page) if self.retry_statuses.contains(&page.status) => FetchError::Status {
                    url: url.to_string(),
                    status: page.status,
                },
                Ok(page) => return Ok(page),
                Err(e @ FetchError::Transport { .. }) | Err(e @ FetchError::Body { .. }) => e,
                Err(e) => return Err(e),
            };

            attempt += 1;
            let total_dt = total_t0.elapsed();
            if attempt > self.max_retries {
                error!(
                    attempt,
                    max = self.max_retries,
                    elapsed_ms_total = total_dt.as_millis() as u64,
                    error = %failure,
                    "fetch exhausted retries"
                );
                return Err(failure);
            }

            let delay = self.backoff(attempt);
            warn!(
                attempt,
                max = self.max_retries,
                elapsed_ms_total = total_dt.as_millis() as u64,
                ?delay,
                error = %failure,
                "fetch attempt failed; backing off"
            );
            sleep(delay).await;
        }
    }
}

/// Build the production fetcher: HTTP with retries.
pub fn build_fetcher(config: &FetchConfig) -> Result<RetryFetch<HttpFetcher>, reqwest::Error> {
    Ok(RetryFetch::from_config(HttpFetcher::new(config)?, config).with_jitter(config.max_jitter_ms))
}
