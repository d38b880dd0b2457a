//! Schedule page retrieval.
#![allow(clippy::future_not_send)]

use std::path::PathBuf;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::instrument;
use url::Url;

use crate::error::FetchError;

/// Default per-attempt timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of retries after the first attempt.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Base delay between retries; attempt `n` waits `n` times this.
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Default User-Agent header.
pub const DEFAULT_USER_AGENT: &str = concat!("epgscrape/", env!("CARGO_PKG_VERSION"));

/// Source of schedule page HTML.
///
/// Uses `trait_variant::make` to generate a `Send`-bound async trait.
#[allow(clippy::module_name_repetitions)]
#[trait_variant::make(PageSource: Send)]
pub trait LocalPageSource {
    /// Retrieves the page body as text.
    ///
    /// # Errors
    ///
    /// Returns an error if the page cannot be retrieved.
    async fn fetch_page(&self) -> Result<String, FetchError>;

    /// Human-readable location of the page, for logs.
    fn describe(&self) -> String;
}

/// HTTP page fetcher with bounded retries.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    http_client: Client,
    url: Url,
    timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

/// Builder for [`HttpFetcher`].
#[derive(Debug)]
pub struct HttpFetcherBuilder {
    url: Url,
    user_agent: Option<String>,
    timeout: Option<Duration>,
    max_retries: Option<u32>,
    retry_delay: Option<Duration>,
}

impl HttpFetcherBuilder {
    const fn new(url: Url) -> Self {
        Self {
            url,
            user_agent: None,
            timeout: None,
            max_retries: None,
            retry_delay: None,
        }
    }

    /// Sets the User-Agent (default: `epgscrape/<version>`).
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the per-attempt timeout (default: 30s).
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the retry count after the first attempt (default: 3).
    #[must_use]
    pub const fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = Some(retries);
        self
    }

    /// Sets the base retry delay (default: 2s).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Builds the fetcher.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Client`] if the `reqwest::Client` build fails.
    pub fn build(self) -> Result<HttpFetcher, FetchError> {
        let timeout = self.timeout.unwrap_or(DEFAULT_TIMEOUT);
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| String::from(DEFAULT_USER_AGENT));

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(FetchError::Client)?;

        Ok(HttpFetcher {
            http_client,
            url: self.url,
            timeout,
            max_retries: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            retry_delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
        })
    }
}

/// What a failed attempt means for the retry loop.
enum Attempt {
    Retry { wait: Duration, error: FetchError },
    Fail(FetchError),
}

impl HttpFetcher {
    /// Creates a builder for `url`.
    #[must_use]
    pub const fn builder(url: Url) -> HttpFetcherBuilder {
        HttpFetcherBuilder::new(url)
    }

    /// Requested URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay.saturating_mul(attempt)
    }

    fn transport_error(&self, e: reqwest::Error, attempts: u32) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: self.url.to_string(),
                timeout_secs: self.timeout.as_secs(),
                attempts,
            }
        } else {
            FetchError::Transport {
                url: self.url.to_string(),
                attempts,
                source: e,
            }
        }
    }

    /// Performs one GET and classifies the outcome.
    async fn attempt(&self, attempt: u32) -> Result<String, Attempt> {
        let response = match self.http_client.get(self.url.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                return Err(Attempt::Retry {
                    wait: self.backoff(attempt),
                    error: self.transport_error(e, attempt),
                });
            }
        };

        let status = response.status();
        tracing::trace!(url = %self.url, %status, headers = ?response.headers(), "Response headers");

        if status == StatusCode::TOO_MANY_REQUESTS {
            let wait = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map_or_else(
                    || self.backoff(attempt),
                    |secs| self.retry_after(secs),
                );
            return Err(Attempt::Retry {
                wait,
                error: self.status_error(status, attempt),
            });
        }

        if status.is_server_error() {
            return Err(Attempt::Retry {
                wait: self.backoff(attempt),
                error: self.status_error(status, attempt),
            });
        }

        if !status.is_success() {
            return Err(Attempt::Fail(self.status_error(status, attempt)));
        }

        match response.text().await {
            Ok(body) => {
                tracing::info!(url = %self.url, code = status.as_u16(), body_len = body.len(), attempt, "Schedule page fetched");
                Ok(body)
            }
            Err(e) => Err(Attempt::Retry {
                    wait: self.backoff(attempt),
                error: self.transport_error(e, attempt),
            }),
        }
    }

    /// Wait requested by a `Retry-After` header, capped at the request timeout.
    fn retry_after(&self, secs: u64) -> Duration {
        let requested = Duration::from_secs(secs.saturating_add(1));
        if requested > self.timeout {
            tracing::debug!(
                url = %self.url,
                retry_after_secs = secs,
                capped_secs = self.timeout.as_secs(),
                "Retry-After exceeds request timeout, capping"
            );
        }
        requested.min(self.timeout)
    }

    fn status_error(&self, status: StatusCode, attempts: u32) -> FetchError {
        FetchError::Status {
            url: self.url.to_string(),
            status: status.as_u16(),
            attempts,
        }
    }
}

impl LocalPageSource for HttpFetcher {
    #[instrument(skip_all, fields(url = %self.url))]
    async fn fetch_page(&self) -> Result<String, FetchError> {
        let attempts = self.max_retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.attempt(attempt).await {
                Ok(body) => return Ok(body),
                Err(Attempt::Fail(error)) => return Err(error),
                Err(Attempt::Retry { error, .. }) if attempt >= attempts => return Err(error),
                Err(Attempt::Retry { wait, error }) => {
                    tracing::warn!(
                        url = %self.url,
                        attempt,
                        attempts,
                        wait_ms = u64::try_from(wait.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Fetch attempt failed, will retry"
                    );
                    tokio::time::sleep(wait).await;
                    attempt = attempt.saturating_add(1);
                }
            }
        }
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

/// Reads the page from a local file, for replaying saved pages.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Creates a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl LocalPageSource for FileSource {
    async fn fetch_page(&self) -> Result<String, FetchError> {
        let body = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| FetchError::File {
                path: self.path.clone(),
                source,
            })?;
        tracing::info!(path = %self.path.display(), body_len = body.len(), "Schedule page read from file");
        Ok(body)
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}
