//! Async HTTP client with configurable politeness (minimum delay between requests).

use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::header::HeaderMap;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::scraper::{ByteStream, Fetcher, ScraperError};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DELAY_MS: u64 = 250;
const MAX_REDIRECTS: usize = 10;

/// HTTP client that enforces a delay between the start of consecutive requests.
#[derive(Debug)]
pub struct PoliteClient {
    inner: reqwest::Client,
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl PoliteClient {
    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    async fn wait_delay(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl Fetcher for PoliteClient {
    async fn get(&self, url: &str, headers: &HeaderMap) -> Result<ByteStream, ScraperError> {
        self.wait_delay().await;
        tracing::debug!("GET {}", url);
        let response = self
            .inner
            .get(url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| ScraperError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(ScraperError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let url = url.to_string();
        let stream = response
            .bytes_stream()
            .map_err(move |e| ScraperError::BodyRead {
                url: url.clone(),
                reason: e.to_string(),
            });
        Ok(Box::pin(stream))
    }
}

/// Builder for PoliteClient with optional User-Agent, delay, and timeout.
#[derive(Debug)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    delay_ms: u64,
    timeout_secs: u64,
}

impl Default for PoliteClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_ms: DEFAULT_DELAY_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl PoliteClientBuilder {
    /// Set a custom User-Agent. Per-request headers (e.g. Manganato's) still override it.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Minimum delay between requests in milliseconds. Default 250.
    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Per-request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<PoliteClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(PoliteClient {
            inner,
            delay: Duration::from_millis(self.delay_ms),
            last_request: Mutex::new(None),
        })
    }
}
