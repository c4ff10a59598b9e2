//! Polite HTTP fetching for source adapters and the relational job store for RJA.

pub mod store;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info_span, Instrument};

pub use store::{
    CategoryCount, JobFilter, JobPage, JobStore, ReviewFlag, StoreError, StoreStats, StoreTx,
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};

pub const CRATE_NAME: &str = "rja-storage";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub global_concurrency: usize,
    pub per_source_concurrency: usize,
    /// Minimum spacing between two requests to the same host.
    pub request_delay: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
            global_concurrency: 16,
            per_source_concurrency: 2,
            request_delay: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug)]
pub struct SimpleTokenBucket {
    capacity: u32,
    refill_every: Duration,
    state: Mutex<TokenBucketState>,
}

#[derive(Debug, Clone, Copy)]
struct TokenBucketState {
    tokens: u32,
    last_refill: Instant,
}

impl SimpleTokenBucket {
    pub fn new(capacity: u32, refill_every: Duration) -> Self {
        Self {
            capacity,
            refill_every,
            state: Mutex::new(TokenBucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Returns immediately when `refill_every` is zero.
    pub async fn take(&self) {
        if self.refill_every.is_zero() {
            return;
        }
        loop {
            let mut state = self.state.lock().await;
            let elapsed = state.last_refill.elapsed();
            if elapsed >= self.refill_every && self.refill_every.as_millis() > 0 {
                let refills = (elapsed.as_millis() / self.refill_every.as_millis()) as u32;
                state.tokens = (state.tokens.saturating_add(refills)).min(self.capacity);
                state.last_refill = Instant::now();
            }

            if state.tokens > 0 {
                state.tokens -= 1;
                return;
            }

            let sleep_for = self.refill_every.saturating_sub(elapsed);
            drop(state);
            tokio::time::sleep(sleep_for).await;
        }
    }
}

/// Shared by every adapter in a run. Requests are never retried here: a failed
/// source contributes nothing and the next scheduled run is the retry.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    global_limit: Arc<Semaphore>,
    per_source_limit: usize,
    per_source: Mutex<HashMap<String, Arc<Semaphore>>>,
    request_delay: Duration,
    per_host: Mutex<HashMap<String, Arc<SimpleTokenBucket>>>,
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub body: Vec<u8>,
}

impl FetchedResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("invalid url {0:?}")]
    InvalidUrl(String),
    #[error("fetcher is shutting down")]
    Closed,
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;

        Ok(Self {
            client,
            global_limit: Arc::new(Semaphore::new(config.global_concurrency.max(1))),
            per_source_limit: config.per_source_concurrency.max(1),
            per_source: Mutex::new(HashMap::new()),
            request_delay: config.request_delay,
            per_host: Mutex::new(HashMap::new()),
        })
    }

    async fn per_source_semaphore(&self, source_id: &str) -> Arc<Semaphore> {
        let mut map = self.per_source.lock().await;
        map.entry(source_id.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_source_limit)))
            .clone()
    }

    async fn host_bucket(&self, host: &str) -> Arc<SimpleTokenBucket> {
        let mut map = self.per_host.lock().await;
        map.entry(host.to_string())
            .or_insert_with(|| Arc::new(SimpleTokenBucket::new(1, self.request_delay)))
            .clone()
    }

    /// Wait for the global, per-source and per-host limits, then send.
    async fn send(
        &self,
        source_id: &str,
        request: reqwest::RequestBuilder,
        url: &str,
    ) -> Result<reqwest::Response, FetchError> {
        let host = host_key(url)?;
        let _global = self
            .global_limit
            .acquire()
            .await
            .map_err(|_| FetchError::Closed)?;
        let per_source = self.per_source_semaphore(source_id).await;
        let _source = per_source.acquire().await.map_err(|_| FetchError::Closed)?;
        self.host_bucket(&host).await.take().await;

        let resp = request.send().await?;
        let status = resp.status();
        debug!(status = status.as_u16(), "response received");
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: resp.url().to_string(),
            });
        }
        Ok(resp)
    }

    pub async fn fetch_bytes(
        &self,
        source_id: &str,
        url: &str,
    ) -> Result<FetchedResponse, FetchError> {
        let span = info_span!("http_fetch", source_id, url);
        async {
            let resp = self.send(source_id, self.client.get(url), url).await?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            let body = resp.bytes().await?.to_vec();
            Ok::<_, FetchError>(FetchedResponse {
                status,
                final_url,
                body,
            })
        }
        .instrument(span)
        .await
    }

    pub async fn get_text(&self, source_id: &str, url: &str) -> Result<String, FetchError> {
        Ok(self.fetch_bytes(source_id, url).await?.text())
    }

    /// POST a JSON body and decode a JSON reply (ATS search endpoints).
    pub async fn post_json<B, R>(&self, source_id: &str, url: &str, body: &B) -> Result<R, FetchError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let span = info_span!("http_post_json", source_id, url);
        async {
            let request = self.client.post(url).json(body);
            let resp = self.send(source_id, request, url).await?;
            Ok::<R, FetchError>(resp.json::<R>().await?)
        }
        .instrument(span)
        .await
    }
}

/// Politeness is tracked per lower-cased host.
pub fn host_key(url: &str) -> Result<String, FetchError> {
    let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    parsed
        .host_str()
        .map(|h| h.to_ascii_lowercase())
        .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_key_is_case_insensitive() {
        assert_eq!(host_key("https://Jobs.Example.COM/a?b=1").unwrap(), "jobs.example.com");
        assert!(matches!(host_key("not a url"), Err(FetchError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn token_bucket_spaces_requests_once_drained() {
        let started = Instant::now();
        let bucket = SimpleTokenBucket::new(1, Duration::from_millis(40));
        bucket.take().await;
        assert!(started.elapsed() < Duration::from_millis(40));
        bucket.take().await;
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn zero_delay_bucket_never_blocks() {
        let bucket = SimpleTokenBucket::new(1, Duration::ZERO);
        for _ in 0..3 {
            bucket.take().await;
        }
    }

    #[tokio::test]
    async fn invalid_urls_fail_before_any_network_call() {
        let fetcher = HttpFetcher::new(HttpClientConfig::default()).unwrap();
        let err = fetcher.fetch_bytes("fixture", "::nope::").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl(_)));
    }
}
