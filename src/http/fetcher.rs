use anyhow::{Context, Result};
use bytes::Bytes;
use log::{debug, warn};
use reqwest::StatusCode;
use reqwest::header::{CONNECTION, HeaderMap, LOCATION};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;

use super::pool::{ConnectionPool, Origin};
use super::retry::{
    MAX_ATTEMPTS, MAX_REDIRECTS, RETRY_DELAY_MS, StatusAction, TransportFailure, classify_error,
    classify_status,
};
use crate::error::PkgError;

/// A fully read HTTP response.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects.
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body)
            .with_context(|| format!("Failed to parse JSON response from {}", self.url))
    }
}

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Attempts per request; a stale pooled connection does not count.
    pub max_attempts: usize,
    pub retry_delay: Duration,
    pub max_redirects: usize,
    /// Upper bound on concurrent requests in [`Fetcher::fetch_many`].
    pub max_concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
            max_redirects: MAX_REDIRECTS,
            max_concurrency: 10,
        }
    }
}

/// HTTP(S) GET client. Cheap to clone; clones share the connection pool.
#[derive(Clone, Default)]
pub struct Fetcher {
    pool: ConnectionPool,
    options: FetchOptions,
}

impl Fetcher {
    pub fn new(pool: ConnectionPool, options: FetchOptions) -> Self {
        Self { pool, options }
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn options(&self) -> &FetchOptions {
        &self.options
    }

    /// Fetches `url`, following redirects and retrying transient failures.
    ///
    /// Client errors (4xx) are returned as responses; callers decide what a
    /// 404 means.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, url: &str, timeout: Option<Duration>) -> Result<FetchResponse> {
        let mut current = Url::parse(url).with_context(|| format!("Invalid URL {:?}", url))?;
        let mut redirects = 0;

        loop {
            if !matches!(current.scheme(), "http" | "https") {
                return Err(PkgError::UnsupportedScheme(current.to_string()).into());
            }

            let response = self.fetch_once(&current, timeout).await?;

            if classify_status(response.status) == StatusAction::Redirect
                && let Some(location) = response.headers.get(LOCATION)
            {
                redirects += 1;
                if redirects > self.options.max_redirects {
                    return Err(PkgError::Network(format!(
                        "Too many redirects fetching {}",
                        url
                    ))
                    .into());
                }
                let location = location
                    .to_str()
                    .with_context(|| format!("Invalid redirect location from {}", current))?;
                let next = current
                    .join(location)
                    .with_context(|| format!("Invalid redirect location {:?}", location))?;
                debug!("Following redirect from {} to {}", current, next);
                current = next;
                continue;
            }

            return Ok(response);
        }
    }

    /// One request with its own retry budget.
    async fn fetch_once(&self, url: &Url, timeout: Option<Duration>) -> Result<FetchResponse> {
        let origin = Origin::from_url(url)?;
        let mut attempts = self.options.max_attempts.max(1);
        let mut reconnected = false;

        loop {
            let (client, reused) = self.pool.checkout(&origin)?;
            let mut request = client.get(url.clone());
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }

            debug!("GET {}...", url);
            let failure = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();
                    if wants_close(&headers) {
                        self.pool.evict(&origin);
                    }

                    if classify_status(status) == StatusAction::Retry {
                        format!("HTTP {}", status.as_u16())
                    } else {
                        match response.bytes().await {
                            Ok(body) => {
                                return Ok(FetchResponse {
                                    url: url.clone(),
                                    status,
                                    headers,
                                    body,
                                });
                            }
                            Err(e) => format!("failed to read body: {}", e),
                        }
                    }
                }
                Err(e) => match classify_error(&e, reused) {
                    TransportFailure::StaleConnection if !reconnected => {
                        debug!("Pooled connection to {} is stale, reconnecting", origin);
                        self.pool.evict(&origin);
                        reconnected = true;
                        continue;
                    }
                    _ => e.to_string(),
                },
            };

            attempts -= 1;
            if attempts == 0 {
                return Err(PkgError::Network(format!(
                    "Max retries exceeded for {}: {}",
                    url, failure
                ))
                .into());
            }
            warn!(
                "Fetching {} failed ({}), {} attempt(s) left",
                url, failure, attempts
            );
            tokio::time::sleep(self.options.retry_delay).await;
        }
    }

    /// Fetches every URL with bounded concurrency and calls `callback` once
    /// per URL as results arrive, with `None` for failures.
    ///
    /// Returns after every worker has finished.
    #[tracing::instrument(skip(self, urls, callback))]
    pub async fn fetch_many<F>(&self, urls: Vec<String>, mut callback: F, timeout: Option<Duration>)
    where
        F: FnMut(&str, Option<FetchResponse>),
    {
        if urls.is_empty() {
            return;
        }

        let workers = urls.len().min(self.options.max_concurrency.max(1));
        let queue = Arc::new(Mutex::new(urls.into_iter().collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let queue = queue.clone();
            let tx = tx.clone();
            let fetcher = self.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
                    let Some(url) = next else { break };

                    let result = match fetcher.fetch(&url, timeout).await {
                        Ok(response) => Some(response),
                        Err(e) => {
                            warn!("Failed to fetch {}: {:#}", url, e);
                            None
                        }
                    };
                    if tx.send((url, result)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        while let Some((url, result)) = rx.recv().await {
            callback(&url, result);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Fetch worker failed: {}", e);
            }
        }
    }
}

fn wants_close(headers: &HeaderMap) -> bool {
    headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("close"))
}
