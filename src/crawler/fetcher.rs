//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the shared HTTP client with the configured user agent
//! - Bounding in-flight requests with a semaphore
//! - Pacing dispatches through one global rate gate
//! - Retrying transient failures before reporting a terminal failure

use crate::config::CrawlConfig;
use crate::url::CrawlScope;
use reqwest::header::{HeaderMap, HeaderName, CONTENT_LENGTH, CONTENT_TYPE, LAST_MODIFIED};
use reqwest::{redirect::Policy, Client};
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::Instant;
use url::Url;

/// Response headers carried into the page record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseMeta {
    /// `content-type` header value
    pub content_type: Option<String>,

    /// `last-modified` header value
    pub last_modified: Option<String>,

    /// `content-length` header value
    pub content_length: Option<u64>,
}

impl ResponseMeta {
    fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.trim().to_string())
        };

        Self {
            content_type: text(CONTENT_TYPE),
            last_modified: text(LAST_MODIFIED),
            content_length: text(CONTENT_LENGTH).and_then(|s| s.parse().ok()),
        }
    }
}

/// A document retrieved from the server
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Final URL after redirects
    pub final_url: Url,

    /// HTTP status code
    pub status: u16,

    /// Selected response headers
    pub meta: ResponseMeta,

    /// Decoded response body
    pub body: String,

    /// Attempts used, including the successful one
    pub attempts: u32,
}

/// Result of a fetch operation
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The server answered. Also used when every attempt returned a 5xx,
    /// in which case the last response is kept.
    Fetched(FetchedDocument),

    /// No response after every attempt (timeout, connect, TLS, DNS, body read)
    Failed {
        /// Description of the last failure
        error: String,
        /// Attempts used
        attempts: u32,
    },
}

impl FetchOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Fetched(doc) => doc.attempts,
            Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// Maximum redirect hops followed for one request
const MAX_REDIRECTS: usize = 10;

/// Builds an HTTP client with proper configuration
///
/// Redirects are followed only while every hop stays inside `scope`. At the
/// first hop leaving it the client stops and the 3xx response itself is
/// returned, so no page outside the scope is ever requested.
///
/// # Arguments
///
/// * `config` - The crawl configuration (user agent and request timeout)
/// * `scope` - The part of the site redirects may lead to
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    config: &CrawlConfig,
    scope: &CrawlScope,
) -> Result<Client, reqwest::Error> {
    let timeout = config.crawler.request_timeout();

    Client::builder()
        .user_agent(config.user_agent.value.clone())
        .timeout(timeout)
        .connect_timeout(timeout)
        .redirect(scoped_redirects(scope.clone()))
        .gzip(true)
        .brotli(true)
        .build()
}

fn scoped_redirects(scope: CrawlScope) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        match scope.check(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(violation) => {
                tracing::debug!(
                    "Not following redirect to {}: {:?}",
                    attempt.url(),
                    violation
                );
                attempt.stop()
            }
        }
    })
}

/// Global dispatch pacing
///
/// Consecutive dispatches are spaced at least `interval` apart across the
/// whole pool, not per worker.
#[derive(Debug)]
pub struct RateGate {
    interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_slot: Mutex::new(None),
        }
    }

    /// Waits for the next free dispatch slot and claims it
    ///
    /// The lock is held while sleeping so waiters are released one slot at a time.
    pub async fn wait(&self) {
        if self.interval.is_zero() {
            return;
        }

        let mut next_slot = self.next_slot.lock().await;
        if let Some(slot) = *next_slot {
            tokio::time::sleep_until(slot).await;
        }
        *next_slot = Some(Instant::now() + self.interval);
    }
}

/// Bounded-concurrency executor for page fetches
pub struct FetchPool {
    client: Client,
    permits: Semaphore,
    capacity: usize,
    gate: RateGate,
    retries: u32,
    retry_delay: Duration,
}

impl FetchPool {
    /// Creates a pool from the crawl configuration
    ///
    /// Redirects are confined to `scope`; see [`build_http_client`].
    pub fn new(config: &CrawlConfig, scope: &CrawlScope) -> Result<Self, reqwest::Error> {
        let client = build_http_client(config, scope)?;
        Ok(Self::with_client(client, config))
    }

    /// Creates a pool around an existing client
    pub fn with_client(client: Client, config: &CrawlConfig) -> Self {
        let capacity = config.crawler.max_connections.max(1);
        Self {
            client,
            permits: Semaphore::new(capacity),
            capacity,
            gate: RateGate::new(config.crawler.dispatch_delay()),
            retries: config.crawler.retries,
            retry_delay: config.crawler.retry_delay(),
        }
    }

    /// Maximum number of concurrent requests
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stops all further dispatch
    ///
    /// Requests already on the wire complete; any later attempt reports
    /// `Failed` without sending.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Fetches a URL, retrying transient failures
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 2xx/3xx/4xx | Return immediately |
    /// | HTTP 5xx | Retry; keep the last response if all attempts fail |
    /// | Timeout | Retry |
    /// | Connection / TLS / DNS error | Retry |
    /// | Body read error | Retry |
    ///
    /// At most `retries + 1` requests are sent for one call.
    pub async fn fetch(&self, url: &Url) -> FetchOutcome {
        let max_attempts = self.retries + 1;
        let mut last_error = String::new();
        let mut last_server_error: Option<FetchedDocument> = None;

        for attempt in 1..=max_attempts {
            if attempt > 1 && !self.retry_delay.is_zero() {
                tokio::time::sleep(self.retry_delay).await;
            }

            let _permit = match self.permits.acquire().await {
                Ok(permit) => permit,
                Err(_) => return Self::interrupted(attempt - 1, last_error, last_server_error),
            };
            self.gate.wait().await;
            if self.is_closed() {
                return Self::interrupted(attempt - 1, last_error, last_server_error);
            }

            tracing::debug!("GET {} (attempt {}/{})", url, attempt, max_attempts);

            match self.send(url).await {
                Ok(mut doc) if doc.status >= 500 => {
                    tracing::warn!(
                        "HTTP {} from {} (attempt {}/{})",
                        doc.status,
                        url,
                        attempt,
                        max_attempts
                    );
                    doc.attempts = attempt;
                    last_error = format!("HTTP {}", doc.status);
                    last_server_error = Some(doc);
                }
                Ok(mut doc) => {
                    doc.attempts = attempt;
                    return FetchOutcome::Fetched(doc);
                }
                Err(e) => {
                    last_error = describe_error(&e);
                    tracing::warn!(
                        "Request to {} failed (attempt {}/{}): {}",
                        url,
                        attempt,
                        max_attempts,
                        last_error
                    );
                    last_server_error = None;
                }
            }
        }

        match last_server_error {
            Some(doc) => FetchOutcome::Fetched(doc),
            None => FetchOutcome::Failed {
                error: last_error,
                attempts: max_attempts,
            },
        }
    }

    /// Outcome when the pool closes before attempt `sent + 1`
    ///
    /// The last real outcome is kept: a held 5xx response, else the last
    /// transport error. Only a fetch that never sent a request reports the
    /// closed pool.
    fn interrupted(
        sent: u32,
        last_error: String,
        last_server_error: Option<FetchedDocument>,
    ) -> FetchOutcome {
        match last_server_error {
            Some(doc) => FetchOutcome::Fetched(doc),
            None if sent > 0 => FetchOutcome::Failed {
                error: last_error,
                attempts: sent,
            },
            None => FetchOutcome::Failed {
                error: "Fetch pool closed".to_string(),
                attempts: 0,
            },
        }
    }

    async fn send(&self, url: &Url) -> Result<FetchedDocument, reqwest::Error> {
        let response = self.client.get(url.clone()).send().await?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let meta = ResponseMeta::from_headers(response.headers());
        let body = response.text().await?;

        Ok(FetchedDocument {
            final_url,
            status,
            meta,
            body,
            attempts: 0,
        })
    }
}

/// Classifies a transport error into a short description
fn describe_error(error: &reqwest::Error) -> String {
    if error.is_timeout() {
        "Request timeout".to_string()
    } else if error.is_connect() {
        format!("Connection failed: {}", root_cause(error))
    } else if error.is_body() || error.is_decode() {
        format!("Failed to read body: {}", root_cause(error))
    } else {
        error.to_string()
    }
}

fn root_cause(error: &(dyn std::error::Error + 'static)) -> String {
    let mut current = error;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}
