use futures::stream::{self, StreamExt};
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

use super::model::Feed;
use super::parser::{FeedParser, ParseError};

/// Errors that can occur while acquiring feed bytes.
///
/// These are produced by the HTTP collaborator only; the parser passes them
/// through untouched as [`ParseError::NetworkError`].
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Tuning for [`fetch_bytes`] and [`refresh_all`].
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_bytes: usize,
    pub max_retries: u32,
    /// First backoff delay; doubled on every further retry.
    pub retry_backoff: Duration,
    /// Maximum number of feeds fetched at once by [`refresh_all`].
    pub concurrency: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_bytes: 10 * 1024 * 1024,
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            concurrency: 10,
        }
    }
}

/// Outcome of refreshing one feed in [`refresh_all`].
#[derive(Debug)]
pub struct RefreshOutcome {
    pub source_url: String,
    /// Number of entries after the refresh, or the error that occurred.
    pub result: Result<usize, ParseError>,
}

/// Builds the HTTP client used for feed downloads.
///
/// Redirects are limited to three hops and loops are refused.
pub fn build_client(options: &FetchOptions) -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder()
        .redirect(redirect_policy())
        .pool_max_idle_per_host(4)
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(60))
        .timeout(options.timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= 3 {
            return attempt.error("Too many redirects (max 3)");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev.as_str() == url.as_str()) {
            return attempt.error("Redirect loop detected");
        }

        tracing::debug!(
            from = %attempt.previous().last().map(|u| u.as_str()).unwrap_or("initial"),
            to = %url,
            hop = attempt.previous().len() + 1,
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Downloads the document at `url`.
///
/// # Behavior
///
/// - Each request is bounded by `options.timeout`
/// - HTTP 429, 5xx, and truncated bodies are retried with exponential
///   backoff, up to `options.max_retries` times
/// - Other non-2xx statuses fail immediately
/// - Bodies larger than `options.max_bytes` are rejected
pub async fn fetch_bytes(
    client: &reqwest::Client,
    url: &str,
    options: &FetchOptions,
) -> Result<Vec<u8>, FetchError> {
    let mut retry_count = 0;

    loop {
        let response = tokio::time::timeout(options.timeout, client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();
        let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
        if retryable {
            if retry_count >= options.max_retries {
                return Err(if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    FetchError::RateLimited(options.max_retries)
                } else {
                    FetchError::HttpStatus(status.as_u16())
                });
            }

            let delay = backoff(options, retry_count);
            tracing::warn!(
                url = %url,
                status = %status,
                retry = retry_count,
                delay_ms = delay.as_millis() as u64,
                "Feed server unavailable, backing off"
            );
            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        match read_limited_bytes(response, options.max_bytes).await {
            Ok(bytes) => {
                tracing::debug!(url = %url, bytes = bytes.len(), "Fetched feed");
                return Ok(bytes);
            }
            Err(FetchError::IncompleteResponse { expected, received }) => {
                if retry_count >= options.max_retries {
                    return Err(FetchError::IncompleteResponse { expected, received });
                }

                let delay = backoff(options, retry_count);
                tracing::debug!(
                    url = %url,
                    expected = expected,
                    received = received,
                    attempt = retry_count + 1,
                    "Retrying incomplete download"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

fn backoff(options: &FetchOptions, retry_count: u32) -> Duration {
    options
        .retry_backoff
        .saturating_mul(2u32.saturating_pow(retry_count))
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

/// Fetches and parses the feed at `url`.
pub async fn load_feed(
    client: &reqwest::Client,
    parser: &FeedParser,
    url: &str,
    options: &FetchOptions,
) -> Result<Feed, ParseError> {
    let bytes = fetch_bytes(client, url, options).await?;
    parser.parse(url, &bytes)
}

/// Fetches `feed.source_url` and re-parses it into `feed` in place.
///
/// `is_favorite` and other caller-owned state survive; on any error the
/// feed is unchanged.
pub async fn refresh_feed(
    client: &reqwest::Client,
    parser: &FeedParser,
    feed: &mut Feed,
    options: &FetchOptions,
) -> Result<(), ParseError> {
    let bytes = fetch_bytes(client, &feed.source_url, options).await?;
    parser.parse_into(feed, &bytes)
}

/// Refreshes every feed in `feeds`.
///
/// Downloads run concurrently (at most `options.concurrency` at a time);
/// parsing then happens one feed at a time on the calling task. A failure
/// affects only its own feed. Outcomes are returned in input order.
pub async fn refresh_all(
    client: &reqwest::Client,
    parser: &FeedParser,
    feeds: &mut [Feed],
    options: &FetchOptions,
) -> Vec<RefreshOutcome> {
    if feeds.is_empty() {
        return Vec::new();
    }

    let urls: Vec<(usize, String)> = feeds
        .iter()
        .enumerate()
        .map(|(index, feed)| (index, feed.source_url.clone()))
        .collect();

    let mut downloads: Vec<(usize, Result<Vec<u8>, FetchError>)> = stream::iter(urls)
        .map(|(index, url)| async move { (index, fetch_bytes(client, &url, options).await) })
        .buffer_unordered(options.concurrency.max(1))
        .collect()
        .await;
    downloads.sort_by_key(|(index, _)| *index);

    let mut failed = 0;
    let outcomes: Vec<RefreshOutcome> = downloads
        .into_iter()
        .map(|(index, download)| {
            let feed = &mut feeds[index];
            let result = download
                .map_err(ParseError::from)
                .and_then(|bytes| parser.parse_into(feed, &bytes))
                .map(|()| feed.entries().len());
            if let Err(e) = &result {
                failed += 1;
                tracing::warn!(url = %feed.source_url, error = %e, "Feed refresh failed");
            }
            RefreshOutcome {
                source_url: feed.source_url.clone(),
                result,
            }
        })
        .collect();

    tracing::info!(total = outcomes.len(), failed = failed, "Refreshed feeds");
    outcomes
}
