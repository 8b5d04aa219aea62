use governor::{
    Quota, RateLimiter, clock::DefaultClock, middleware::NoOpMiddleware, state::InMemoryState,
    state::NotKeyed,
};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;

use super::config::IngestConfig;
use super::error::{IngestError, Result};

const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

type Governor = RateLimiter<NotKeyed, InMemoryState, DefaultClock, NoOpMiddleware>;

#[derive(Debug, Clone)]
pub struct Registry {
    /// HTTP client for making requests
    pub(crate) client: reqwest::Client,

    /// Rate limiter enforcing the minimum spacing between requests
    pub(crate) rate_limiter: Arc<Governor>,

    /// Retry ceiling for transient failures
    pub(crate) max_retries: u32,

    /// Base URL for filing archives (raw documents, filing directories)
    pub(crate) archives_base_url: String,

    /// Base URL for the structured data API (submission histories)
    pub(crate) data_base_url: String,

    /// Base URL for supporting files (ticker tables)
    pub(crate) files_base_url: String,

    /// Lazily loaded ticker → CIK table, scoped to this client instance
    pub(crate) ticker_cache: Arc<RwLock<Option<HashMap<String, u64>>>>,
}

/// HTTP client for the filing registry with built-in rate limiting and retry logic.
///
/// The `Registry` client is the single gateway for all outbound traffic in the
/// pipeline: ticker resolution, submission histories, filing documents, and
/// filing metadata all go through it. It enforces the registry's fair access
/// rules and retries transient failures so that callers never have to.
///
/// # Rate Limiting
///
/// Every outbound request is separated from the previous one by at least the
/// configured minimum interval (default 500 ms), regardless of which task
/// issues it:
///
/// ```text
/// request        request        request
///    ●──────────────●──────────────●──────▶ time
///    |◀─ interval ─▶|◀─ interval ─▶|
/// ```
///
/// The limiter is shared by all clones of a client instance, so concurrent
/// workers collectively respect the spacing without coordinating themselves.
///
/// # Error Handling
///
/// Rate limit responses (HTTP 429), server errors (HTTP 5xx), and transport
/// failures are retried with exponential backoff and jitter up to the
/// configured retry ceiling. `Retry-After` headers are honored when present.
/// Client errors other than 429 are permanent and returned immediately; 404
/// maps to [`IngestError::NotFound`].
///
/// # Examples
///
/// Basic client initialization:
///
/// ```rust
/// # use filingest::Registry;
/// let registry = Registry::new("my_app/1.0 (my@email.com)")?;
/// # Ok::<(), filingest::IngestError>(())
/// ```
///
/// With custom configuration:
///
/// ```rust
/// # use filingest::{IngestConfig, Registry};
/// # use std::time::Duration;
/// let config = IngestConfig {
///     user_agent: "research_tool/1.0 (research@example.com)".to_string(),
///     min_request_interval: Duration::from_millis(750),
///     timeout: Duration::from_secs(60),
///     ..IngestConfig::default()
/// };
/// let registry = Registry::with_config(&config)?;
/// # Ok::<(), filingest::IngestError>(())
/// ```
impl Registry {
    /// Creates a new registry client with sensible defaults.
    ///
    /// This constructor uses the default minimum request interval of 500 ms,
    /// a 30-second timeout, five retries, and the standard SEC.gov base URLs.
    /// The user agent you provide is sent with every request to identify your
    /// application to the registry.
    ///
    /// # Arguments
    ///
    /// * `user_agent` - A descriptive identifier for your application, following
    ///   the format "AppName/Version (contact@email.com)". The SEC requires this
    ///   to contact you if your application causes issues.
    ///
    /// # Returns
    ///
    /// Returns a configured `Registry` client ready to make requests, or an
    /// error if the user agent string is invalid or the HTTP client cannot be
    /// constructed.
    pub fn new(user_agent: &str) -> Result<Self> {
        let config = IngestConfig {
            user_agent: user_agent.to_string(),
            ..IngestConfig::default()
        };
        Self::with_config(&config)
    }

    /// Creates a registry client from pipeline configuration.
    ///
    /// Only the network-facing parts of the configuration are consumed here:
    /// user agent, minimum request interval, timeout, retry ceiling, and base
    /// URLs. Overriding the base URLs is how integration tests point the
    /// client at a local mock server.
    ///
    /// # Errors
    ///
    /// Returns `IngestError::ConfigError` if the user agent is malformed, the
    /// minimum request interval is zero, or the HTTP client cannot be built
    /// with the provided configuration.
    pub fn with_config(config: &IngestConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| IngestError::ConfigError(format!("Invalid user agent: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| IngestError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let quota = Quota::with_period(config.min_request_interval).ok_or_else(|| {
            IngestError::ConfigError(
                "Minimum request interval must be greater than zero".to_string(),
            )
        })?;
        let rate_limiter = Arc::new(RateLimiter::direct(quota));

        Ok(Registry {
            client,
            rate_limiter,
            max_retries: config.max_retries,
            archives_base_url: config.base_urls.archives.clone(),
            data_base_url: config.base_urls.data.clone(),
            files_base_url: config.base_urls.files.clone(),
            ticker_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Calculates the wait duration for retry attempts using exponential backoff with jitter.
    ///
    /// Each retry waits longer than the previous attempt: 1s, 2s, 4s, 8s, 16s.
    /// Random jitter (±20%) is added to prevent the "thundering herd" problem
    /// where many clients retry simultaneously and overwhelm the server again.
    ///
    /// The formula is: `(2^retry × 1000ms) ± 20%`
    ///
    /// # Arguments
    ///
    /// * `retry` - The retry attempt number (0-indexed, so first retry is 0)
    fn calculate_backoff(retry: u32) -> Duration {
        let backoff_ms = INITIAL_BACKOFF_MS * (2_u64.pow(retry));
        // Add some jitter (±20% of the calculated backoff)
        let jitter = (backoff_ms as f64 * 0.2 * (fastrand::f64() - 0.5)) as i64;
        Duration::from_millis((backoff_ms as i64 + jitter) as u64)
    }

    /// Fetches binary data from a URL with automatic rate limiting and retry logic.
    ///
    /// This method is used for downloading filing documents and rendered
    /// derivatives whose bytes are persisted verbatim. Rate limit responses
    /// (429), server errors (5xx), and transport failures are retried with
    /// exponential backoff; other HTTP errors are returned immediately.
    ///
    /// # Arguments
    ///
    /// * `url` - The fully-qualified URL to fetch
    ///
    /// # Errors
    ///
    /// * `IngestError::NotFound` - The resource doesn't exist (HTTP 404)
    /// * `IngestError::RateLimitExceeded` - Rate limit responses persisted after max retries
    /// * `IngestError::RequestError` - Transport failure after max retries
    /// * `IngestError::InvalidResponse` - Unexpected HTTP status code
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let mut retries = 0;

        loop {
            self.rate_limiter.until_ready().await;

            let response_result = self.client.get(url).send().await;

            match response_result {
                Ok(response) => match response.status() {
                    reqwest::StatusCode::OK => {
                        return response
                            .bytes()
                            .await
                            .map(|b| b.to_vec())
                            .map_err(IngestError::RequestError);
                    }
                    reqwest::StatusCode::NOT_FOUND => {
                        return Err(IngestError::NotFound);
                    }
                    reqwest::StatusCode::TOO_MANY_REQUESTS => {
                        if retries >= self.max_retries {
                            return Err(IngestError::RateLimitExceeded);
                        }
                        let retry_after = Self::retry_after(response.headers(), retries);
                        sleep(retry_after).await;
                        retries += 1;
                        continue;
                    }
                    status if status.is_server_error() => {
                        if retries >= self.max_retries {
                            return Err(IngestError::InvalidResponse(format!(
                                "Server error {} for URL: {} after {} retries",
                                status, url, retries
                            )));
                        }
                        let backoff_duration = Self::calculate_backoff(retries);
                        tracing::warn!(
                            "Server error {} for {}. Attempt {}/{}. Retrying in {:?}.",
                            status,
                            url,
                            retries + 1,
                            self.max_retries + 1,
                            backoff_duration
                        );
                        sleep(backoff_duration).await;
                        retries += 1;
                        continue;
                    }
                    status => {
                        return Err(IngestError::InvalidResponse(format!(
                            "Unexpected status code: {}",
                            status
                        )));
                    }
                },
                Err(e) => {
                    if retries >= self.max_retries {
                        return Err(IngestError::RequestError(e));
                    }
                    let backoff_duration = Self::calculate_backoff(retries);
                    tracing::warn!(
                        "Request failed for {}: {:?}. Attempt {}/{}. Retrying in {:?}.",
                        url,
                        e,
                        retries + 1,
                        self.max_retries + 1,
                        backoff_duration
                    );
                    sleep(backoff_duration).await;
                    retries += 1;
                    continue;
                }
            }
        }
    }

    /// Fetches text content from a URL with rate limiting, retries, and content-type validation.
    ///
    /// This is the primary method for retrieving text-based resources from the
    /// registry, including JSON data and HTML filings. It enforces rate limits,
    /// retries failed requests with exponential backoff, and validates content
    /// types for JSON endpoints to catch server error pages early.
    ///
    /// # Content-Type Validation
    ///
    /// For URLs ending in `.json`, the method validates that the response isn't
    /// HTML (which typically indicates an error page). The SEC sometimes returns
    /// JSON with a `text/html` content-type header, so the method also checks if
    /// the body looks like JSON. If it's actually HTML, an `UnexpectedContentType`
    /// error is returned with a preview of the content for debugging.
    ///
    /// # Retry Behavior
    ///
    /// - **Rate limits (429)**: Retried up to the configured ceiling, respecting
    ///   `Retry-After` headers when present, otherwise using exponential backoff
    /// - **Server errors (5xx)**: Retried with exponential backoff
    /// - **Network errors**: Retried with exponential backoff
    /// - **Other HTTP errors**: No retry, returned immediately
    /// - **Content-type mismatches**: No retry, returned immediately
    ///
    /// # Arguments
    ///
    /// * `url` - The fully-qualified URL to fetch
    ///
    /// # Errors
    ///
    /// * `IngestError::UnexpectedContentType` - JSON URL returned HTML content
    /// * `IngestError::NotFound` - Resource doesn't exist (HTTP 404)
    /// * `IngestError::RateLimitExceeded` - Max retries exhausted for rate limits
    /// * `IngestError::RequestError` - Network or HTTP errors
    /// * `IngestError::InvalidResponse` - Unexpected status codes with content preview
    pub async fn get(&self, url: &str) -> Result<String> {
        let mut retries = 0;

        loop {
            // Wait for rate limiter
            self.rate_limiter.until_ready().await;

            let response_result = self.client.get(url).send().await;

            match response_result {
                Ok(response) => {
                    let status = response.status();
                    let headers = response.headers().clone();

                    // If JSON was expected but the server handed back an HTML
                    // page, surface that instead of a parse error downstream.
                    if url.ends_with(".json") && status.is_success() {
                        if let Some(ct) = headers
                            .get(reqwest::header::CONTENT_TYPE)
                            .and_then(|val| val.to_str().ok())
                        {
                            if ct.to_lowercase().contains("text/html") {
                                // The registry sometimes returns JSON with a text/html
                                // content-type. Check whether the body is actually JSON.
                                let body_text = response
                                    .text()
                                    .await
                                    .unwrap_or_else(|_| "Failed to read response body".to_string());

                                if body_text.trim_start().starts_with('{')
                                    || body_text.trim_start().starts_with('[')
                                {
                                    tracing::warn!(
                                        "Received text/html content-type for .json URL, but content appears to be JSON: {}",
                                        url
                                    );
                                    return Ok(body_text);
                                }

                                let body_preview = body_text.chars().take(200).collect::<String>();
                                return Err(IngestError::UnexpectedContentType {
                                    url: url.to_string(),
                                    expected_pattern: "application/json".to_string(),
                                    got_content_type: ct.to_string(),
                                    content_preview: body_preview,
                                });
                            }
                        }
                    }

                    match status {
                        reqwest::StatusCode::OK => {
                            return response.text().await.map_err(IngestError::RequestError);
                        }
                        reqwest::StatusCode::NOT_FOUND => {
                            return Err(IngestError::NotFound);
                        }
                        reqwest::StatusCode::TOO_MANY_REQUESTS => {
                            if retries >= self.max_retries {
                                return Err(IngestError::RateLimitExceeded);
                            }

                            let retry_after_duration = Self::retry_after(&headers, retries);
                            tracing::warn!(
                                "Rate limit hit (429) for {}. Attempt {}/{}. Waiting for {:?} before retry.",
                                url,
                                retries + 1,
                                self.max_retries + 1,
                                retry_after_duration
                            );
                            sleep(retry_after_duration).await;
                            retries += 1;
                            continue;
                        }
                        status if status.is_server_error() => {
                            if retries >= self.max_retries {
                                let error_body = response
                                    .text()
                                    .await
                                    .unwrap_or_else(|_| "Failed to read error body".to_string());
                                return Err(IngestError::InvalidResponse(format!(
                                    "Server error {} for URL: {} after {} retries. Response preview: {}",
                                    status,
                                    url,
                                    retries,
                                    error_body.chars().take(200).collect::<String>()
                                )));
                            }
                            let backoff_duration = Self::calculate_backoff(retries);
                            tracing::warn!(
                                "Server error {} for {}. Attempt {}/{}. Retrying in {:?}.",
                                status,
                                url,
                                retries + 1,
                                self.max_retries + 1,
                                backoff_duration
                            );
                            sleep(backoff_duration).await;
                            retries += 1;
                            continue;
                        }
                        other_status => {
                            // Remaining 4xx statuses are permanent for this URL.
                            let error_body = response
                                .text()
                                .await
                                .unwrap_or_else(|_| "Failed to read error body".to_string());

                            return Err(IngestError::InvalidResponse(format!(
                                "Unexpected status code: {} for URL: {}. Response preview: {}",
                                other_status,
                                url,
                                error_body.chars().take(200).collect::<String>()
                            )));
                        }
                    }
                }
                Err(e) => {
                    // Network or other transport error before a status was received
                    if retries >= self.max_retries {
                        return Err(IngestError::RequestError(e));
                    }
                    let backoff_duration = Self::calculate_backoff(retries);
                    tracing::warn!(
                        "Request failed for {}: {:?}. Attempt {}/{}. Retrying in {:?}.",
                        url,
                        e,
                        retries + 1,
                        self.max_retries + 1,
                        backoff_duration
                    );
                    sleep(backoff_duration).await;
                    retries += 1;
                    continue;
                }
            }
        }
    }

    /// Picks the wait before retrying a 429: the server's `Retry-After`
    /// header when present, otherwise exponential backoff.
    fn retry_after(headers: &HeaderMap, retries: u32) -> Duration {
        headers
            .get("retry-after")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Self::calculate_backoff(retries))
    }

    /// Returns the base URL for filing archives.
    pub fn archives_url(&self) -> &str {
        &self.archives_base_url
    }

    /// Returns the base URL for the structured data API.
    pub fn data_url(&self) -> &str {
        &self.data_base_url
    }

    /// Returns the base URL for supporting files.
    pub fn files_url(&self) -> &str {
        &self.files_base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_backoff() {
        let backoff0 = Registry::calculate_backoff(0);
        let backoff1 = Registry::calculate_backoff(1);
        let backoff2 = Registry::calculate_backoff(2);

        // Check that backoff increases exponentially
        assert!(backoff0 < backoff1);
        assert!(backoff1 < backoff2);

        // Check that backoff is roughly within expected range
        assert!(backoff0.as_millis() >= 800 && backoff0.as_millis() <= 1200); // ±20% of 1000ms
        assert!(backoff1.as_millis() >= 1600 && backoff1.as_millis() <= 2400); // ±20% of 2000ms
        assert!(backoff2.as_millis() >= 3200 && backoff2.as_millis() <= 4800); // ±20% of 4000ms
    }

    #[test]
    fn test_retry_after_header_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("7"));
        assert_eq!(Registry::retry_after(&headers, 0), Duration::from_secs(7));

        // Absent or malformed header falls back to backoff
        let empty = HeaderMap::new();
        let fallback = Registry::retry_after(&empty, 0);
        assert!(fallback.as_millis() >= 800 && fallback.as_millis() <= 1200);
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_requests() {
        let config = IngestConfig {
            min_request_interval: Duration::from_millis(50),
            ..IngestConfig::default()
        };
        let registry = Registry::with_config(&config).unwrap();

        let start = std::time::Instant::now();
        for _ in 0..5 {
            registry.rate_limiter.until_ready().await;
        }
        // Five acquisitions need at least four full intervals between them.
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
