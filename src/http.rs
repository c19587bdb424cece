//! Retrying HTTP caller
//!
//! All reads and writes of file bytes, and every storage API call, go
//! through [`RetryingClient::invoke`]. A single failure model covers both
//! transport errors and non-2xx statuses; failed attempts back off
//! exponentially until the policy's attempt cap, then surface an
//! unrecoverable error carrying the method, URL, header snapshot, attempt
//! count, and last failure.

use crate::error::{FileError, Result};
use crate::metrics::TransferMetrics;
use bytes::Bytes;
use http::{HeaderMap, Method};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Retry policy for failed requests
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per request, first try included
    pub max_attempts: usize,
    /// Backoff unit; the sleep before retry `n` is `base_delay << n`
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with the default backoff unit of one second,
    /// giving sleeps of 2 s, 4 s, 8 s, 16 s between five attempts
    pub fn new(max_attempts: usize) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(1),
        }
    }

    /// Create a policy with a custom backoff unit
    pub fn with_base_delay(max_attempts: usize, base_delay: Duration) -> Self {
        RetryPolicy {
            max_attempts,
            base_delay,
        }
    }

    /// Get the backoff duration before retry `attempt` (counted from 1)
    pub fn backoff_duration(&self, attempt: usize) -> Duration {
        let factor = 1u32 << attempt.min(16) as u32;
        self.base_delay * factor
    }
}

/// A successful HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code, guaranteed to be in 200-299
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body bytes
    pub body: Bytes,
}

/// HTTP client with uniform retry handling
#[derive(Clone)]
pub struct RetryingClient {
    client: reqwest::Client,
    policy: RetryPolicy,
    metrics: Arc<TransferMetrics>,
}

impl RetryingClient {
    /// Create a new RetryingClient
    ///
    /// # Arguments
    /// * `policy` - Retry policy applied to every request
    /// * `timeout` - Per-request timeout of the underlying client
    /// * `metrics` - Shared counters updated with attempts and retries
    pub fn new(
        policy: RetryPolicy,
        timeout: Duration,
        metrics: Arc<TransferMetrics>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| FileError::Transport(format!("failed to create HTTP client: {}", e)))?;

        Ok(RetryingClient {
            client,
            policy,
            metrics,
        })
    }

    /// Perform one logical HTTP request with retries.
    ///
    /// An attempt fails if the transport errors out or the response status
    /// is outside 200-299; both cases are retried after an exponential
    /// backoff. A failure the classifier deems permanent propagates
    /// immediately instead. The body is resent verbatim on every attempt,
    /// so callers must only pass bodies that are safe to replay (whole
    /// parts POSTed to unique pre-signed URLs are).
    ///
    /// # Returns
    /// * `Ok(HttpResponse)` on the first successful attempt
    /// * `Err(FileError::RetriesExhausted)` after the attempt cap
    pub async fn invoke(
        &self,
        method: Method,
        url: &str,
        headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<HttpResponse> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.metrics.record_http_attempt();

            let failure = match self.try_invoke(&method, url, &headers, body.clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if !failure.should_retry() {
                return Err(failure);
            }
            if attempt >= self.policy.max_attempts {
                return Err(FileError::RetriesExhausted {
                    method: method.to_string(),
                    url: url.to_string(),
                    headers: format_headers(&headers),
                    attempts: attempt,
                    message: failure.to_string(),
                });
            }

            let delay = self.policy.backoff_duration(attempt);
            warn!(
                "retry #{}: will retry '{} {}' in {:?}; error in previous try: {}",
                attempt, method, url, delay, failure
            );
            self.metrics.record_http_retry();
            sleep(delay).await;
        }
    }

    /// Issue a single attempt, without retry
    async fn try_invoke(
        &self,
        method: &Method,
        url: &str,
        headers: &HeaderMap,
        body: Option<Bytes>,
    ) -> Result<HttpResponse> {
        let mut request = self.client.request(method.clone(), url).headers(headers.clone());
        if let Some(bytes) = body {
            request = request.body(bytes);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FileError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FileError::from_http_status(
                status.as_u16(),
                status
                    .canonical_reason()
                    .unwrap_or("unrecognized status")
                    .to_string(),
            ));
        }

        let response_headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| FileError::Transport(format!("failed to read response body: {}", e)))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            headers: response_headers,
            body: bytes,
        })
    }
}

/// Render a header map for inclusion in an error message
fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            format!(
                "{}: {}",
                name,
                value.to_str().unwrap_or("<non-ascii value>")
            )
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::header::CONTENT_LENGTH;

    #[test]
    fn test_backoff_schedule_is_exponential() {
        let policy = RetryPolicy::new(5);
        assert_eq!(policy.backoff_duration(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_duration(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_duration(3), Duration::from_secs(8));
        assert_eq!(policy.backoff_duration(4), Duration::from_secs(16));
    }

    #[test]
    fn test_backoff_scales_with_base_delay() {
        let policy = RetryPolicy::with_base_delay(5, Duration::from_millis(10));
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(20));
        assert_eq!(policy.backoff_duration(4), Duration::from_millis(160));
    }

    #[test]
    fn test_format_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, http::HeaderValue::from(11usize));
        let text = format_headers(&headers);
        assert_eq!(text, "content-length: 11");
    }
}
