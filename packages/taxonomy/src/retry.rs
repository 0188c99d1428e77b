//! HTTP retry helpers for transient errors.
//!
//! Provider clients use [`send_json`] or [`send_text`] instead of calling
//! `reqwest::RequestBuilder::send()` directly, so every request gets the
//! same bounded retry behaviour. The defaults allow a single retry: a
//! species lookup that still fails is logged and skipped by the caller
//! rather than holding up the rest of the batch.
//!
//! # Usage
//!
//! ```ignore
//! use crate::retry::{self, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! let body = retry::send_json(&policy, || client.get(&url).query(&params)).await?;
//! ```

use std::time::Duration;

use crate::TaxonomyError;

/// Maximum length of the response body preview included in error logs.
const BODY_PREVIEW_LEN: usize = 300;

/// How many times, and how patiently, a request is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each subsequent retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries. Used by tests against local servers.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16))
    }
}

/// Builds the shared HTTP client with a bounded per-request timeout.
///
/// # Errors
///
/// Returns [`TaxonomyError::Http`] if the TLS backend cannot be initialised.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, TaxonomyError> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("hab_eval/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Sends an HTTP request and parses the response body as JSON.
///
/// The `build_request` closure is called on each attempt to construct a
/// fresh [`reqwest::RequestBuilder`] (builders are consumed by `.send()`).
///
/// # Errors
///
/// Returns [`TaxonomyError`] if the request fails after all retries, the
/// server returns a non-retryable status code, or the body is not JSON.
#[allow(clippy::future_not_send)]
pub async fn send_json<F>(
    policy: &RetryPolicy,
    build_request: F,
) -> Result<serde_json::Value, TaxonomyError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(policy, &build_request).await?;
    let url = response.url().to_string();
    let text = response.text().await?;

    serde_json::from_str(&text).map_err(|e| {
        let preview = preview(&text);
        log::warn!("JSON parse failed for {url}: {e}\n  body preview: {preview}");
        TaxonomyError::Parse {
            message: format!("invalid JSON from {url}: {e}"),
        }
    })
}

/// Sends an HTTP request and returns the response body as a `String`.
///
/// Used for the XML services (`NatureServe`, ITIS common names).
///
/// # Errors
///
/// Returns [`TaxonomyError`] if the request fails after all retries or the
/// body cannot be read.
#[allow(clippy::future_not_send)]
pub async fn send_text<F>(policy: &RetryPolicy, build_request: F) -> Result<String, TaxonomyError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let response = send_inner(policy, &build_request).await?;
    Ok(response.text().await?)
}

/// Core retry loop shared by [`send_json`] and [`send_text`].
///
/// Retries connection errors, timeouts, HTTP 429 and HTTP 5xx. Other 4xx
/// responses are permanent and returned immediately.
#[allow(clippy::future_not_send)]
async fn send_inner<F>(
    policy: &RetryPolicy,
    build_request: &F,
) -> Result<reqwest::Response, TaxonomyError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let max_retries = policy.max_retries;
    let mut last_error: Option<TaxonomyError> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = policy.delay_for(attempt);
            log::warn!("  retry {attempt}/{max_retries} in {delay:?}...");
            tokio::time::sleep(delay).await;
        }

        match build_request().send().await {
            Err(e) => {
                if is_transient(&e) && attempt < max_retries {
                    log::warn!("  transient error: {e}");
                    last_error = Some(TaxonomyError::Http(e));
                    continue;
                }
                return Err(TaxonomyError::Http(e));
            }
            Ok(response) => {
                let status = response.status();
                let url = response.url().to_string();

                if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    if attempt < max_retries {
                        log::warn!("  HTTP {status} from {url}");
                        last_error = Some(TaxonomyError::Status { status, url });
                        continue;
                    }
                    return Err(TaxonomyError::Status { status, url });
                }

                if status.is_client_error() {
                    return Err(TaxonomyError::Status { status, url });
                }

                return Ok(response);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| TaxonomyError::Parse {
        message: "request failed after all retries".to_string(),
    }))
}

/// Returns `true` if the error is likely transient and worth retrying.
fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
}

fn preview(text: &str) -> &str {
    if text.len() <= BODY_PREVIEW_LEN {
        return text;
    }
    let mut end = BODY_PREVIEW_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_per_retry() {
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(8));
    }

    #[test]
    fn default_policy_retries_once() {
        assert_eq!(RetryPolicy::default().max_retries, 1);
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let text = "é".repeat(BODY_PREVIEW_LEN);
        let p = preview(&text);
        assert!(p.len() <= BODY_PREVIEW_LEN);
        assert!(text.starts_with(p));
    }

    #[tokio::test]
    async fn unreachable_host_fails_without_retrying_forever() {
        let client = build_client(Duration::from_millis(200)).unwrap();
        let result = send_json(&RetryPolicy::none(), || client.get("http://127.0.0.1:9/")).await;
        assert!(result.is_err());
    }
}
