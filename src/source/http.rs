use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, RETRY_AFTER};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::source::FetchError;

/// Exponential backoff for retryable responses (transport errors, 429, 5xx).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// `initial * multiplier^attempt`, capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let ms = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exp);
        Duration::from_millis(ms.min(self.max_backoff_ms as f64) as u64)
    }

    fn cap(&self, wait: Duration) -> Duration {
        wait.min(Duration::from_millis(self.max_backoff_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// Blocking JSON client shared by the API adapters.
pub struct HttpFetcher {
    client: Client,
    bearer: Option<String>,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(timeout: Duration, bearer: Option<String>, policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("track-enrich/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            bearer,
            policy,
        })
    }

    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let mut attempt = 0u32;
        loop {
            let mut request = self.client.get(url).query(query).header(ACCEPT, "application/json");
            if let Some(token) = &self.bearer {
                request = request.bearer_auth(token);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let body = response.text()?;
                        debug!(url, bytes = body.len(), "Response received");
                        return serde_json::from_str(&body)
                            .map_err(|e| FetchError::Malformed(format!("{url}: {e}")));
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Err(FetchError::NotFound(url.to_string()));
                    }

                    let rate_limited = status == StatusCode::TOO_MANY_REQUESTS;
                    if !(rate_limited || status.is_server_error()) || attempt >= self.policy.max_retries {
                        return Err(if rate_limited {
                            FetchError::RateLimited {
                                url: url.to_string(),
                                attempts: attempt + 1,
                            }
                        } else {
                            FetchError::Status {
                                url: url.to_string(),
                                status: status.as_u16(),
                            }
                        });
                    }

                    let wait = retry_after(&response)
                        .map(|d| self.policy.cap(d))
                        .unwrap_or_else(|| self.policy.backoff(attempt));
                    warn!(url, status = status.as_u16(), attempt, wait_ms = wait.as_millis() as u64, "Retrying request");
                    thread::sleep(wait);
                }
                Err(e) => {
                    if attempt >= self.policy.max_retries {
                        return Err(e.into());
                    }
                    let wait = self.policy.backoff(attempt);
                    warn!(url, error = %e, attempt, wait_ms = wait.as_millis() as u64, "Request failed, retrying");
                    thread::sleep(wait);
                }
            }
            attempt += 1;
        }
    }
}

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 60_000,
            backoff_multiplier: 2.0,
        };

        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(1), Duration::from_millis(200));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_capping() {
        let policy = RetryPolicy {
            max_retries: 10,
            initial_backoff_ms: 500,
            max_backoff_ms: 3_000,
            backoff_multiplier: 2.0,
        };

        // 500 * 2^2 = 2000, under the cap
        assert_eq!(policy.backoff(2), Duration::from_millis(2_000));
        // 500 * 2^3 = 4000 -> 3000
        assert_eq!(policy.backoff(3), Duration::from_millis(3_000));
        assert_eq!(policy.backoff(30), Duration::from_millis(3_000));
    }

    #[test]
    fn test_retry_after_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.cap(Duration::from_secs(3600)), Duration::from_millis(10_000));
        assert_eq!(policy.cap(Duration::from_secs(2)), Duration::from_secs(2));
    }
}
