//! Resilient HTTP client: JSON and binary GETs with bounded retry.
//!
//! ## Retry Strategy
//!
//! regulations.gov enforces an hourly request quota and answers `429 Too Many
//! Requests` when it is exceeded, sometimes with a `Retry-After` header. Both
//! call sites share one [`RetryPolicy`]; what differs is how a failure is
//! classified:
//!
//! | failure            | JSON call            | binary call                 |
//! |--------------------|----------------------|-----------------------------|
//! | 429                | retry, then propagate | retry, then degrade to `[]` |
//! | network / timeout  | propagate            | retry, then degrade to `[]` |
//! | other HTTP status  | propagate            | degrade to `[]`             |
//! | undecodable body   | propagate            | retry, then degrade to `[]` |
//!
//! The wait before retry `n` (0-based) is the server's numeric `Retry-After`
//! when present, else `base * 2^n`, both capped at `max_delay`. With the
//! defaults (1 s base, 120 s cap, 5 retries) that is 1 → 2 → 4 → 8 → 16 s.

use crate::config::{ApiKey, HarvestConfig};
use crate::error::HarvestError;
use reqwest::header::{ACCEPT, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Host whose download links need the key as a query parameter.
pub const DOWNLOAD_HOST: &str = "downloads.regulations.gov";

const JSON_USER_AGENT: &str = "docket-harvest/regulations-scraper";
const DOWNLOAD_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const DOWNLOAD_ACCEPT: &str = "application/pdf,application/octet-stream,*/*;q=0.8";

/// Bounded exponential backoff shared by every request kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
            max_delay: config.max_retry_delay,
        }
    }

    /// `min(base * 2^attempt, max_delay)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry `attempt`, honouring a numeric `Retry-After`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<&str>) -> Duration {
        match retry_after.and_then(parse_retry_after) {
            Some(server) => server.min(self.max_delay),
            None => self.backoff(attempt),
        }
    }

    /// Decide what to do with `failure` on zero-based `attempt`.
    pub fn classify(&self, kind: RequestKind, failure: &Failure, attempt: u32) -> RetryDecision {
        let retryable = match (kind, failure) {
            (_, Failure::RateLimited { .. }) => true,
            (RequestKind::Binary, Failure::Network { .. } | Failure::Timeout | Failure::Body(_)) => {
                true
            }
            _ => false,
        };

        if retryable && attempt < self.max_retries {
            let retry_after = match failure {
                Failure::RateLimited { retry_after } => retry_after.as_deref(),
                _ => None,
            };
            return RetryDecision::Retry(self.delay_for(attempt, retry_after));
        }

        match kind {
            RequestKind::Json => RetryDecision::Propagate,
            RequestKind::Binary => RetryDecision::Degrade,
        }
    }

    /// Run `op` until it succeeds or the policy gives up.
    ///
    /// `op` receives the zero-based attempt number. Returns `Ok(None)` when
    /// the failure was classified as [`RetryDecision::Degrade`].
    pub async fn execute<T, F, Fut>(
        &self,
        kind: RequestKind,
        url: &str,
        mut op: F,
    ) -> Result<Option<T>, (Failure, u32)>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, Failure>>,
    {
        let mut attempt = 0u32;
        loop {
            let failure = match op(attempt).await {
                Ok(value) => return Ok(Some(value)),
                Err(f) => f,
            };

            match self.classify(kind, &failure, attempt) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        url,
                        kind = ?kind,
                        failure = %failure,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retrying request"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::Degrade => {
                    warn!(url, kind = ?kind, failure = %failure, attempts = attempt + 1,
                        "Request failed, continuing with empty body");
                    return Ok(None);
                }
                RetryDecision::Propagate => {
                    warn!(url, kind = ?kind, failure = %failure, attempts = attempt + 1,
                        "Request failed");
                    return Err((failure, attempt + 1));
                }
            }
        }
    }
}

/// Which call site a request comes from; drives failure classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Json,
    Binary,
}

/// Outcome of classifying one failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    Degrade,
    Propagate,
}

/// One failed attempt, before the policy decides what to do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// HTTP 429, with the raw `Retry-After` header if present.
    RateLimited { retry_after: Option<String> },
    /// Any other non-success status.
    Status(u16),
    /// Connection, DNS or TLS failure.
    Network { reason: String },
    Timeout,
    /// The body could not be read or decoded.
    Body(String),
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::RateLimited { .. } => f.write_str("HTTP 429 Too Many Requests"),
            Failure::Status(code) => write!(f, "HTTP {code}"),
            Failure::Network { reason } => write!(f, "network error: {reason}"),
            Failure::Timeout => f.write_str("timed out"),
            Failure::Body(reason) => write!(f, "bad body: {reason}"),
        }
    }
}

impl Failure {
    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Failure::Timeout
        } else if e.is_decode() || e.is_body() {
            Failure::Body(e.to_string())
        } else {
            Failure::Network {
                reason: e.to_string(),
            }
        }
    }

    fn into_harvest_error(self, url: &str, attempts: u32, timeout_secs: u64) -> HarvestError {
        let url = url.to_string();
        match self {
            Failure::RateLimited { .. } => HarvestError::RateLimitExhausted { url, attempts },
            Failure::Status(status) => HarvestError::Http { url, status },
            Failure::Network { reason } => HarvestError::Network { url, reason },
            Failure::Timeout => HarvestError::Timeout {
                url,
                secs: timeout_secs,
            },
            Failure::Body(reason) => HarvestError::InvalidJson { url, reason },
        }
    }
}

/// Parse a `Retry-After` value given in whole seconds.
///
/// HTTP-date values are not numeric and fall back to exponential backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

/// Append `api_key=` to download links on [`DOWNLOAD_HOST`] that lack one.
///
/// Other hosts are returned untouched.
pub fn authorize_download_url(url: &str, key: &str) -> String {
    if url.contains(DOWNLOAD_HOST) && !url.contains("api_key=") {
        let sep = if url.contains('?') { '&' } else { '?' };
        format!("{url}{sep}api_key={key}")
    } else {
        url.to_string()
    }
}

/// API client for JSON endpoints and attachment downloads.
pub struct ApiClient {
    client: reqwest::Client,
    api_key: ApiKey,
    policy: RetryPolicy,
    request_timeout: Duration,
    download_timeout: Duration,
}

impl ApiClient {
    pub fn new(api_key: ApiKey, policy: RetryPolicy) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| HarvestError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            policy,
            request_timeout: Duration::from_secs(30),
            download_timeout: Duration::from_secs(60),
        })
    }

    /// Build a client from the harvest config (key, retry policy, timeouts).
    pub fn from_config(config: &HarvestConfig) -> Result<Self, HarvestError> {
        let key = config
            .api_key
            .clone()
            .or_else(ApiKey::from_env)
            .ok_or(HarvestError::MissingApiKey)?;
        let mut client = Self::new(key, RetryPolicy::from_config(config))?;
        client.request_timeout = Duration::from_secs(config.request_timeout_secs);
        client.download_timeout = Duration::from_secs(config.download_timeout_secs);
        Ok(client)
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// GET `url` with `query` and decode the body as JSON.
    ///
    /// # Errors
    /// Any non-429 failure immediately, or the last 429 once retries are spent.
    pub async fn fetch_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value, HarvestError> {
        let result = self
            .policy
            .execute(RequestKind::Json, url, |attempt| async move {
                debug!(url, attempt, "GET json");
                let response = self
                    .client
                    .get(url)
                    .query(query)
                    .header(USER_AGENT, JSON_USER_AGENT)
                    .header("X-Api-Key", self.api_key.expose())
                    .timeout(self.request_timeout)
                    .send()
                    .await
                    .map_err(Failure::from_reqwest)?;

                check_status(&response)?;
                response.json::<Value>().await.map_err(Failure::from_reqwest)
            })
            .await;

        match result {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Err(HarvestError::Internal(format!(
                "JSON request to '{url}' was degraded instead of propagated"
            ))),
            Err((failure, attempts)) => Err(failure.into_harvest_error(
                url,
                attempts,
                self.request_timeout.as_secs(),
            )),
        }
    }

    /// GET an attachment. Never fails: exhausted retries yield an empty vec.
    pub async fn fetch_binary(&self, url: &str) -> Vec<u8> {
        let final_url = authorize_download_url(url, self.api_key.expose());
        let final_url = final_url.as_str();

        let result = self
            .policy
            .execute(RequestKind::Binary, url, |attempt| async move {
                debug!(url, attempt, "GET binary");
                let response = self
                    .client
                    .get(final_url)
                    .header(USER_AGENT, DOWNLOAD_USER_AGENT)
                    .header(ACCEPT, DOWNLOAD_ACCEPT)
                    .header("X-Api-Key", self.api_key.expose())
                    .timeout(self.download_timeout)
                    .send()
                    .await
                    .map_err(Failure::from_reqwest)?;

                check_status(&response)?;
                let bytes = response.bytes().await.map_err(Failure::from_reqwest)?;
                Ok(bytes.to_vec())
            })
            .await;

        match result {
            Ok(Some(bytes)) => bytes,
            Ok(None) | Err(_) => Vec::new(),
        }
    }
}

fn check_status(response: &reqwest::Response) -> Result<(), Failure> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        return Err(Failure::RateLimited { retry_after });
    }
    if !status.is_success() {
        return Err(Failure::Status(status.as_u16()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    fn rate_limited() -> Failure {
        Failure::RateLimited { retry_after: None }
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let p = RetryPolicy::default();
        let secs: Vec<u64> = (0..9).map(|a| p.backoff(a).as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 32, 64, 120, 120]);
        assert_eq!(p.backoff(40), Duration::from_secs(120));
    }

    #[test]
    fn numeric_retry_after_wins_and_is_capped() {
        let p = RetryPolicy::default();
        assert_eq!(p.delay_for(3, Some("7")), Duration::from_secs(7));
        assert_eq!(p.delay_for(0, Some("600")), Duration::from_secs(120));
        // HTTP-date form is not numeric
        assert_eq!(
            p.delay_for(2, Some("Wed, 21 Oct 2015 07:28:00 GMT")),
            Duration::from_secs(4)
        );
        assert_eq!(p.delay_for(1, None), Duration::from_secs(2));
    }

    #[test]
    fn json_classification() {
        let p = RetryPolicy::default();
        assert_eq!(
            p.classify(RequestKind::Json, &rate_limited(), 0),
            RetryDecision::Retry(Duration::from_secs(1))
        );
        assert_eq!(
            p.classify(RequestKind::Json, &rate_limited(), 5),
            RetryDecision::Propagate
        );
        let net = Failure::Network {
            reason: "reset".into(),
        };
        assert_eq!(p.classify(RequestKind::Json, &net, 0), RetryDecision::Propagate);
        assert_eq!(
            p.classify(RequestKind::Json, &Failure::Status(500), 0),
            RetryDecision::Propagate
        );
    }

    #[test]
    fn binary_classification() {
        let p = RetryPolicy::default();
        assert_eq!(
            p.classify(RequestKind::Binary, &Failure::Timeout, 2),
            RetryDecision::Retry(Duration::from_secs(4))
        );
        assert_eq!(
            p.classify(RequestKind::Binary, &Failure::Timeout, 5),
            RetryDecision::Degrade
        );
        assert_eq!(
            p.classify(RequestKind::Binary, &rate_limited(), 5),
            RetryDecision::Degrade
        );
        assert_eq!(
            p.classify(RequestKind::Binary, &Failure::Status(404), 0),
            RetryDecision::Degrade
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_consecutive_429_fails_after_backoff_schedule() {
        let p = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<Option<()>, _> = p
            .execute(RequestKind::Json, "https://api/comments", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            })
            .await;

        let (failure, attempts) = result.unwrap_err();
        assert_eq!(failure, rate_limited());
        assert_eq!(attempts, 6);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        // 1 + 2 + 4 + 8 + 16
        assert_eq!(start.elapsed(), Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_after_transient_429() {
        let p = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result = p
            .execute(RequestKind::Json, "u", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(Failure::RateLimited {
                            retry_after: Some("3".into()),
                        })
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn binary_network_errors_degrade_after_retries() {
        let p = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        let calls = AtomicU32::new(0);

        let result: Result<Option<Vec<u8>>, _> = p
            .execute(RequestKind::Binary, "u", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(Failure::Network {
                        reason: "connection reset".into(),
                    })
                }
            })
            .await;

        assert_eq!(result.unwrap(), None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn json_network_error_is_not_retried() {
        let p = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<Option<()>, _> = p
            .execute(RequestKind::Json, "u", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(Failure::Timeout) }
            })
            .await;

        assert_eq!(result.unwrap_err(), (Failure::Timeout, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn download_host_gets_key_injected() {
        assert_eq!(
            authorize_download_url("https://downloads.regulations.gov/IRS-1/attachment_1.pdf", "K"),
            "https://downloads.regulations.gov/IRS-1/attachment_1.pdf?api_key=K"
        );
        assert_eq!(
            authorize_download_url("https://downloads.regulations.gov/x.pdf?contentType=pdf", "K"),
            "https://downloads.regulations.gov/x.pdf?contentType=pdf&api_key=K"
        );
    }

    #[test]
    fn existing_key_and_other_hosts_are_untouched() {
        let with_key = "https://downloads.regulations.gov/x.pdf?api_key=OLD";
        assert_eq!(authorize_download_url(with_key, "K"), with_key);
        let other = "https://www.irs.gov/pub/irs-pdf/f1040.pdf";
        assert_eq!(authorize_download_url(other, "K"), other);
    }

    #[test]
    fn failure_maps_to_fatal_error() {
        let e = rate_limited().into_harvest_error("u", 6, 30);
        assert!(matches!(e, HarvestError::RateLimitExhausted { attempts: 6, .. }));
        let e = Failure::Timeout.into_harvest_error("u", 1, 30);
        assert!(matches!(e, HarvestError::Timeout { secs: 30, .. }));
    }
}
