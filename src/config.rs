//! Configuration types for a docket harvest run.
//!
//! All harvest behaviour is controlled through [`HarvestConfig`], built via
//! its [`HarvestConfigBuilder`]. The config is an explicit value handed to
//! [`crate::harvest::harvest`]; nothing is read from process-wide state
//! except the `REGULATIONS_API_KEY` fallback when no key was set.

use crate::error::HarvestError;
use crate::progress::ProgressCallback;
use crate::source::CommentSource;
use secrecy::{ExposeSecret, SecretBox};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default API root for regulations.gov v4.
pub const DEFAULT_BASE_URL: &str = "https://api.regulations.gov/v4";

/// Environment variable consulted when no key is configured explicitly.
pub const API_KEY_ENV: &str = "REGULATIONS_API_KEY";

/// Largest page size the list endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 250;

/// A regulations.gov API key that never shows up in logs or `Debug` output.
pub struct ApiKey(SecretBox<str>);

impl ApiKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(Box::from(value.into().as_str())))
    }

    /// Only call this when actually building a request.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Read the key from [`API_KEY_ENV`], ignoring an empty value.
    pub fn from_env() -> Option<Self> {
        std::env::var(API_KEY_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(Self::new)
    }
}

impl Clone for ApiKey {
    fn clone(&self) -> Self {
        Self::new(self.expose().to_string())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<&str> for ApiKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ApiKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Configuration for one harvest run over one docket.
///
/// # Example
/// ```rust
/// use docket_harvest::HarvestConfig;
///
/// let config = HarvestConfig::builder()
///     .api_key("DEMO_KEY")
///     .docket_id("IRS-2022-0029")
///     .page_size(100)
///     .pages(1, Some(2))
///     .build()
///     .unwrap();
/// assert_eq!(config.end_page, Some(2));
/// ```
#[derive(Clone)]
pub struct HarvestConfig {
    /// API key. If None, [`API_KEY_ENV`] is consulted when the HTTP source is built.
    pub api_key: Option<ApiKey>,

    /// API root, without trailing slash. Default: [`DEFAULT_BASE_URL`].
    pub base_url: String,

    /// Docket identifier, e.g. "IRS-2022-0029". Required.
    pub docket_id: String,

    /// Items per list page, 1–250. Default: 250.
    pub page_size: u32,

    /// First page to fetch (1-indexed, inclusive). Default: 1.
    pub start_page: u32,

    /// Last page to fetch (inclusive). None runs until the server reports no next page.
    pub end_page: Option<u32>,

    /// Pause after each detail request. Default: 300 ms.
    pub per_detail_sleep: Duration,

    /// Pause after each attachment download. Default: 100 ms.
    pub per_attachment_sleep: Duration,

    /// Pause between list pages. Default: 500 ms.
    pub per_page_sleep: Duration,

    /// Maximum pages of text taken from each PDF attachment. Default: 20.
    pub max_pdf_pages: usize,

    /// Retries after the first attempt on 429 / transient download errors. Default: 5.
    pub max_retries: u32,

    /// Unit of the exponential backoff `base * 2^attempt`. Default: 1 s.
    pub retry_base_delay: Duration,

    /// Upper bound on any single backoff, including `Retry-After`. Default: 120 s.
    pub max_retry_delay: Duration,

    /// Per-request timeout for JSON calls in seconds. Default: 30.
    pub request_timeout_secs: u64,

    /// Per-request timeout for attachment downloads in seconds. Default: 60.
    pub download_timeout_secs: u64,

    /// Pre-constructed comment source. Takes precedence over the HTTP client.
    pub source: Option<Arc<dyn CommentSource>>,

    /// Optional per-page / per-item progress callback.
    pub progress_callback: Option<ProgressCallback>,

    /// Stops the run between items when cancelled.
    pub cancel: Option<CancellationToken>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            docket_id: String::new(),
            page_size: MAX_PAGE_SIZE,
            start_page: 1,
            end_page: None,
            per_detail_sleep: Duration::from_millis(300),
            per_attachment_sleep: Duration::from_millis(100),
            per_page_sleep: Duration::from_millis(500),
            max_pdf_pages: 20,
            max_retries: 5,
            retry_base_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(120),
            request_timeout_secs: 30,
            download_timeout_secs: 60,
            source: None,
            progress_callback: None,
            cancel: None,
        }
    }
}

impl fmt::Debug for HarvestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HarvestConfig")
            .field("api_key", &self.api_key)
            .field("base_url", &self.base_url)
            .field("docket_id", &self.docket_id)
            .field("page_size", &self.page_size)
            .field("start_page", &self.start_page)
            .field("end_page", &self.end_page)
            .field("per_detail_sleep", &self.per_detail_sleep)
            .field("per_attachment_sleep", &self.per_attachment_sleep)
            .field("per_page_sleep", &self.per_page_sleep)
            .field("max_pdf_pages", &self.max_pdf_pages)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("max_retry_delay", &self.max_retry_delay)
            .field("source", &self.source.as_ref().map(|_| "<dyn CommentSource>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn HarvestProgressCallback>"),
            )
            .finish()
    }
}

impl HarvestConfig {
    /// Create a new builder for `HarvestConfig`.
    pub fn builder() -> HarvestConfigBuilder {
        HarvestConfigBuilder {
            config: Self::default(),
        }
    }

    /// Set every pause to zero. Handy for tests and replayed fixtures.
    pub fn without_pauses(mut self) -> Self {
        self.per_detail_sleep = Duration::ZERO;
        self.per_attachment_sleep = Duration::ZERO;
        self.per_page_sleep = Duration::ZERO;
        self
    }

    /// True when the run has been cancelled through [`HarvestConfig::cancel`].
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

/// Builder for [`HarvestConfig`].
#[derive(Debug)]
pub struct HarvestConfigBuilder {
    config: HarvestConfig,
}

impl HarvestConfigBuilder {
    pub fn api_key(mut self, key: impl Into<ApiKey>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn docket_id(mut self, id: impl Into<String>) -> Self {
        self.config.docket_id = id.into();
        self
    }

    pub fn page_size(mut self, n: u32) -> Self {
        self.config.page_size = n;
        self
    }

    /// Inclusive page window. `end = None` follows `hasNextPage`.
    pub fn pages(mut self, start: u32, end: Option<u32>) -> Self {
        self.config.start_page = start;
        self.config.end_page = end;
        self
    }

    pub fn per_detail_sleep(mut self, d: Duration) -> Self {
        self.config.per_detail_sleep = d;
        self
    }

    pub fn per_attachment_sleep(mut self, d: Duration) -> Self {
        self.config.per_attachment_sleep = d;
        self
    }

    pub fn per_page_sleep(mut self, d: Duration) -> Self {
        self.config.per_page_sleep = d;
        self
    }

    pub fn max_pdf_pages(mut self, n: usize) -> Self {
        self.config.max_pdf_pages = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_base_delay(mut self, d: Duration) -> Self {
        self.config.retry_base_delay = d;
        self
    }

    pub fn max_retry_delay(mut self, d: Duration) -> Self {
        self.config.max_retry_delay = d;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs.max(1);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs.max(1);
        self
    }

    pub fn source(mut self, source: Arc<dyn CommentSource>) -> Self {
        self.config.source = Some(source);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn cancel_token(mut self, token: CancellationToken) -> Self {
        self.config.cancel = Some(token);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<HarvestConfig, HarvestError> {
        let c = &self.config;
        if c.docket_id.trim().is_empty() {
            return Err(HarvestError::InvalidConfig(
                "docket id must not be empty".into(),
            ));
        }
        if c.page_size == 0 || c.page_size > MAX_PAGE_SIZE {
            return Err(HarvestError::InvalidConfig(format!(
                "page size must be 1–{MAX_PAGE_SIZE}, got {}",
                c.page_size
            )));
        }
        if c.start_page == 0 {
            return Err(HarvestError::InvalidConfig(
                "pages are 1-indexed, start page must be ≥ 1".into(),
            ));
        }
        if let Some(end) = c.end_page {
            if end < c.start_page {
                return Err(HarvestError::InvalidConfig(format!(
                    "end page {end} is before start page {}",
                    c.start_page
                )));
            }
        }
        if c.max_pdf_pages == 0 {
            return Err(HarvestError::InvalidConfig(
                "max PDF pages must be ≥ 1".into(),
            ));
        }
        if c.max_retry_delay < c.retry_base_delay {
            return Err(HarvestError::InvalidConfig(
                "max retry delay must not be shorter than the base delay".into(),
            ));
        }
        Ok(self.config)
    }
}
