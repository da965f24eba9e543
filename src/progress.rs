//! Progress-callback trait for per-page and per-comment harvest events.
//!
//! Inject an [`Arc<dyn HarvestProgressCallback>`] via
//! [`crate::config::HarvestConfigBuilder::progress_callback`] to receive
//! events as the driver walks the docket. The CLI uses it to drive a
//! terminal progress bar; library callers can forward events anywhere.
//!
//! # Example
//!
//! ```rust
//! use docket_harvest::{HarvestConfig, HarvestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     emitted: AtomicUsize,
//! }
//!
//! impl HarvestProgressCallback for CountingCallback {
//!     fn on_comment_complete(&self, _comment_id: &str, emitted: bool) {
//!         if emitted {
//!             self.emitted.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { emitted: AtomicUsize::new(0) });
//!
//! let config = HarvestConfig::builder()
//!     .docket_id("IRS-2022-0029")
//!     .progress_callback(counter as Arc<dyn HarvestProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::HarvestStats;
use std::sync::Arc;

/// Called by the pagination driver as it processes pages and comments.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. The driver is sequential, so events arrive in order.
pub trait HarvestProgressCallback: Send + Sync {
    /// Called before the list request for `page` is sent.
    fn on_page_start(&self, page: u32) {
        let _ = page;
    }

    /// Called once the list response for `page` is decoded.
    ///
    /// # Arguments
    /// * `items`          — number of comments on the page
    /// * `total_elements` — server-reported docket size, when present
    fn on_page_fetched(&self, page: u32, items: usize, total_elements: Option<u64>) {
        let _ = (page, items, total_elements);
    }

    /// Called when the detail request for a comment failed and the driver
    /// fell back to list-only data.
    fn on_detail_error(&self, comment_id: &str, error: &str) {
        let _ = (comment_id, error);
    }

    /// Called after each comment; `emitted` is false when it had no content.
    fn on_comment_complete(&self, comment_id: &str, emitted: bool) {
        let _ = (comment_id, emitted);
    }

    /// Called once when the driver reaches DONE.
    fn on_harvest_complete(&self, stats: &HarvestStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl HarvestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::HarvestConfig`].
pub type ProgressCallback = Arc<dyn HarvestProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        pages: AtomicUsize,
        emitted: AtomicUsize,
        dropped: AtomicUsize,
        detail_errors: AtomicUsize,
    }

    impl HarvestProgressCallback for TrackingCallback {
        fn on_page_start(&self, _page: u32) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_detail_error(&self, _comment_id: &str, _error: &str) {
            self.detail_errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_comment_complete(&self, _comment_id: &str, emitted: bool) {
            if emitted {
                self.emitted.fetch_add(1, Ordering::SeqCst);
            } else {
                self.dropped.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_page_start(1);
        cb.on_page_fetched(1, 25, Some(1200));
        cb.on_detail_error("IRS-2022-0029-0001", "HTTP 500");
        cb.on_comment_complete("IRS-2022-0029-0001", true);
        cb.on_harvest_complete(&HarvestStats::default());
    }

    #[test]
    fn tracking_callback_receives_events() {
        let tracker = TrackingCallback::default();
        tracker.on_page_start(1);
        tracker.on_comment_complete("a", true);
        tracker.on_comment_complete("b", false);
        tracker.on_detail_error("b", "timeout");
        tracker.on_page_start(2);

        assert_eq!(tracker.pages.load(Ordering::SeqCst), 2);
        assert_eq!(tracker.emitted.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.dropped.load(Ordering::SeqCst), 1);
        assert_eq!(tracker.detail_errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: Arc<dyn HarvestProgressCallback> = Arc::new(NoopProgressCallback);
        cb.on_page_start(3);
        cb.on_comment_complete("x", false);
    }
}
