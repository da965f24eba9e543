//! The pagination driver: walks a docket page by page and item by item.
//!
//! ```text
//!            ┌──────────────┐  zero items / cancelled
//!   start ──▶│ FetchingPage │────────────────────────────┐
//!            └──────┬───────┘                            ▼
//!                   │ list ok                         ┌──────┐
//!                   ▼                                 │ Done │
//!          ┌─────────────────┐  hasNextPage=false /   └──────┘
//!          │ ProcessingItems │──end page / cancelled ───▲
//!          └────────┬────────┘
//!                   │ page + 1, per-page pause
//!                   └──────────▶ FetchingPage
//! ```
//!
//! Everything is sequential: one list request, then per item one detail
//! request and one download per attachment, each followed by its configured
//! pause. Only a failed list request ends the run with an error; a failed
//! detail request or attachment only thins out that one record.

use crate::config::HarvestConfig;
use crate::error::HarvestError;
use crate::output::{CommentRecord, HarvestOutput, HarvestStats, StopReason};
use crate::pipeline::attachments::{locate_attachment_urls, AttachmentUrl};
use crate::pipeline::normalize::normalize_comment;
use crate::pipeline::pdf::extract_text_async;
use crate::source::{CommentSource, DetailDocument, ListPage, RawListItem};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

enum DriverState {
    FetchingPage(u32),
    ProcessingItems { page: u32, list: ListPage },
    Done(StopReason),
}

/// Run the driver to completion against `source`.
///
/// # Errors
/// The first list-page request that fails after retries.
pub async fn run(
    source: &dyn CommentSource,
    config: &HarvestConfig,
) -> Result<HarvestOutput, HarvestError> {
    let started = Instant::now();
    let mut records: Vec<CommentRecord> = Vec::new();
    let mut stats = HarvestStats::default();
    let mut state = DriverState::FetchingPage(config.start_page);

    let stop_reason = loop {
        state = match state {
            DriverState::FetchingPage(page) => {
                if config.is_cancelled() {
                    DriverState::Done(StopReason::Cancelled)
                } else {
                    fetch_page(source, config, page, &mut stats).await?
                }
            }
            DriverState::ProcessingItems { page, list } => {
                let cancelled =
                    process_items(source, config, &list.data, &mut records, &mut stats).await;
                next_after_page(config, page, &list, cancelled).await
            }
            DriverState::Done(reason) => break reason,
        };
    };

    stats.stop_reason = stop_reason;
    stats.records_emitted = records.len();
    stats.duration_ms = started.elapsed().as_millis() as u64;

    info!(
        docket = %config.docket_id,
        pages = stats.pages_fetched,
        items = stats.items_seen,
        records = stats.records_emitted,
        dropped = stats.items_dropped,
        detail_failures = stats.detail_failures,
        stop = ?stats.stop_reason,
        "Harvest finished"
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_harvest_complete(&stats);
    }

    Ok(HarvestOutput { records, stats })
}

async fn fetch_page(
    source: &dyn CommentSource,
    config: &HarvestConfig,
    page: u32,
    stats: &mut HarvestStats,
) -> Result<DriverState, HarvestError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_start(page);
    }
    info!(docket = %config.docket_id, page, page_size = config.page_size, "Fetching comment page");

    stats.last_page = page;
    let list = source
        .list_page(&config.docket_id, config.page_size, page)
        .await?;
    stats.pages_fetched += 1;
    if list.meta.total_elements.is_some() {
        stats.total_elements = list.meta.total_elements;
    }

    info!(
        page,
        items = list.data.len(),
        total_elements = ?list.meta.total_elements,
        total_pages = ?list.meta.total_pages,
        has_next_page = ?list.meta.has_next_page,
        "Fetched comment page"
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_page_fetched(page, list.data.len(), list.meta.total_elements);
    }

    if list.data.is_empty() {
        info!(page, "Empty page, stopping");
        return Ok(DriverState::Done(StopReason::EmptyPage));
    }
    Ok(DriverState::ProcessingItems { page, list })
}

/// Decide where to go once every item of `page` is processed.
async fn next_after_page(
    config: &HarvestConfig,
    page: u32,
    list: &ListPage,
    cancelled: bool,
) -> DriverState {
    if cancelled {
        return DriverState::Done(StopReason::Cancelled);
    }
    if list.meta.has_next_page == Some(false) {
        info!(page, "Server reports no next page, stopping");
        return DriverState::Done(StopReason::NoNextPage);
    }
    if config.end_page.is_some_and(|end| page >= end) {
        info!(page, "Reached end page, stopping");
        return DriverState::Done(StopReason::EndPageReached);
    }
    pause(config.per_page_sleep).await;
    DriverState::FetchingPage(page + 1)
}

/// Process one page's items. Returns true if cancellation interrupted it.
async fn process_items(
    source: &dyn CommentSource,
    config: &HarvestConfig,
    items: &[RawListItem],
    records: &mut Vec<CommentRecord>,
    stats: &mut HarvestStats,
) -> bool {
    for item in items {
        if config.is_cancelled() {
            info!(comment_id = %item.id, "Cancelled, stopping before item");
            return true;
        }
        stats.items_seen += 1;

        let record = process_item(source, config, item, stats).await;
        let emitted = record.is_some();
        match record {
            Some(r) => records.push(r),
            None => {
                stats.items_dropped += 1;
                debug!(comment_id = %item.id, "No inline or attachment text, dropping");
            }
        }

        if let Some(ref cb) = config.progress_callback {
            cb.on_comment_complete(&item.id, emitted);
        }
    }
    false
}

async fn process_item(
    source: &dyn CommentSource,
    config: &HarvestConfig,
    item: &RawListItem,
    stats: &mut HarvestStats,
) -> Option<CommentRecord> {
    let detail: Option<DetailDocument> = match source.comment_detail(&item.id).await {
        Ok(doc) => Some(doc),
        Err(e) => {
            warn!(comment_id = %item.id, error = %e, "Detail fetch failed, using list data only");
            stats.detail_failures += 1;
            if let Some(ref cb) = config.progress_callback {
                cb.on_detail_error(&item.id, &e.to_string());
            }
            None
        }
    };
    pause(config.per_detail_sleep).await;

    let attachments: Vec<AttachmentUrl> = detail
        .as_ref()
        .map(locate_attachment_urls)
        .unwrap_or_default();
    stats.attachments_found += attachments.len();

    let mut pdf_texts = Vec::with_capacity(attachments.len());
    if !attachments.is_empty() {
        debug!(comment_id = %item.id, count = attachments.len(), "Extracting attachment text");
    }
    for attachment in &attachments {
        let bytes = source.download(&attachment.url).await;
        let text = if bytes.is_empty() {
            String::new()
        } else {
            extract_text_async(bytes, config.max_pdf_pages).await
        };
        if text.is_empty() {
            stats.attachments_empty += 1;
            debug!(comment_id = %item.id, url = %attachment.url, "Attachment yielded no text");
        }
        pdf_texts.push(text);
        pause(config.per_attachment_sleep).await;
    }

    normalize_comment(item, detail.as_ref(), &attachments, &pdf_texts)
}

async fn pause(d: Duration) {
    if !d.is_zero() {
        tokio::time::sleep(d).await;
    }
}
