//! Output types and writers.
//!
//! [`CommentRecord`] is the persisted unit. Its field order is the column
//! order of the CSV form, so it must not be reordered.

use crate::error::HarvestError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One normalized public comment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    pub comment_id: String,
    pub agency_id: Option<String>,
    pub docket_id: Option<String>,
    pub document_id: Option<String>,
    pub comment_on_id: Option<String>,
    pub document_type: Option<String>,
    pub posted_date: Option<String>,
    pub receive_date: Option<String>,
    pub title: Option<String>,
    pub tracking_nbr: Option<String>,
    pub organization_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub city: Option<String>,
    pub state_province_region: Option<String>,
    pub country: Option<String>,
    pub withdrawn: Option<bool>,
    pub restrict_reason_type: Option<String>,
    pub restrict_reason: Option<String>,
    pub raw_comment_html: String,
    pub clean_comment_html: String,
    pub pdf_text: String,
    pub combined_text: String,
    pub pdf_urls: String,
    pub has_see_attached_hint: bool,
}

/// CSV header, in [`CommentRecord`] field order.
pub const CSV_COLUMNS: [&str; 25] = [
    "commentId",
    "agencyId",
    "docketId",
    "documentId",
    "commentOnId",
    "documentType",
    "postedDate",
    "receiveDate",
    "title",
    "trackingNbr",
    "organizationName",
    "firstName",
    "lastName",
    "city",
    "stateProvinceRegion",
    "country",
    "withdrawn",
    "restrictReasonType",
    "restrictReason",
    "rawCommentHtml",
    "cleanCommentHtml",
    "pdfText",
    "combinedText",
    "pdfUrls",
    "hasSeeAttachedHint",
];

/// Why the pagination driver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StopReason {
    /// A list page came back with zero items.
    #[default]
    EmptyPage,
    /// The server reported `hasNextPage = false`.
    NoNextPage,
    /// The configured end page was processed.
    EndPageReached,
    /// The cancellation token fired.
    Cancelled,
}

/// Counters for one harvest run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestStats {
    pub pages_fetched: u32,
    /// Last page number requested from the list endpoint.
    pub last_page: u32,
    pub items_seen: usize,
    pub records_emitted: usize,
    /// Items with neither inline nor attachment text.
    pub items_dropped: usize,
    pub detail_failures: usize,
    pub attachments_found: usize,
    /// Attachments whose download or decode produced no text.
    pub attachments_empty: usize,
    /// `meta.totalElements` from the most recent list page.
    pub total_elements: Option<u64>,
    pub stop_reason: StopReason,
    pub duration_ms: u64,
}

/// Result of a completed harvest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarvestOutput {
    pub records: Vec<CommentRecord>,
    pub stats: HarvestStats,
}

/// Paths written by [`crate::harvest::harvest_to_dir`].
#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub json: PathBuf,
    pub csv: PathBuf,
}

/// File stem used for a page window, e.g. `IRS-2022-0029_comments_text_pdf_p1_to_p2`.
pub fn output_stem(docket_id: &str, start_page: u32, end_page: u32) -> String {
    format!("{docket_id}_comments_text_pdf_p{start_page}_to_p{end_page}")
}

/// Write records as a pretty-printed JSON array (atomic: temp file + rename).
pub fn write_json(path: &Path, records: &[CommentRecord]) -> Result<(), HarvestError> {
    let body = serde_json::to_vec_pretty(records)
        .map_err(|e| HarvestError::Internal(format!("serialise records: {e}")))?;
    write_atomic(path, &body)
}

/// Write records as CSV with the fixed [`CSV_COLUMNS`] header (atomic).
pub fn write_csv(path: &Path, records: &[CommentRecord]) -> Result<(), HarvestError> {
    let body = records_to_csv(records).map_err(|e| HarvestError::Csv {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    write_atomic(path, &body)
}

fn records_to_csv(records: &[CommentRecord]) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    // Written explicitly so an empty run still gets a header row.
    writer.write_record(CSV_COLUMNS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Write `bytes` to `path` via a sibling temp file, creating parent dirs.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), HarvestError> {
    let fail = |source: std::io::Error| HarvestError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(fail)?;
        }
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    std::fs::write(&tmp_path, bytes).map_err(fail)?;
    std::fs::rename(&tmp_path, path).map_err(fail)
}
