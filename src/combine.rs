//! Merge several harvest CSVs into one corpus and derive model-ready text.
//!
//! ```text
//! a.csv ┐
//! b.csv ┼─▶ project 11 columns ─▶ comments_all_raw.{csv,jsonl}
//! c.csv ┘            │
//!                    └─▶ text_clean = clean_for_model(combinedText)
//!                        keep len ≥ 5 ─▶ comments_all_clean.{csv,jsonl}
//! ```
//!
//! Inputs need not be produced by this crate; any CSV with a header row
//! works. Columns outside the projection are ignored and missing ones come
//! out empty (`null` in JSONL).

use crate::error::HarvestError;
use crate::output::write_atomic;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Columns kept from every input, in output order.
pub const COMBINE_COLUMNS: [&str; 11] = [
    "docketId",
    "commentId",
    "title",
    "trackingNbr",
    "organizationName",
    "firstName",
    "lastName",
    "city",
    "stateProvinceRegion",
    "country",
    "combinedText",
];

pub const RAW_CSV: &str = "comments_all_raw.csv";
pub const RAW_JSONL: &str = "comments_all_raw.jsonl";
pub const CLEAN_CSV: &str = "comments_all_clean.csv";
pub const CLEAN_JSONL: &str = "comments_all_clean.jsonl";

static RE_CONTROL_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\r\n\t]").unwrap());
static RE_SEE_ATTACHED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)see attached file\(s\)|see attached files").unwrap());
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One projected input row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedRow {
    pub docket_id: Option<String>,
    pub comment_id: Option<String>,
    pub title: Option<String>,
    pub tracking_nbr: Option<String>,
    pub organization_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub city: Option<String>,
    pub state_province_region: Option<String>,
    pub country: Option<String>,
    pub combined_text: Option<String>,
}

/// A row that survived cleaning. Same columns plus `text_raw` / `text_clean`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanRow {
    pub docket_id: Option<String>,
    pub comment_id: Option<String>,
    pub title: Option<String>,
    pub tracking_nbr: Option<String>,
    pub organization_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub city: Option<String>,
    pub state_province_region: Option<String>,
    pub country: Option<String>,
    pub combined_text: Option<String>,
    #[serde(rename = "text_raw")]
    pub text_raw: Option<String>,
    #[serde(rename = "text_clean")]
    pub text_clean: String,
}

impl CleanRow {
    fn new(row: &CombinedRow, text_clean: String) -> Self {
        Self {
            docket_id: row.docket_id.clone(),
            comment_id: row.comment_id.clone(),
            title: row.title.clone(),
            tracking_nbr: row.tracking_nbr.clone(),
            organization_name: row.organization_name.clone(),
            first_name: row.first_name.clone(),
            last_name: row.last_name.clone(),
            city: row.city.clone(),
            state_province_region: row.state_province_region.clone(),
            country: row.country.clone(),
            combined_text: row.combined_text.clone(),
            text_raw: row.combined_text.clone(),
            text_clean,
        }
    }
}

/// Options for [`combine_files`] and [`clean_for_model`].
#[derive(Debug, Clone)]
pub struct CombineOptions {
    /// Lowercase the cleaned text. Default: true.
    pub lowercase: bool,
    /// Tax-code sections to normalise, e.g. `"45Q"`: `section 45Q` → `45Q`.
    pub section_codes: Vec<String>,
    /// Cleaned texts shorter than this (in chars) are dropped. Default: 5.
    pub min_clean_len: usize,
}

impl Default for CombineOptions {
    fn default() -> Self {
        Self {
            lowercase: true,
            section_codes: Vec::new(),
            min_clean_len: 5,
        }
    }
}

/// What [`combine_files`] read and wrote.
#[derive(Debug, Clone)]
pub struct CombineSummary {
    pub files_read: usize,
    pub files_skipped: Vec<PathBuf>,
    pub raw_rows: usize,
    pub clean_rows: usize,
    pub raw_csv: PathBuf,
    pub raw_jsonl: PathBuf,
    pub clean_csv: PathBuf,
    pub clean_jsonl: PathBuf,
}

/// Merge `inputs` and write the raw and clean datasets into `out_dir`.
///
/// # Errors
/// - [`HarvestError::NoInputFiles`] when none of `inputs` exists
/// - [`HarvestError::Csv`] when an existing file is not valid CSV
/// - [`HarvestError::OutputWriteFailed`] when an output cannot be written
pub fn combine_files(
    inputs: &[PathBuf],
    out_dir: &Path,
    options: &CombineOptions,
) -> Result<CombineSummary, HarvestError> {
    let mut rows: Vec<CombinedRow> = Vec::new();
    let mut files_read = 0usize;
    let mut files_skipped = Vec::new();

    for path in inputs {
        info!(path = %path.display(), "Reading comments CSV");
        if !path.exists() {
            warn!(path = %path.display(), "File not found, skipping");
            files_skipped.push(path.clone());
            continue;
        }
        let mut file_rows = read_comments_csv(path)?;
        info!(path = %path.display(), rows = file_rows.len(), "Read comments CSV");
        rows.append(&mut file_rows);
        files_read += 1;
    }

    if files_read == 0 {
        return Err(HarvestError::NoInputFiles);
    }

    let raw_csv = out_dir.join(RAW_CSV);
    let raw_jsonl = out_dir.join(RAW_JSONL);
    write_atomic(&raw_csv, &to_csv(&raw_csv, &COMBINE_COLUMNS, &rows)?)?;
    write_atomic(&raw_jsonl, &to_jsonl(&rows)?)?;
    info!(rows = rows.len(), csv = %raw_csv.display(), "Wrote raw combined dataset");

    let clean: Vec<CleanRow> = rows
        .iter()
        .filter_map(|row| {
            let text = clean_for_model(row.combined_text.as_deref()?, options)?;
            (text.chars().count() >= options.min_clean_len).then(|| CleanRow::new(row, text))
        })
        .collect();

    let clean_header: Vec<&str> = COMBINE_COLUMNS
        .iter()
        .copied()
        .chain(["text_raw", "text_clean"])
        .collect();
    let clean_csv = out_dir.join(CLEAN_CSV);
    let clean_jsonl = out_dir.join(CLEAN_JSONL);
    write_atomic(&clean_csv, &to_csv(&clean_csv, &clean_header, &clean)?)?;
    write_atomic(&clean_jsonl, &to_jsonl(&clean)?)?;
    info!(
        rows = clean.len(),
        dropped = rows.len() - clean.len(),
        csv = %clean_csv.display(),
        "Wrote clean combined dataset"
    );

    Ok(CombineSummary {
        files_read,
        files_skipped,
        raw_rows: rows.len(),
        clean_rows: clean.len(),
        raw_csv,
        raw_jsonl,
        clean_csv,
        clean_jsonl,
    })
}

/// Read one CSV and project it onto [`COMBINE_COLUMNS`].
pub fn read_comments_csv(path: &Path) -> Result<Vec<CombinedRow>, HarvestError> {
    let csv_err = |e: csv::Error| HarvestError::Csv {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    reader
        .deserialize::<CombinedRow>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_err)
}

/// Light cleanup of combined text for transformer models.
///
/// Returns `None` when nothing but whitespace and boilerplate is left.
pub fn clean_for_model(text: &str, options: &CombineOptions) -> Option<String> {
    let s = RE_CONTROL_WS.replace_all(text, " ");
    let s = RE_SEE_ATTACHED.replace_all(&s, " ");
    let s = s
        .replace("[PDF_TEXT]", " ")
        .replace('•', " ")
        .replace('’', "'");
    let s = RE_WS.replace_all(&s, " ").trim().to_string();
    if s.is_empty() {
        return None;
    }

    let mut codes: Vec<String> = options
        .section_codes
        .iter()
        .map(|c| if options.lowercase { c.to_lowercase() } else { c.clone() })
        .collect();
    codes.sort_by_key(|c| std::cmp::Reverse(c.len()));

    let (mut s, section) = if options.lowercase {
        (s.to_lowercase(), "section")
    } else {
        (s, "[sS]ection")
    };
    for code in codes.iter().filter(|c| !c.is_empty()) {
        let escaped = regex::escape(code);
        for pattern in [format!(r"{section}\s*{escaped}"), format!(r"§\s*{escaped}")] {
            // Patterns are built from escaped input, so they always compile.
            if let Ok(re) = Regex::new(&pattern) {
                s = re.replace_all(&s, code.as_str()).into_owned();
            }
        }
    }

    (!s.is_empty()).then_some(s)
}

fn to_csv<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<Vec<u8>, HarvestError> {
    let csv_err = |e: csv::Error| HarvestError::Csv {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(header).map_err(csv_err)?;
    for row in rows {
        writer.serialize(row).map_err(csv_err)?;
    }
    writer
        .into_inner()
        .map_err(|e| csv_err(csv::Error::from(e.into_error())))
}

fn to_jsonl<T: Serialize>(rows: &[T]) -> Result<Vec<u8>, HarvestError> {
    let mut out = Vec::new();
    for row in rows {
        serde_json::to_writer(&mut out, row)
            .map_err(|e| HarvestError::Internal(format!("serialise row: {e}")))?;
        out.push(b'\n');
    }
    Ok(out)
}
