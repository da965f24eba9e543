//! PDF attachment → plain text.
//!
//! Attachments come from thousands of different submitters and a fair share
//! of them are scanned images, password-protected, truncated mid-download or
//! simply not PDFs. None of that may stop the harvest, so the public entry
//! point [`extract_text`] never fails: every problem degrades to `""` and a
//! `warn!` line. [`try_extract_text`] exposes the typed failure for callers
//! that want to tell "encrypted" apart from "corrupt".
//!
//! Encrypted documents are first opened with the empty user password, which
//! covers the common print-restricted case. Only documents that need a real
//! password or a cipher lopdf cannot handle are reported as
//! [`PdfError::EncryptionUnsupported`].
//!
//! ## Why spawn_blocking?
//!
//! Parsing and content-stream decoding are CPU-bound and can take hundreds
//! of milliseconds on large attachments, so [`extract_text_async`] moves the
//! work off the Tokio worker threads.

use crate::error::PdfError;
use crate::pipeline::normalize::collapse_whitespace;
use lopdf::Document;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{debug, warn};

/// Default number of pages read from each attachment.
pub const DEFAULT_MAX_PAGES: usize = 20;

/// Extract at most `max_pages` pages of text, or `""` on any failure.
pub fn extract_text(bytes: &[u8], max_pages: usize) -> String {
    match try_extract_text(bytes, max_pages) {
        Ok(text) => text,
        Err(e) => {
            warn!(bytes = bytes.len(), error = %e, "PDF text extraction failed");
            String::new()
        }
    }
}

/// Fallible core of [`extract_text`].
///
/// Empty input is not an error and yields `Ok("")`. Pages that fail on their
/// own contribute an empty string but still count towards `max_pages`.
pub fn try_extract_text(bytes: &[u8], max_pages: usize) -> Result<String, PdfError> {
    if bytes.is_empty() {
        return Ok(String::new());
    }

    catch_unwind(AssertUnwindSafe(|| extract_pages(bytes, max_pages)))
        .unwrap_or(Err(PdfError::Panicked))
}

/// [`extract_text`] on the blocking thread pool.
pub async fn extract_text_async(bytes: Vec<u8>, max_pages: usize) -> String {
    match tokio::task::spawn_blocking(move || extract_text(&bytes, max_pages)).await {
        Ok(text) => text,
        Err(e) => {
            warn!(error = %e, "PDF extraction task failed");
            String::new()
        }
    }
}

fn extract_pages(bytes: &[u8], max_pages: usize) -> Result<String, PdfError> {
    let mut doc = Document::load_mem(bytes).map_err(|e| classify_load_error(&e.to_string()))?;
    if doc.is_encrypted() {
        // Owner-password-only documents open with the empty user password.
        doc.decrypt("").map_err(|e| {
            debug!(error = %e, "PDF needs a user password or an unsupported cipher");
            PdfError::EncryptionUnsupported
        })?;
    }

    let page_numbers: Vec<u32> = doc.get_pages().keys().copied().take(max_pages).collect();
    debug!(pages = page_numbers.len(), "Extracting PDF text");

    let texts: Vec<String> = page_numbers
        .iter()
        .map(|&n| match doc.extract_text(&[n]) {
            Ok(text) => text,
            Err(e) => {
                debug!(page = n, error = %e, "Skipping unreadable PDF page");
                String::new()
            }
        })
        .collect();

    Ok(collapse_whitespace(&texts.join("\n\n")))
}

fn classify_load_error(message: &str) -> PdfError {
    let lower = message.to_lowercase();
    if lower.contains("encrypt") || lower.contains("decrypt") || lower.contains("password") {
        PdfError::EncryptionUnsupported
    } else {
        PdfError::Decode(message.to_string())
    }
}
