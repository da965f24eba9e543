//! # docket-harvest
//!
//! Harvest public comments, including the text of their PDF attachments,
//! from regulations.gov dockets into a flat corpus ready for NLP.
//!
//! ## Why this crate?
//!
//! The regulations.gov list endpoint only returns a comment's inline text.
//! Many submissions are a one-line "see attached file(s)" with the actual
//! argument in a PDF that is only reachable through the per-comment detail
//! view. This crate walks a docket page by page, follows every comment into
//! its detail document, downloads each PDF attachment and folds its text into
//! one `combinedText` field, all under the API's hourly rate limit.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Docket
//!  │
//!  ├─ 1. List      GET /comments?filter[docketId]=… (retry on 429)
//!  ├─ 2. Detail    GET /comments/{id}?include=attachments (failure → list data only)
//!  ├─ 3. Locate    walk the detail JSON for PDF fileFormats URLs
//!  ├─ 4. Download  GET each attachment (failure → empty bytes)
//!  ├─ 5. Extract   lopdf text, ≤ 20 pages, on spawn_blocking (failure → "")
//!  ├─ 6. Normalize merge list + detail, build combinedText, drop empty items
//!  └─ 7. Output    JSON array + fixed-column CSV
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docket_harvest::{harvest, HarvestConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key read from REGULATIONS_API_KEY when not set here
//!     let config = HarvestConfig::builder()
//!         .docket_id("IRS-2022-0029")
//!         .pages(1, Some(2))
//!         .build()?;
//!     let output = harvest(&config).await?;
//!     println!("{} records", output.records.len());
//!     eprintln!("dropped {} empty items, {} detail failures",
//!         output.stats.items_dropped,
//!         output.stats.detail_failures);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docket-harvest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! docket-harvest = { version = "0.1", default-features = false }
//! ```
//!
//! ## Rate Limits
//!
//! A regulations.gov key allows roughly 1,000 requests per hour. Each comment
//! costs one detail request plus one download per attachment, so the default
//! pauses (300 ms per detail, 100 ms per attachment, 500 ms per page) are
//! deliberately conservative. Bursts past the quota are absorbed by the
//! retry policy in [`pipeline::http`].

// ── Modules ──────────────────────────────────────────────────────────────

pub mod combine;
pub mod config;
pub mod error;
pub mod harvest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod source;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use combine::{clean_for_model, combine_files, CombineOptions, CombineSummary};
pub use config::{ApiKey, HarvestConfig, HarvestConfigBuilder};
pub use error::{HarvestError, PdfError};
pub use harvest::{harvest, harvest_sync, harvest_to_dir};
pub use output::{CommentRecord, HarvestOutput, HarvestStats, OutputPaths, StopReason};
pub use pipeline::attachments::{locate_attachment_urls, AttachmentUrl};
pub use pipeline::http::{ApiClient, RetryPolicy};
pub use pipeline::normalize::normalize_comment;
pub use pipeline::pdf::{extract_text, try_extract_text};
pub use progress::{HarvestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use source::{CommentSource, DetailDocument, ListPage, PageMeta, RawListItem, RegulationsApi};
