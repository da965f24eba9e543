//! Error types for the docket-harvest library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`HarvestError`] — **Fatal**: the run cannot make progress (no API key,
//!   a list page could not be fetched after all retries, output could not be
//!   written). Returned as `Err(HarvestError)` from the top-level `harvest*`
//!   and `combine*` functions.
//!
//! * [`PdfError`] — **Non-fatal**: a single attachment could not be decoded
//!   (encrypted, corrupt, library panic). The extractor logs it and degrades
//!   to empty text so the comment and the rest of the page are unaffected.
//!
//! Detail-fetch failures reuse [`HarvestError`] but are caught by the
//! pagination driver and downgraded to "no detail" for that one comment.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docket-harvest library.
#[derive(Debug, Error)]
pub enum HarvestError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// No API key in the config and none in the environment.
    #[error("No regulations.gov API key configured.\nSet REGULATIONS_API_KEY or pass --api-key.")]
    MissingApiKey,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── HTTP errors ───────────────────────────────────────────────────────
    /// The server kept answering 429 after every allowed retry.
    #[error("Rate limit still exceeded after {attempts} attempts for '{url}'")]
    RateLimitExhausted { url: String, attempts: u32 },

    /// The server answered with a non-success status other than 429.
    #[error("HTTP {status} from '{url}'")]
    Http { url: String, status: u16 },

    /// Connection reset, DNS failure, TLS error, …
    #[error("Network error for '{url}': {reason}")]
    Network { url: String, reason: String },

    /// Request exceeded the configured timeout.
    #[error("Request timed out after {secs}s for '{url}'")]
    Timeout { url: String, secs: u64 },

    /// The body was received but is not the JSON shape we expect.
    #[error("Invalid JSON from '{url}': {reason}")]
    InvalidJson { url: String, reason: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write an output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A CSV file could not be read or written.
    #[error("CSV error for '{path}': {reason}")]
    Csv { path: PathBuf, reason: String },

    /// None of the files handed to `combine` could be read.
    #[error("No CSV files were successfully read")]
    NoInputFiles,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HarvestError {
    /// True for errors caused by the remote service or the network, as
    /// opposed to local configuration or I/O problems.
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            HarvestError::RateLimitExhausted { .. }
                | HarvestError::Http { .. }
                | HarvestError::Network { .. }
                | HarvestError::Timeout { .. }
                | HarvestError::InvalidJson { .. }
        )
    }
}

/// A non-fatal error for a single PDF attachment.
///
/// Never propagated past [`crate::pipeline::pdf::extract_text`]; kept as a
/// type so the "needs decryption support" case stays distinguishable in logs
/// and in [`crate::pipeline::pdf::try_extract_text`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PdfError {
    /// The document is encrypted and this extractor cannot decrypt it.
    #[error("PDF is encrypted and needs decryption support this extractor lacks")]
    EncryptionUnsupported,

    /// Header/xref/object stream could not be parsed.
    #[error("PDF could not be decoded: {0}")]
    Decode(String),

    /// The PDF library panicked on malformed input.
    #[error("PDF library panicked while decoding (malformed document)")]
    Panicked,
}
