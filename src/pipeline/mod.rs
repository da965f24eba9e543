//! Pipeline stages for docket harvesting.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the network-facing pieces can be swapped for fakes.
//!
//! ## Data Flow
//!
//! ```text
//! paginate ──▶ http (list) ──▶ http (detail) ──▶ attachments ──▶ http (binary) ──▶ pdf ──▶ normalize
//! (driver)     (JSON, retry)   (JSON, retry)     (URL walk)      (degrade to [])   (lopdf)  (record)
//! ```
//!
//! 1. [`paginate`]    — page/item state machine, pauses, stop conditions
//! 2. [`http`]        — resilient GETs with one shared retry policy
//! 3. [`attachments`] — find PDF `fileFormats` URLs anywhere in a detail document
//! 4. [`pdf`]         — bounded text extraction on the blocking pool; never fails
//! 5. [`normalize`]   — merge list + detail views into one [`crate::CommentRecord`]

pub mod attachments;
pub mod http;
pub mod normalize;
pub mod paginate;
pub mod pdf;
