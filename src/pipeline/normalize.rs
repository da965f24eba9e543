//! Merge a list item and its optional detail document into one record.
//!
//! ## Field resolution
//!
//! The detail view is richer and more current than the list view, so every
//! overlapping attribute is taken from the detail document when it carries a
//! meaningful value, and from the list item otherwise. "Meaningful" means
//! not null, not an empty string, not `false`/`0` and not an empty
//! collection. A failed detail fetch simply means every field falls back.
//!
//! ## Combined text
//!
//! ```text
//! <clean inline text>
//!
//! [PDF_TEXT]
//! <attachment text 1> ----- [PDF_SEP] ----- <attachment text 2>
//! ```
//!
//! Either half may be missing. When both are, the item has no content and
//! [`normalize_comment`] returns `None`.

use crate::output::CommentRecord;
use crate::pipeline::attachments::AttachmentUrl;
use crate::source::{DetailDocument, RawListItem};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;
use serde_json::{Map, Value};

/// Separator between the texts of several attachments.
pub const PDF_SEPARATOR: &str = "\n\n----- [PDF_SEP] -----\n\n";

/// Marker line placed before attachment text in the combined text.
pub const PDF_TEXT_MARKER: &str = "[PDF_TEXT]";

static RE_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").unwrap());

static RE_ATTACH: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)attach").unwrap());

/// Build the output record for one list item, or `None` if it has no text.
///
/// `attachments` are the located URLs (all of them, including those whose
/// download produced nothing) and `pdf_texts` the text extracted from each.
pub fn normalize_comment(
    item: &RawListItem,
    detail: Option<&DetailDocument>,
    attachments: &[AttachmentUrl],
    pdf_texts: &[String],
) -> Option<CommentRecord> {
    let list = &item.attributes;
    let empty = Map::new();
    let detail_attrs = detail.and_then(DetailDocument::attributes).unwrap_or(&empty);

    let raw_comment_html = inline_comment(list)
        .or_else(|| inline_comment(detail_attrs))
        .unwrap_or_default();
    let clean_comment_html = clean_comment_html(&raw_comment_html);

    let pdf_text = join_pdf_texts(pdf_texts);
    let combined_text = combine_text(&clean_comment_html, &pdf_text);
    if combined_text.is_empty() {
        return None;
    }

    let hint_source = [
        list.get("title").and_then(text_of).unwrap_or_default(),
        detail_attrs.get("title").and_then(text_of).unwrap_or_default(),
        clean_comment_html.clone(),
    ]
    .join(" ");

    let field = |key: &str| resolve(detail_attrs, list, key);

    Some(CommentRecord {
        comment_id: item.id.clone(),
        agency_id: field("agencyId"),
        docket_id: field("docketId"),
        document_id: field("documentId"),
        comment_on_id: field("commentOnId"),
        document_type: field("documentType"),
        posted_date: field("postedDate"),
        receive_date: field("receiveDate"),
        title: field("title"),
        tracking_nbr: field("trackingNbr"),
        organization_name: field("organization"),
        first_name: field("firstName"),
        last_name: field("lastName"),
        city: field("city"),
        state_province_region: field("stateProvinceRegion"),
        country: field("country"),
        withdrawn: resolve_flag(detail_attrs, list, "withdrawn"),
        restrict_reason_type: field("restrictReasonType"),
        restrict_reason: field("restrictReason"),
        raw_comment_html,
        clean_comment_html,
        pdf_text,
        combined_text,
        pdf_urls: attachments
            .iter()
            .map(|a| a.url.as_str())
            .collect::<Vec<_>>()
            .join(";"),
        has_see_attached_hint: RE_ATTACH.is_match(&hint_source),
    })
}

/// Strip tags, decode entities, collapse whitespace.
pub fn clean_comment_html(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }
    let text = RE_TAG.replace_all(raw, " ");
    let text = decode_entities(&text);
    collapse_whitespace(&text)
}

/// Collapse every run of Unicode whitespace to one space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode HTML character references the way a browser does.
///
/// Covers the full HTML5 named set, legacy names without a trailing `;`
/// (`caf&eacute`) and the cp1252 remapping of C1 numeric references
/// (`&#151;` is an em dash). Unknown references are left untouched.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    // Escape `<` so the tokenizer sees one text run and no markup.
    let fragment = Html::parse_fragment(&text.replace('<', "&lt;"));
    fragment.root_element().text().collect()
}

/// Non-empty attachment texts joined with [`PDF_SEPARATOR`], then collapsed.
pub fn join_pdf_texts(texts: &[String]) -> String {
    let kept: Vec<&str> = texts
        .iter()
        .map(String::as_str)
        .filter(|t| !t.is_empty())
        .collect();
    if kept.is_empty() {
        return String::new();
    }
    collapse_whitespace(&kept.join(PDF_SEPARATOR))
}

fn combine_text(clean_inline: &str, pdf_text: &str) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(2);
    if !clean_inline.is_empty() {
        parts.push(clean_inline.to_string());
    }
    if !pdf_text.is_empty() {
        parts.push(format!("{PDF_TEXT_MARKER}\n{pdf_text}"));
    }
    parts.join("\n\n").trim().to_string()
}

/// `comment`, else `commentText`, as long as one of them is non-empty.
fn inline_comment(attrs: &Map<String, Value>) -> Option<String> {
    ["comment", "commentText"]
        .iter()
        .filter_map(|k| attrs.get(*k))
        .filter(|v| truthy(v))
        .find_map(text_of)
}

fn resolve(detail: &Map<String, Value>, list: &Map<String, Value>, key: &str) -> Option<String> {
    detail
        .get(key)
        .filter(|v| truthy(v))
        .or_else(|| list.get(key).filter(|v| truthy(v)))
        .and_then(text_of)
}

fn resolve_flag(detail: &Map<String, Value>, list: &Map<String, Value>, key: &str) -> Option<bool> {
    let flag = |m: &Map<String, Value>| m.get(key).and_then(Value::as_bool);
    flag(detail).filter(|b| *b).or_else(|| flag(list))
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn text_of(v: &Value) -> Option<String> {
    match v {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
