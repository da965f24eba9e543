//! Locate downloadable PDF attachments inside a detail document.
//!
//! The detail payload nests `fileFormats` arrays at varying depths depending
//! on the agency and the API version, so rather than pattern-matching one
//! shape the locator walks the whole tree and inspects every mapping that
//! carries a `fileFormats` key.

use crate::source::DetailDocument;
use indexmap::IndexMap;
use serde_json::{Map, Value};

/// One attachment URL with its inferred content type (lowercase).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentUrl {
    pub url: String,
    pub content_type: String,
}

/// Every PDF attachment URL in `doc`, deduplicated, in first-seen order.
///
/// `data` is scanned before each `included[*].attributes`.
pub fn locate_attachment_urls(doc: &DetailDocument) -> Vec<AttachmentUrl> {
    let mut found: IndexMap<String, String> = IndexMap::new();

    if let Some(data) = doc.0.get("data") {
        walk(data, &mut found);
    }
    for included in doc.included() {
        if let Some(attrs) = included.get("attributes") {
            walk(attrs, &mut found);
        }
    }

    found
        .into_iter()
        .map(|(url, content_type)| AttachmentUrl { url, content_type })
        .collect()
}

fn walk(value: &Value, found: &mut IndexMap<String, String>) {
    match value {
        Value::Object(map) => {
            if let Some(formats) = map.get("fileFormats") {
                collect_formats(formats, found);
            }
            for child in map.values() {
                walk(child, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, found);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}

fn collect_formats(formats: &Value, found: &mut IndexMap<String, String>) {
    let entries: &[Value] = match formats {
        Value::Array(items) => items.as_slice(),
        single @ Value::Object(_) => std::slice::from_ref(single),
        _ => return,
    };

    for entry in entries.iter().filter_map(Value::as_object) {
        if let Some((url, content_type)) = pdf_entry(entry) {
            found.entry(url).or_insert(content_type);
        }
    }
}

fn pdf_entry(entry: &Map<String, Value>) -> Option<(String, String)> {
    let url = first_str(entry, &["fileUrl", "url"])?;
    let kind = first_str(entry, &["fileType", "contentType"])
        .unwrap_or_default()
        .to_lowercase();

    if !is_pdf(&url, &kind) {
        return None;
    }
    let content_type = if kind.is_empty() { "pdf".to_string() } else { kind };
    Some((url, content_type))
}

/// First non-empty string among `keys`.
fn first_str(entry: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| entry.get(*k).and_then(Value::as_str))
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn is_pdf(url: &str, kind_lower: &str) -> bool {
    let url = url.to_lowercase();
    kind_lower.contains("pdf") || url.ends_with(".pdf") || url.contains("contenttype=pdf")
}
