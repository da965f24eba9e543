//! The three API views the pagination driver needs, behind one trait.
//!
//! [`RegulationsApi`] talks to regulations.gov v4 through the resilient
//! [`ApiClient`]. Tests and offline replays implement [`CommentSource`]
//! themselves and inject it with
//! [`crate::config::HarvestConfigBuilder::source`].

use crate::config::{ApiKey, HarvestConfig};
use crate::error::HarvestError;
use crate::pipeline::http::ApiClient;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

/// One entry of a comment-list page.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawListItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Pagination metadata from the list endpoint. Every field may be missing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total_elements: Option<u64>,
    pub total_pages: Option<u64>,
    pub has_next_page: Option<bool>,
}

/// A decoded list response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListPage {
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<RawListItem>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: PageMeta,
}

fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + DeserializeOwned,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// The per-comment detail payload, kept as raw JSON for the attachment walk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailDocument(pub Value);

impl DetailDocument {
    /// `data.attributes`, if the payload has one.
    pub fn attributes(&self) -> Option<&Map<String, Value>> {
        self.0.get("data")?.get("attributes")?.as_object()
    }

    /// The `included` array, or an empty slice.
    pub fn included(&self) -> &[Value] {
        self.0
            .get("included")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl From<Value> for DetailDocument {
    fn from(v: Value) -> Self {
        Self(v)
    }
}

/// Source of list pages, detail documents and attachment bytes.
#[async_trait]
pub trait CommentSource: Send + Sync {
    /// Fetch one page of the docket's comment list.
    async fn list_page(
        &self,
        docket_id: &str,
        page_size: u32,
        page: u32,
    ) -> Result<ListPage, HarvestError>;

    /// Fetch the detail document for one comment, including attachments.
    async fn comment_detail(&self, comment_id: &str) -> Result<DetailDocument, HarvestError>;

    /// Download an attachment. Failures yield an empty vec.
    async fn download(&self, url: &str) -> Vec<u8>;
}

/// [`CommentSource`] backed by the regulations.gov v4 REST API.
pub struct RegulationsApi {
    client: ApiClient,
    base_url: String,
}

impl RegulationsApi {
    pub fn new(client: ApiClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &HarvestConfig) -> Result<Self, HarvestError> {
        Ok(Self::new(ApiClient::from_config(config)?, &config.base_url))
    }

    fn list_url(&self) -> String {
        format!("{}/comments", self.base_url)
    }

    fn detail_url(&self, comment_id: &str) -> String {
        format!("{}/comments/{}", self.base_url, comment_id)
    }
}

#[async_trait]
impl CommentSource for RegulationsApi {
    async fn list_page(
        &self,
        docket_id: &str,
        page_size: u32,
        page: u32,
    ) -> Result<ListPage, HarvestError> {
        let url = self.list_url();
        let query = [
            ("filter[docketId]", docket_id.to_string()),
            ("page[size]", page_size.to_string()),
            ("page[number]", page.to_string()),
        ];
        let value = self.client.fetch_json(&url, &query).await?;
        serde_json::from_value(value).map_err(|e| HarvestError::InvalidJson {
            url,
            reason: e.to_string(),
        })
    }

    async fn comment_detail(&self, comment_id: &str) -> Result<DetailDocument, HarvestError> {
        let url = self.detail_url(comment_id);
        let query = [("include", "attachments".to_string())];
        self.client
            .fetch_json(&url, &query)
            .await
            .map(DetailDocument)
    }

    async fn download(&self, url: &str) -> Vec<u8> {
        self.client.fetch_binary(url).await
    }
}

/// Resolve the comment source, from most-specific to least-specific.
///
/// 1. **Injected source** (`config.source`) used as-is.
/// 2. **Configured key** (`config.api_key`) for a [`RegulationsApi`].
/// 3. **Environment** (`REGULATIONS_API_KEY`).
///
/// # Errors
/// [`HarvestError::MissingApiKey`] when no source and no key is available.
pub fn resolve_source(config: &HarvestConfig) -> Result<Arc<dyn CommentSource>, HarvestError> {
    if let Some(ref source) = config.source {
        return Ok(Arc::clone(source));
    }

    let key = config
        .api_key
        .clone()
        .or_else(ApiKey::from_env)
        .ok_or(HarvestError::MissingApiKey)?;

    let mut config = config.clone();
    config.api_key = Some(key);
    Ok(Arc::new(RegulationsApi::from_config(&config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn list_page_decodes_sparse_meta() {
        let page: ListPage = serde_json::from_value(json!({
            "data": [
                {"id": "IRS-2022-0029-0001", "attributes": {"title": "Comment"}},
                {"id": "IRS-2022-0029-0002"}
            ],
            "meta": {"totalElements": 1200, "hasNextPage": true}
        }))
        .unwrap();

        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].attributes["title"], "Comment");
        assert!(page.data[1].attributes.is_empty());
        assert_eq!(page.meta.total_elements, Some(1200));
        assert_eq!(page.meta.has_next_page, Some(true));
        assert_eq!(page.meta.total_pages, None);
    }

    #[test]
    fn list_page_tolerates_null_and_missing_sections() {
        let page: ListPage = serde_json::from_value(json!({"data": null})).unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.meta.has_next_page, None);
    }

    #[test]
    fn detail_document_accessors() {
        let doc = DetailDocument(json!({
            "data": {"id": "X", "attributes": {"comment": "hi"}},
            "included": [{"attributes": {}}]
        }));
        assert_eq!(doc.attributes().unwrap()["comment"], "hi");
        assert_eq!(doc.included().len(), 1);

        let bare = DetailDocument(json!({"data": {}}));
        assert!(bare.attributes().is_none());
        assert!(bare.included().is_empty());
    }

    #[test]
    fn endpoint_urls() {
        let client = ApiClient::new(ApiKey::new("K"), Default::default()).unwrap();
        let api = RegulationsApi::new(client, "https://api.regulations.gov/v4/");
        assert_eq!(api.list_url(), "https://api.regulations.gov/v4/comments");
        assert_eq!(
            api.detail_url("IRS-2022-0029-0007"),
            "https://api.regulations.gov/v4/comments/IRS-2022-0029-0007"
        );
    }

    #[test]
    fn injected_source_wins() {
        struct Empty;

        #[async_trait]
        impl CommentSource for Empty {
            async fn list_page(&self, _: &str, _: u32, _: u32) -> Result<ListPage, HarvestError> {
                Ok(ListPage::default())
            }
            async fn comment_detail(&self, _: &str) -> Result<DetailDocument, HarvestError> {
                Ok(DetailDocument::default())
            }
            async fn download(&self, _: &str) -> Vec<u8> {
                Vec::new()
            }
        }

        let injected: Arc<dyn CommentSource> = Arc::new(Empty);
        let config = HarvestConfig::builder()
            .docket_id("D")
            .source(Arc::clone(&injected))
            .build()
            .unwrap();
        let resolved = resolve_source(&config).unwrap();
        assert!(Arc::ptr_eq(&resolved, &injected));
    }
}
