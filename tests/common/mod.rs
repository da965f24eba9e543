//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use docket_harvest::{CommentSource, DetailDocument, HarvestError, ListPage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

/// Route library logs to the test harness; `RUST_LOG=docket_harvest=debug` shows them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ── PDFs ─────────────────────────────────────────────────────────────────

/// A valid PDF with one Helvetica text line per page.
pub fn pdf_with_pages(pages: &[&str]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in pages {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 700.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => pages.len() as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

// ── JSON payloads ────────────────────────────────────────────────────────

/// A list page body with the given items and `hasNextPage`.
pub fn list_body(items: Vec<Value>, has_next: Option<bool>) -> Value {
    let mut meta = json!({ "totalElements": items.len() });
    if let Some(next) = has_next {
        meta["hasNextPage"] = json!(next);
    }
    json!({ "data": items, "meta": meta })
}

pub fn list_item(id: &str, attributes: Value) -> Value {
    json!({ "id": id, "type": "comments", "attributes": attributes })
}

/// A detail body whose `included` carries one attachment per URL.
pub fn detail_body(attributes: Value, pdf_urls: &[&str]) -> Value {
    let included: Vec<Value> = pdf_urls
        .iter()
        .map(|u| {
            json!({
                "type": "attachments",
                "attributes": { "fileFormats": [ { "fileUrl": u, "format": "pdf" } ] }
            })
        })
        .collect();
    json!({ "data": { "attributes": attributes }, "included": included })
}

// ── In-memory comment source ─────────────────────────────────────────────

#[derive(Debug, Clone)]
enum DetailReply {
    Doc(Value),
    NetworkError,
}

/// Scripted [`CommentSource`] that records every call.
#[derive(Default)]
pub struct FakeSource {
    pages: HashMap<u32, Value>,
    failing_pages: HashSet<u32>,
    details: HashMap<String, DetailReply>,
    downloads: HashMap<String, Vec<u8>>,
    pub list_calls: Mutex<Vec<u32>>,
    pub detail_calls: Mutex<Vec<String>>,
    pub download_calls: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, n: u32, body: Value) -> Self {
        self.pages.insert(n, body);
        self
    }

    pub fn failing_page(mut self, n: u32) -> Self {
        self.failing_pages.insert(n);
        self
    }

    pub fn detail(mut self, id: &str, body: Value) -> Self {
        self.details.insert(id.to_string(), DetailReply::Doc(body));
        self
    }

    pub fn detail_error(mut self, id: &str) -> Self {
        self.details.insert(id.to_string(), DetailReply::NetworkError);
        self
    }

    pub fn download(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.downloads.insert(url.to_string(), bytes);
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn list_calls(&self) -> Vec<u32> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn detail_calls(&self) -> Vec<String> {
        self.detail_calls.lock().unwrap().clone()
    }

    pub fn download_calls(&self) -> Vec<String> {
        self.download_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommentSource for FakeSource {
    async fn list_page(
        &self,
        _docket_id: &str,
        _page_size: u32,
        page: u32,
    ) -> Result<ListPage, HarvestError> {
        self.list_calls.lock().unwrap().push(page);
        if self.failing_pages.contains(&page) {
            return Err(HarvestError::RateLimitExhausted {
                url: format!("fake://comments?page={page}"),
                attempts: 6,
            });
        }
        let body = self
            .pages
            .get(&page)
            .cloned()
            .unwrap_or_else(|| list_body(vec![], Some(false)));
        Ok(serde_json::from_value(body).unwrap())
    }

    async fn comment_detail(&self, comment_id: &str) -> Result<DetailDocument, HarvestError> {
        self.detail_calls.lock().unwrap().push(comment_id.to_string());
        match self.details.get(comment_id) {
            Some(DetailReply::Doc(v)) => Ok(DetailDocument(v.clone())),
            Some(DetailReply::NetworkError) => Err(HarvestError::Network {
                url: format!("fake://comments/{comment_id}"),
                reason: "connection reset by peer".into(),
            }),
            None => Ok(DetailDocument(json!({ "data": { "attributes": {} } }))),
        }
    }

    async fn download(&self, url: &str) -> Vec<u8> {
        self.download_calls.lock().unwrap().push(url.to_string());
        self.downloads.get(url).cloned().unwrap_or_default()
    }
}

// ── Loopback HTTP server ─────────────────────────────────────────────────

/// One canned HTTP response.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json(body: Value) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: serde_json::to_vec(&body).unwrap(),
        }
    }

    pub fn bytes(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type".into(), "application/pdf".into())],
            body,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: vec![],
            body: vec![],
        }
    }

    pub fn too_many(retry_after: Option<&str>) -> Self {
        let mut r = Self::status(429);
        if let Some(ra) = retry_after {
            r.headers.push(("Retry-After".into(), ra.into()));
        }
        r
    }
}

/// A request as seen by [`TestServer`]: request line plus lowercased headers.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub line: String,
    pub headers: Vec<(String, String)>,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Minimal HTTP/1.1 server answering queued replies in order, one per
/// connection. Unscripted requests get a 500.
pub struct TestServer {
    addr: SocketAddr,
    replies: Arc<Mutex<VecDeque<Reply>>>,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

impl TestServer {
    pub async fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let replies = Arc::new(Mutex::new(VecDeque::from(replies)));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let (q, s) = (Arc::clone(&replies), Arc::clone(&seen));
        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let (q, s) = (Arc::clone(&q), Arc::clone(&s));
                tokio::spawn(async move {
                    let Some(request) = read_head(&mut stream).await else {
                        return;
                    };
                    s.lock().unwrap().push(request);
                    let reply = q
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or_else(|| Reply::status(500));
                    let _ = stream.write_all(&encode(&reply)).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self { addr, replies, seen }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Queue more replies after start, e.g. once URLs are known.
    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

async fn read_head(stream: &mut tokio::net::TcpStream) -> Option<SeenRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let text = String::from_utf8_lossy(&buf);
    let mut lines = text.split("\r\n");
    let line = lines.next()?.to_string();
    let headers = lines
        .take_while(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    Some(SeenRequest { line, headers })
}

fn encode(reply: &Reply) -> Vec<u8> {
    let mut head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: close\r\n",
        reply.status,
        if reply.status < 400 { "OK" } else { "Error" },
        reply.body.len()
    );
    for (k, v) in &reply.headers {
        head.push_str(&format!("{k}: {v}\r\n"));
    }
    head.push_str("\r\n");
    let mut out = head.into_bytes();
    out.extend_from_slice(&reply.body);
    out
}
