//! Shared test support: a recording in-memory storage API double and a
//! Range-aware mock data server.

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use remotefile::{
    ClientConfig, FileDescribe, FileState, NewFile, Result, StorageApi, TransferUrl,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Storage API double that records calls and mints transfer URLs pointing
/// at a wiremock server.
///
/// Part upload URLs are `{base}/parts/{file_id}/{index}`; the download URL
/// is `{base}/data`. `file_close` flips the remote state to closed
/// immediately, standing in for a service that finalizes fast.
pub struct RecordingApi {
    base: String,
    pub size: AtomicI64,
    pub state: Mutex<FileState>,
    pub new_calls: AtomicUsize,
    pub close_calls: AtomicUsize,
    pub describe_calls: AtomicUsize,
    pub download_calls: AtomicUsize,
    pub upload_requests: Mutex<Vec<(String, u32)>>,
    pub new_params: Mutex<Vec<serde_json::Value>>,
    next_id: AtomicUsize,
}

impl RecordingApi {
    pub fn new(base: &str, size: i64, state: FileState) -> Arc<Self> {
        Arc::new(RecordingApi {
            base: base.trim_end_matches('/').to_string(),
            size: AtomicI64::new(size),
            state: Mutex::new(state),
            new_calls: AtomicUsize::new(0),
            close_calls: AtomicUsize::new(0),
            describe_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            upload_requests: Mutex::new(Vec::new()),
            new_params: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        })
    }
}

#[async_trait]
impl StorageApi for RecordingApi {
    async fn file_new(&self, params: serde_json::Value) -> Result<NewFile> {
        self.new_calls.fetch_add(1, Ordering::SeqCst);
        self.new_params.lock().push(params);
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(NewFile {
            id: format!("file-{:04}", n),
        })
    }

    async fn file_download(&self, _id: &str) -> Result<TransferUrl> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        Ok(TransferUrl {
            url: format!("{}/data", self.base),
        })
    }

    async fn file_upload(&self, id: &str, index: u32) -> Result<TransferUrl> {
        self.upload_requests.lock().push((id.to_string(), index));
        Ok(TransferUrl {
            url: format!("{}/parts/{}/{}", self.base, id, index),
        })
    }

    async fn file_close(&self, _id: &str) -> Result<()> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        *self.state.lock() = FileState::Closed;
        Ok(())
    }

    async fn describe(&self, id: &str) -> Result<FileDescribe> {
        self.describe_calls.fetch_add(1, Ordering::SeqCst);
        Ok(FileDescribe {
            id: id.to_string(),
            project: None,
            size: self.size.load(Ordering::SeqCst),
            state: *self.state.lock(),
        })
    }

    async fn clone_into(&self, _id: &str, _project: &str, _folder: &str) -> Result<()> {
        Ok(())
    }
}

/// Config tuned for tests: tiny backoff, short timeout
pub fn test_config(max_part_size: usize) -> ClientConfig {
    ClientConfig {
        max_part_size,
        max_http_attempts: 3,
        retry_base_delay_ms: 1,
        request_timeout_secs: 10,
        ..ClientConfig::default()
    }
}

/// Accept part uploads: 200 for every POST under /parts/
pub async fn mount_part_sink(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/parts/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// Reconstruct the uploaded parts of `file_id` from the mock server's
/// request log, keyed by part index.
pub async fn collect_parts(
    server: &MockServer,
    file_id: &str,
) -> std::collections::BTreeMap<u32, Vec<u8>> {
    let prefix = format!("/parts/{}/", file_id);
    let mut parts = std::collections::BTreeMap::new();
    for request in server.received_requests().await.unwrap_or_default() {
        if request.method.as_str() != "POST" {
            continue;
        }
        let path = request.url.path();
        if let Some(index) = path.strip_prefix(&prefix) {
            if let Ok(index) = index.parse::<u32>() {
                parts.insert(index, request.body.clone());
            }
        }
    }
    parts
}

/// Parse a `bytes=a-b` Range header
fn parse_range(header: &str) -> Option<(u64, u64)> {
    let value = header.strip_prefix("bytes=")?;
    let (start, end) = value.split_once('-')?;
    Some((start.trim().parse().ok()?, end.trim().parse().ok()?))
}

/// Serve `content` at GET /data with 206 responses honoring the Range
/// header.
///
/// `delays` maps a range start offset to a response delay in milliseconds,
/// for forcing out-of-order completion. `max_body` truncates every
/// response body, simulating a server that answers ranges short.
pub async fn mount_range_responder(
    server: &MockServer,
    content: Vec<u8>,
    delays: Vec<(u64, u64)>,
    max_body: Option<usize>,
) {
    let delays: HashMap<u64, u64> = delays.into_iter().collect();
    Mock::given(method("GET"))
        .and(path("/data"))
        .respond_with(move |request: &wiremock::Request| {
            let header = request
                .headers
                .get("range")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("");
            let (start, end) = match parse_range(header) {
                Some(range) => range,
                None => return ResponseTemplate::new(416),
            };
            if content.is_empty() || start >= content.len() as u64 {
                return ResponseTemplate::new(416);
            }
            let end = end.min(content.len() as u64 - 1);
            let mut body = content[start as usize..=end as usize].to_vec();
            if let Some(max) = max_body {
                body.truncate(max);
            }
            let mut template = ResponseTemplate::new(206).set_body_bytes(body);
            if let Some(ms) = delays.get(&start) {
                template = template.set_delay(Duration::from_millis(*ms));
            }
            template
        })
        .mount(server)
        .await;
}
