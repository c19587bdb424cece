//! Remote file handle
//!
//! [`RemoteFile`] is the client-side handle for one remote file object.
//! A file moves through three phases: open (accepting `write`), closing,
//! and closed (accepting `read`, `seek`, and linear queries). The handle
//! buffers written bytes into parts, feeds them to a worker pool through a
//! bounded queue, and on the read side offers both random-access reads and
//! the ordered parallel download of [`start_linear_query`].
//!
//! The handle itself is driven by a single caller; the workers it spawns
//! only touch the queue, the shared counters, and their own HTTP requests.
//!
//! [`start_linear_query`]: RemoteFile::start_linear_query

use crate::api::StorageApi;
use crate::config::ClientConfig;
use crate::download::LinearQuery;
use crate::error::{FileError, Result};
use crate::http::{RetryingClient, RetryPolicy};
use crate::metrics::{MetricsSnapshot, TransferMetrics};
use crate::models::{ByteRange, FileState, PartJob};
use crate::upload::UploadPool;
use bytes::BytesMut;
use http::header::RANGE;
use http::{HeaderMap, HeaderValue, Method};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

/// Client-side handle for a remote file object
pub struct RemoteFile {
    api: Arc<dyn StorageApi>,
    http: RetryingClient,
    config: ClientConfig,
    metrics: Arc<TransferMetrics>,

    file_id: String,
    project: Option<String>,

    /// Absolute offset of the next random read
    pos: u64,
    /// Total size in bytes, unknown until first learned via describe
    length: Option<u64>,
    /// Set when a read has reached end of file
    eof: bool,
    /// Monotonic: once true, never false again for this binding
    closed: bool,
    /// Bytes transferred by the most recent read
    gcount: usize,

    /// Part accumulator; cut into an upload job at `max_part_size`
    buffer: BytesMut,
    /// 1-based index assigned to the next produced part
    next_part: u32,
    pool: Option<UploadPool>,
    query: Option<LinearQuery>,
}

impl std::fmt::Debug for RemoteFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFile")
            .field("file_id", &self.file_id)
            .field("project", &self.project)
            .field("pos", &self.pos)
            .field("length", &self.length)
            .field("eof", &self.eof)
            .field("closed", &self.closed)
            .field("gcount", &self.gcount)
            .field("next_part", &self.next_part)
            .finish_non_exhaustive()
    }
}

impl RemoteFile {
    /// Open a handle onto an existing file object
    pub fn open(
        api: Arc<dyn StorageApi>,
        config: ClientConfig,
        file_id: impl Into<String>,
    ) -> Result<Self> {
        Self::open_in_project(api, config, file_id, None)
    }

    /// Open a handle onto an existing file object in a specific project
    pub fn open_in_project(
        api: Arc<dyn StorageApi>,
        config: ClientConfig,
        file_id: impl Into<String>,
        project: Option<String>,
    ) -> Result<Self> {
        config.validate()?;
        let metrics = Arc::new(TransferMetrics::new());
        let http = RetryingClient::new(
            RetryPolicy::with_base_delay(config.max_http_attempts, config.retry_base_delay()),
            config.request_timeout(),
            metrics.clone(),
        )?;

        Ok(RemoteFile {
            api,
            http,
            config,
            metrics,
            file_id: file_id.into(),
            project,
            pos: 0,
            length: None,
            eof: false,
            closed: false,
            gcount: 0,
            buffer: BytesMut::new(),
            next_part: 1,
            pool: None,
            query: None,
        })
    }

    /// Allocate a new remote file object and bind a handle to it.
    ///
    /// `fields` may carry service-specific creation fields; a `project` is
    /// taken from `fields`, else from the configuration. A non-empty
    /// `media_type` is forwarded as the object's media type.
    pub async fn create(
        api: Arc<dyn StorageApi>,
        config: ClientConfig,
        media_type: &str,
        fields: Value,
    ) -> Result<Self> {
        let mut handle = Self::open(api, config, String::new())?;
        handle.create_internal(media_type, fields).await?;
        Ok(handle)
    }

    async fn create_internal(&mut self, media_type: &str, fields: Value) -> Result<()> {
        let mut params = match fields {
            Value::Object(map) => Value::Object(map),
            Value::Null => json!({}),
            other => {
                return Err(FileError::Api(format!(
                    "creation fields must be a JSON object, got {}",
                    other
                )))
            }
        };

        if params.get("project").is_none() {
            if let Some(project) = &self.config.project {
                params["project"] = json!(project);
            }
        }
        if !media_type.is_empty() {
            params["media"] = json!(media_type);
        }

        let project = params
            .get("project")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let created = self.api.file_new(params).await?;
        info!("created remote file {}", created.id);
        self.set_ids(created.id, project).await
    }

    /// Rebind the handle to a different file object.
    ///
    /// Halts any linear query, flushes pending writes to the old binding,
    /// then resets position, length, buffers, and counters before taking
    /// the new identity.
    pub async fn set_ids(
        &mut self,
        file_id: impl Into<String>,
        project: Option<String>,
    ) -> Result<()> {
        self.stop_linear_query().await;
        self.flush().await?;
        self.reset_internals();
        self.file_id = file_id.into();
        self.project = project;
        Ok(())
    }

    fn reset_internals(&mut self) {
        self.pos = 0;
        self.length = None;
        self.eof = false;
        self.closed = false;
        self.gcount = 0;
        self.buffer = BytesMut::new();
        self.next_part = 1;
        self.pool = None;
        self.query = None;
    }

    /// Opaque id of the bound file object
    pub fn id(&self) -> &str {
        &self.file_id
    }

    /// Project the handle is bound to, if any
    pub fn project(&self) -> Option<&str> {
        self.project.as_deref()
    }

    /// Counters accumulated by this handle's transfers
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // ---------------------------------------------------------------
    // Write path
    // ---------------------------------------------------------------

    /// Append bytes to the file.
    ///
    /// Data accumulates in the part buffer; every time the buffer reaches
    /// `max_part_size` it is cut into a part and queued for upload, so a
    /// single call may produce several parts. The call waits only when all
    /// upload workers are busy and the queue is full.
    pub async fn write(&mut self, mut data: &[u8]) -> Result<()> {
        if self.closed {
            return Err(FileError::precondition(
                "cannot write to a file that has been closed",
            ));
        }
        if let Some(pool) = &self.pool {
            if let Some(fault) = pool.fault() {
                return Err(fault);
            }
        }

        loop {
            let remaining = self.config.max_part_size - self.buffer.len();
            if data.len() < remaining {
                self.buffer.extend_from_slice(data);
                return Ok(());
            }

            self.buffer.extend_from_slice(&data[..remaining]);
            data = &data[remaining..];
            self.dispatch_part().await?;
        }
    }

    /// Cut the buffer's current contents into a part and queue it
    async fn dispatch_part(&mut self) -> Result<()> {
        self.ensure_pool();
        let part = PartJob {
            bytes: std::mem::take(&mut self.buffer).freeze(),
            index: self.next_part,
        };
        self.next_part += 1;
        debug!(
            "queueing part {} of {} ({} bytes)",
            part.index,
            self.file_id,
            part.bytes.len()
        );
        if let Some(pool) = &self.pool {
            pool.produce(part).await?;
        }
        Ok(())
    }

    /// Spawn the worker pool if this binding does not have one yet
    fn ensure_pool(&mut self) {
        if self.pool.is_none() {
            self.pool = Some(UploadPool::spawn(
                self.api.clone(),
                self.http.clone(),
                self.file_id.clone(),
                self.config.max_write_workers,
                self.metrics.clone(),
            ));
        }
    }

    /// Upload any buffered residue as a final short part and wait until
    /// every queued part has been uploaded.
    ///
    /// The worker pool is torn down; a later `write` starts a fresh one.
    /// A fault recorded by any worker is re-raised here, after the joins.
    pub async fn flush(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.dispatch_part().await?;
        }

        let result = match self.pool.take() {
            Some(pool) => pool.join_all().await,
            None => Ok(()),
        };
        self.buffer = BytesMut::new();
        result
    }

    /// Flush pending writes and ask the service to close the object.
    ///
    /// With `block`, waits until the remote state reaches closed. Closing
    /// an already-closed handle is a no-op.
    pub async fn close(&mut self, block: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush().await?;
        self.api.file_close(&self.file_id).await?;
        if block {
            self.api
                .wait_on_state(&self.file_id, FileState::Closed)
                .await?;
        }
        self.closed = true;
        info!("closed remote file {}", self.file_id);
        Ok(())
    }

    /// Wait until the remote state reaches closed
    pub async fn wait_on_close(&mut self) -> Result<()> {
        self.api
            .wait_on_state(&self.file_id, FileState::Closed)
            .await?;
        self.closed = true;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Random read path
    // ---------------------------------------------------------------

    /// Read up to `buf.len()` bytes at the current position.
    ///
    /// Issues one ranged GET against a fresh pre-signed URL and advances
    /// the position past the requested range. Returns the byte count, also
    /// available as [`gcount`](Self::gcount) afterwards. A read whose range
    /// touches the last byte sets [`eof`](Self::eof); once the position is
    /// at or past the end, reads return 0 without issuing the GET.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.gcount = 0;
        let download = self.api.file_download(&self.file_id).await?;

        let length = match self.length {
            Some(length) => length,
            None => {
                let desc = self.api.describe(&self.file_id).await?;
                let length = desc.size_bytes();
                self.length = Some(length);
                length
            }
        };

        if self.pos >= length || buf.is_empty() {
            return Ok(0);
        }

        let endbyte = (length - 1).min(self.pos + buf.len() as u64 - 1);
        if endbyte == length - 1 {
            self.eof = true;
        }
        let range = ByteRange::new(self.pos, endbyte)?;
        self.pos = endbyte + 1;

        let mut headers = HeaderMap::new();
        headers.insert(
            RANGE,
            HeaderValue::from_str(&range.to_header())
                .map_err(|e| FileError::InvalidRange(e.to_string()))?,
        );
        let response = self
            .http
            .invoke(Method::GET, &download.url, headers, None)
            .await?;

        let count = response.body.len().min(buf.len());
        buf[..count].copy_from_slice(&response.body[..count]);
        self.gcount = count;
        Ok(count)
    }

    /// Bytes transferred by the most recent read
    pub fn gcount(&self) -> usize {
        self.gcount
    }

    /// Whether a read has reached end of file
    pub fn eof(&self) -> bool {
        self.eof
    }

    /// Move the read position. Requires a closed file.
    pub async fn seek(&mut self, pos: u64) -> Result<()> {
        if !self.is_closed().await? {
            return Err(FileError::precondition(
                "cannot seek while the file is not in the closed state",
            ));
        }
        self.pos = pos;
        if self.length.is_some_and(|length| pos < length) {
            self.eof = false;
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Linear query
    // ---------------------------------------------------------------

    /// Start an ordered parallel download of `[start, start + num_bytes)`.
    ///
    /// `None` for `start` means from the first byte; `None` for
    /// `num_bytes` means through the end of the file. `chunk_size` is the
    /// bytes each worker claims per range, `max_chunks` bounds the reorder
    /// buffer, and `worker_count` sets the fetch parallelism. Requires a
    /// closed file; any prior query on this handle is stopped first.
    pub async fn start_linear_query(
        &mut self,
        start: Option<u64>,
        num_bytes: Option<u64>,
        chunk_size: u64,
        max_chunks: usize,
        worker_count: usize,
    ) -> Result<()> {
        if !self.is_closed().await? {
            return Err(FileError::precondition(
                "cannot start a linear query while the file is not in the closed state",
            ));
        }
        if chunk_size == 0 {
            return Err(FileError::InvalidRange(
                "chunk_size must be at least 1".into(),
            ));
        }
        if max_chunks == 0 || worker_count == 0 {
            return Err(FileError::InvalidRange(
                "max_chunks and worker_count must be at least 1".into(),
            ));
        }

        self.stop_linear_query().await;

        let query_start = start.unwrap_or(0);
        let query_end = match num_bytes {
            Some(n) => query_start + n,
            None => self.api.describe(&self.file_id).await?.size_bytes(),
        };
        let download = self.api.file_download(&self.file_id).await?;

        self.query = Some(LinearQuery::start(
            self.http.clone(),
            download.url,
            query_start,
            query_end,
            chunk_size,
            max_chunks,
            worker_count,
            self.metrics.clone(),
        ));
        Ok(())
    }

    /// Get the next chunk of the running linear query, in offset order.
    ///
    /// Returns `Ok(None)` when the query is exhausted or none is running.
    pub async fn next_chunk(&mut self) -> Result<Option<bytes::Bytes>> {
        match &mut self.query {
            Some(query) => query.next_chunk().await,
            None => Ok(None),
        }
    }

    /// Completed ranges parked for reordering right now. Advisory.
    pub fn pending_chunks(&self) -> usize {
        self.query.as_ref().map_or(0, |q| q.pending_chunks())
    }

    /// Stop the running linear query, if any, and discard undelivered
    /// chunks
    pub async fn stop_linear_query(&mut self) {
        if let Some(query) = self.query.take() {
            query.stop().await;
        }
    }

    // ---------------------------------------------------------------
    // State probes
    // ---------------------------------------------------------------

    /// Whether the remote object is in the open state
    pub async fn is_open(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(false);
        }
        let desc = self.api.describe(&self.file_id).await?;
        Ok(desc.state == FileState::Open)
    }

    /// Whether the remote object is in the closed state.
    ///
    /// Once observed closed, the answer is cached: a file never leaves the
    /// closed state, so no further describe calls are made.
    pub async fn is_closed(&mut self) -> Result<bool> {
        if self.closed {
            return Ok(true);
        }
        let desc = self.api.describe(&self.file_id).await?;
        if desc.state == FileState::Closed {
            self.closed = true;
        }
        Ok(self.closed)
    }

    // ---------------------------------------------------------------
    // Composites
    // ---------------------------------------------------------------

    /// Upload a local file as a new remote file object.
    ///
    /// The remote object's `name` field defaults to the local basename.
    /// With `wait_for_close`, returns only once the remote state is
    /// closed.
    pub async fn upload_local_file(
        api: Arc<dyn StorageApi>,
        config: ClientConfig,
        path: impl AsRef<Path>,
        media_type: &str,
        fields: Value,
        wait_for_close: bool,
    ) -> Result<Self> {
        let path = path.as_ref();
        let mut fields = match fields {
            Value::Object(map) => Value::Object(map),
            Value::Null => json!({}),
            other => {
                return Err(FileError::Api(format!(
                    "creation fields must be a JSON object, got {}",
                    other
                )))
            }
        };
        if fields.get("name").is_none() {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                fields["name"] = json!(name);
            }
        }

        let read_chunk = config.max_part_size;
        let mut file = Self::create(api, config, media_type, fields).await?;

        let mut local = tokio::fs::File::open(path).await?;
        let mut buf = vec![0u8; read_chunk];
        loop {
            let n = local.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            file.write(&buf[..n]).await?;
        }

        file.close(wait_for_close).await?;
        Ok(file)
    }

    /// Download a remote file to a local path using a linear query.
    ///
    /// The remote object must already be closed.
    pub async fn download_to_path(
        api: Arc<dyn StorageApi>,
        config: ClientConfig,
        file_id: &str,
        path: impl AsRef<Path>,
        chunk_size: u64,
    ) -> Result<()> {
        let max_chunks = config.max_pending_chunks;
        let workers = config.max_read_workers;
        let mut file = Self::open(api, config, file_id)?;
        if !file.is_closed().await? {
            return Err(FileError::RemoteState(
                "remote file must be in the closed state before it can be downloaded".into(),
            ));
        }

        let mut local = tokio::fs::File::create(path.as_ref()).await?;
        file.start_linear_query(None, None, chunk_size, max_chunks, workers)
            .await?;
        while let Some(chunk) = file.next_chunk().await? {
            local.write_all(&chunk).await?;
        }
        file.stop_linear_query().await;
        local.flush().await?;
        Ok(())
    }

    /// Clone the object into another project, returning a handle bound to
    /// the destination
    pub async fn clone_to(&self, dest_project: &str, dest_folder: &str) -> Result<Self> {
        self.api
            .as_ref()
            .clone_into(&self.file_id, dest_project, dest_folder)
            .await?;
        Self::open_in_project(
            self.api.clone(),
            self.config.clone(),
            self.file_id.clone(),
            Some(dest_project.to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileDescribe, NewFile, TransferUrl};
    use async_trait::async_trait;

    /// Minimal describe-only API double for precondition tests
    struct StaticApi {
        state: FileState,
    }

    #[async_trait]
    impl StorageApi for StaticApi {
        async fn file_new(&self, _params: Value) -> Result<NewFile> {
            Ok(NewFile {
                id: "file-test".into(),
            })
        }
        async fn file_download(&self, _id: &str) -> Result<TransferUrl> {
            Ok(TransferUrl {
                url: "http://unused.example/data".into(),
            })
        }
        async fn file_upload(&self, _id: &str, index: u32) -> Result<TransferUrl> {
            Ok(TransferUrl {
                url: format!("http://unused.example/part/{}", index),
            })
        }
        async fn file_close(&self, _id: &str) -> Result<()> {
            Ok(())
        }
        async fn describe(&self, id: &str) -> Result<FileDescribe> {
            Ok(FileDescribe {
                id: id.to_string(),
                project: None,
                size: 0,
                state: self.state,
            })
        }
        async fn clone_into(&self, _id: &str, _p: &str, _f: &str) -> Result<()> {
            Ok(())
        }
    }

    fn handle_with_state(state: FileState) -> RemoteFile {
        RemoteFile::open(
            Arc::new(StaticApi { state }),
            ClientConfig::default(),
            "file-test",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_seek_requires_closed_file() {
        let mut file = handle_with_state(FileState::Open);
        let err = file.seek(10).await.unwrap_err();
        assert!(matches!(err, FileError::Precondition(_)));
        assert_eq!(file.pos, 0);
    }

    #[tokio::test]
    async fn test_linear_query_requires_closed_file() {
        let mut file = handle_with_state(FileState::Open);
        let err = file
            .start_linear_query(None, None, 10, 2, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::Precondition(_)));
        assert!(file.query.is_none());
    }

    #[tokio::test]
    async fn test_write_after_close_is_precondition_error() {
        let mut file = handle_with_state(FileState::Open);
        file.closed = true;
        let err = file.write(b"more").await.unwrap_err();
        assert!(matches!(err, FileError::Precondition(_)));
        assert!(file.buffer.is_empty());
    }

    #[tokio::test]
    async fn test_is_closed_caches_positive_answer() {
        let mut file = handle_with_state(FileState::Closed);
        assert!(file.is_closed().await.unwrap());
        // The cached flag answers even if the double were to disagree now.
        assert!(file.closed);
        assert!(!file.is_open().await.unwrap());
    }

    #[tokio::test]
    async fn test_next_chunk_without_query_is_exhausted() {
        let mut file = handle_with_state(FileState::Closed);
        assert!(file.next_chunk().await.unwrap().is_none());
        assert_eq!(file.pending_chunks(), 0);
    }

    #[tokio::test]
    async fn test_small_writes_stay_buffered() {
        let mut file = handle_with_state(FileState::Open);
        file.write(b"hello ").await.unwrap();
        file.write(b"world").await.unwrap();
        assert_eq!(&file.buffer[..], b"hello world");
        assert_eq!(file.next_part, 1);
        assert!(file.pool.is_none());
    }

    #[tokio::test]
    async fn test_create_rejects_non_object_fields() {
        let api = Arc::new(StaticApi {
            state: FileState::Open,
        });
        let err = RemoteFile::create(api, ClientConfig::default(), "", json!([1, 2]))
            .await
            .unwrap_err();
        assert!(matches!(err, FileError::Api(_)));
    }
}
