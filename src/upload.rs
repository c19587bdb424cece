//! Upload worker pool
//!
//! Drains the part queue with a fixed set of workers. Each worker asks the
//! storage API for a pre-signed URL carrying the part's 1-based index,
//! then POSTs the bytes through the retry layer. Shutdown is quiescent:
//! every produced part is claimed and its upload finished before the pool
//! joins.

use crate::api::StorageApi;
use crate::error::{FileError, Result};
use crate::http::RetryingClient;
use crate::metrics::TransferMetrics;
use crate::models::PartJob;
use crate::queue::{Consumed, PartQueue};
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, HeaderValue, Method};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Poll interval of the drain and quiescence spin loops
const SPIN_INTERVAL: Duration = Duration::from_micros(100);

/// Worker occupancy, updated around the queue receive.
///
/// Two interleaved counters instead of one "busy" count: a worker is
/// briefly unobservable between returning from consume and starting its
/// upload, so a single counter cannot distinguish "idle in consume" from
/// "about to upload". The invariant
/// `waiting_on_consume + not_waiting_on_consume == workers mid-loop`
/// holds because both transitions happen under this mutex.
#[derive(Debug, Default)]
struct WorkerCounters {
    waiting_on_consume: usize,
    not_waiting_on_consume: usize,
}

/// Pool of upload workers attached to one open file
pub(crate) struct UploadPool {
    queue: Arc<PartQueue>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    counters: Arc<Mutex<WorkerCounters>>,
    fault: Arc<Mutex<Option<FileError>>>,
}

impl UploadPool {
    /// Spawn `worker_count` workers uploading parts of `file_id`.
    ///
    /// Queue capacity equals the worker count, so produced parts are
    /// dispatched almost immediately and the producer feels back-pressure
    /// only when every worker is busy.
    pub(crate) fn spawn(
        api: Arc<dyn StorageApi>,
        http: RetryingClient,
        file_id: String,
        worker_count: usize,
        metrics: Arc<TransferMetrics>,
    ) -> Self {
        let queue = Arc::new(PartQueue::new(worker_count));
        let cancel = CancellationToken::new();
        let counters = Arc::new(Mutex::new(WorkerCounters::default()));
        let fault = Arc::new(Mutex::new(None));

        let workers = (0..worker_count)
            .map(|_| {
                tokio::spawn(worker_loop(
                    queue.clone(),
                    cancel.clone(),
                    counters.clone(),
                    fault.clone(),
                    api.clone(),
                    http.clone(),
                    file_id.clone(),
                    metrics.clone(),
                ))
            })
            .collect();

        debug!("spawned {} upload workers for {}", worker_count, file_id);
        UploadPool {
            queue,
            workers,
            cancel,
            counters,
            fault,
        }
    }

    /// Enqueue one part for upload, waiting while the queue is full
    pub(crate) async fn produce(&self, job: PartJob) -> Result<()> {
        if !self.queue.produce(job).await {
            return Err(FileError::Worker("part queue closed".into()));
        }
        Ok(())
    }

    /// First error any worker has hit, if one has
    pub(crate) fn fault(&self) -> Option<FileError> {
        self.fault.lock().clone()
    }

    /// Quiescent shutdown: wait for every produced part to be claimed and
    /// uploaded, then stop and join all workers.
    ///
    /// Steps: spin until the queue is drained (the last job has been
    /// claimed, though possibly still uploading), broadcast cancellation
    /// (only waiters in consume exit on it), spin until every worker is
    /// back waiting on consume, then join. The sticky fault, if any, is
    /// returned after the join so teardown always completes.
    pub(crate) async fn join_all(mut self) -> Result<()> {
        if self.workers.is_empty() {
            return Ok(());
        }

        while !self.queue.is_empty() {
            tokio::time::sleep(SPIN_INTERVAL).await;
        }

        self.cancel.cancel();

        let worker_count = self.workers.len();
        loop {
            {
                let counters = self.counters.lock();
                if counters.not_waiting_on_consume == 0
                    && counters.waiting_on_consume == worker_count
                {
                    break;
                }
            }
            tokio::time::sleep(SPIN_INTERVAL).await;
        }

        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!("upload worker panicked: {}", e);
            }
        }
        debug!("joined {} upload workers", worker_count);

        match self.fault.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for UploadPool {
    fn drop(&mut self) {
        // A dropped pool must not strand workers in consume.
        self.cancel.cancel();
    }
}

/// Body of one upload worker
#[allow(clippy::too_many_arguments)]
async fn worker_loop(
    queue: Arc<PartQueue>,
    cancel: CancellationToken,
    counters: Arc<Mutex<WorkerCounters>>,
    fault: Arc<Mutex<Option<FileError>>>,
    api: Arc<dyn StorageApi>,
    http: RetryingClient,
    file_id: String,
    metrics: Arc<TransferMetrics>,
) {
    loop {
        counters.lock().waiting_on_consume += 1;

        let job = match queue.consume(&cancel).await {
            Consumed::Job(job) => job,
            // Exit while blocked on consume; the waiting count stays
            // raised, which is exactly what join_all checks for.
            Consumed::Cancelled => return,
        };

        {
            let mut counters = counters.lock();
            counters.waiting_on_consume -= 1;
            counters.not_waiting_on_consume += 1;
        }

        let part_len = job.bytes.len() as u64;
        let part_index = job.index;
        match upload_part(&api, &http, &file_id, job).await {
            Ok(()) => {
                metrics.record_part_uploaded(part_len);
                debug!(
                    "uploaded part {} of {} ({} bytes)",
                    part_index, file_id, part_len
                );
            }
            Err(err) => {
                warn!(
                    "upload of part {} of {} failed: {}",
                    part_index, file_id, err
                );
                let mut slot = fault.lock();
                if slot.is_none() {
                    *slot = Some(err);
                }
            }
        }

        counters.lock().not_waiting_on_consume -= 1;
    }
}

/// Fetch the part's pre-signed URL and POST the bytes to it
async fn upload_part(
    api: &Arc<dyn StorageApi>,
    http: &RetryingClient,
    file_id: &str,
    job: PartJob,
) -> Result<()> {
    let upload = api.file_upload(file_id, job.index).await?;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(job.bytes.len()));

    http.invoke(Method::POST, &upload.url, headers, Some(job.bytes))
        .await?;
    Ok(())
}
