//! Ordered parallel range download
//!
//! A linear query splits `[start, end)` into fixed-size ranges, claimed by
//! a set of workers fetching concurrently. Completed ranges park in an
//! offset-keyed reorder buffer; the consumer drains it in strict offset
//! order. A worker holding a far-future range waits rather than grow the
//! buffer past its capacity, which bounds memory no matter how unevenly
//! the fetches complete.

use crate::error::{FileError, Result};
use crate::http::RetryingClient;
use crate::metrics::TransferMetrics;
use crate::models::ByteRange;
use bytes::{Bytes, BytesMut};
use http::header::RANGE;
use http::{HeaderMap, HeaderValue, Method};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Poll interval of the consumer waiting for the next in-order chunk
const DELIVERY_POLL_INTERVAL: Duration = Duration::from_micros(100);

/// Poll interval of a worker parked on a full reorder buffer
const REORDER_WAIT_INTERVAL: Duration = Duration::from_millis(1);

/// Range-claiming and reordering state shared by the workers and consumer
struct QueryShared {
    /// Next unassigned byte offset; workers claim ranges from it
    claim: Mutex<u64>,
    /// Exclusive end offset of the overall query
    end: u64,
    /// Bytes per claimed range
    chunk_limit: u64,
    /// Reorder buffer capacity, in pending ranges
    max_chunks: usize,
    /// Delivery state: both fields move together under one lock
    ordered: Mutex<OrderedResults>,
    /// Pre-signed URL captured at query start, constant for the query
    url: String,
}

struct OrderedResults {
    /// Next offset the consumer will receive
    next_result: u64,
    /// Completed ranges keyed by start offset
    results: BTreeMap<u64, Bytes>,
}

/// One running linear query: its workers plus the shared state
pub(crate) struct LinearQuery {
    shared: Arc<QueryShared>,
    workers: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    fault: Arc<Mutex<Option<FileError>>>,
    metrics: Arc<TransferMetrics>,
}

impl LinearQuery {
    /// Spawn `worker_count` range fetchers over `[start, end)`
    pub(crate) fn start(
        http: RetryingClient,
        url: String,
        start: u64,
        end: u64,
        chunk_limit: u64,
        max_chunks: usize,
        worker_count: usize,
        metrics: Arc<TransferMetrics>,
    ) -> Self {
        let shared = Arc::new(QueryShared {
            claim: Mutex::new(start),
            end,
            chunk_limit,
            max_chunks,
            ordered: Mutex::new(OrderedResults {
                next_result: start,
                results: BTreeMap::new(),
            }),
            url,
        });
        let cancel = CancellationToken::new();
        let fault = Arc::new(Mutex::new(None));

        let workers = (0..worker_count)
            .map(|_| {
                tokio::spawn(range_worker(
                    shared.clone(),
                    http.clone(),
                    cancel.clone(),
                    fault.clone(),
                ))
            })
            .collect();

        debug!(
            "started linear query [{}, {}) with {} workers, chunk {} bytes, {} pending max",
            start, end, worker_count, chunk_limit, max_chunks
        );
        LinearQuery {
            shared,
            workers,
            cancel,
            fault,
            metrics,
        }
    }

    /// Deliver the next chunk in offset order.
    ///
    /// Waits while the head range is still in flight. Returns `Ok(None)`
    /// once every offset in the query has been delivered; surfaces a
    /// worker fault instead of waiting for a range that will never arrive.
    pub(crate) async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            {
                let mut ordered = self.shared.ordered.lock();
                if ordered.next_result >= self.shared.end {
                    return Ok(None);
                }
                let head = ordered.results.first_key_value().map(|(k, _)| *k);
                if head == Some(ordered.next_result) {
                    let offset = ordered.next_result;
                    if let Some(chunk) = ordered.results.remove(&offset) {
                        ordered.next_result += chunk.len() as u64;
                        self.metrics.record_chunk_delivered(chunk.len() as u64);
                        return Ok(Some(chunk));
                    }
                }
            }

            if let Some(err) = self.fault.lock().clone() {
                return Err(err);
            }
            tokio::time::sleep(DELIVERY_POLL_INTERVAL).await;
        }
    }

    /// Completed ranges currently parked in the reorder buffer
    pub(crate) fn pending_chunks(&self) -> usize {
        self.shared.ordered.lock().results.len()
    }

    /// Stop the query: cancel, join every worker, and drop the buffer
    pub(crate) async fn stop(mut self) {
        self.cancel.cancel();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                warn!("download worker panicked: {}", e);
            }
        }
        self.shared.ordered.lock().results.clear();
        debug!("stopped linear query");
    }
}

impl Drop for LinearQuery {
    fn drop(&mut self) {
        // A dropped query must not strand parked workers.
        self.cancel.cancel();
    }
}

/// Body of one range fetcher
async fn range_worker(
    shared: Arc<QueryShared>,
    http: RetryingClient,
    cancel: CancellationToken,
    fault: Arc<Mutex<Option<FileError>>>,
) {
    loop {
        let start = {
            let mut claim = shared.claim.lock();
            if *claim >= shared.end {
                return;
            }
            let start = *claim;
            *claim += shared.chunk_limit;
            start
        };
        let end = (start + shared.chunk_limit - 1).min(shared.end - 1);

        let bytes = match fetch_range(&http, &shared.url, start, end).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("range [{}, {}] failed: {}", start, end, err);
                let mut slot = fault.lock();
                if slot.is_none() {
                    *slot = Some(err);
                }
                return;
            }
        };

        // Park the range, but never past the buffer capacity while earlier
        // ranges are still outstanding. The range the consumer is waiting
        // for is always admitted.
        loop {
            {
                let mut ordered = shared.ordered.lock();
                if ordered.next_result == start || ordered.results.len() < shared.max_chunks {
                    ordered.results.insert(start, bytes);
                    break;
                }
            }
            if cancel.is_cancelled() {
                return;
            }
            tokio::time::sleep(REORDER_WAIT_INTERVAL).await;
        }

        if cancel.is_cancelled() {
            return;
        }
    }
}

/// Fetch the inclusive byte range `[start, end]`, issuing follow-up
/// requests for the unfilled suffix whenever the server answers short.
async fn fetch_range(
    http: &RetryingClient,
    url: &str,
    start: u64,
    end: u64,
) -> Result<Bytes> {
    let total = ByteRange::new(start, end)?.size();
    let mut assembled = BytesMut::with_capacity(total as usize);
    let mut cursor = start;

    while cursor <= end {
        let range = ByteRange::new(cursor, end)?;
        let mut headers = HeaderMap::new();
        headers.insert(
            RANGE,
            HeaderValue::from_str(&range.to_header())
                .map_err(|e| FileError::InvalidRange(e.to_string()))?,
        );

        let response = http.invoke(Method::GET, url, headers, None).await?;
        if response.body.is_empty() {
            return Err(FileError::Transport(format!(
                "empty body for range {}",
                range.to_header()
            )));
        }
        assembled.extend_from_slice(&response.body);
        cursor += response.body.len() as u64;
    }

    if assembled.len() as u64 != total {
        return Err(FileError::InvalidRange(format!(
            "server returned {} bytes for a {}-byte range [{}, {}]",
            assembled.len(),
            total,
            start,
            end
        )));
    }
    Ok(assembled.freeze())
}
