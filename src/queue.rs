//! Bounded part queue
//!
//! FIFO of upload jobs between the single producer (the handle cutting
//! parts) and the upload worker pool. `produce` waits while the queue is
//! at capacity; `consume` waits while it is empty and unblocks with a
//! distinguished outcome when the pool's cancellation token fires.

use crate::models::PartJob;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Outcome of a [`PartQueue::consume`] call
#[derive(Debug)]
pub enum Consumed {
    /// A job was dequeued; the consumer now owns it
    Job(PartJob),
    /// The cancellation token fired while waiting, or the queue closed
    Cancelled,
}

/// Single-producer, multi-consumer bounded FIFO of upload jobs
pub struct PartQueue {
    tx: mpsc::Sender<PartJob>,
    rx: Arc<Mutex<mpsc::Receiver<PartJob>>>,
    // Produced minus consumed; read by the producer to detect that the
    // last job has been claimed by a worker.
    depth: AtomicUsize,
}

impl PartQueue {
    /// Create a queue holding at most `capacity` jobs
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        PartQueue {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            depth: AtomicUsize::new(0),
        }
    }

    /// Append a job, waiting while the queue is at capacity.
    ///
    /// Returns `false` only if the queue has been closed, which does not
    /// happen while the owning pool is alive.
    pub async fn produce(&self, job: PartJob) -> bool {
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(job).await.is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            return false;
        }
        true
    }

    /// Remove the head job, waiting while the queue is empty.
    ///
    /// Cancellation takes priority over pending jobs so a broadcast stop
    /// reliably unblocks every waiter.
    pub async fn consume(&self, cancel: &CancellationToken) -> Consumed {
        let mut rx = self.rx.lock().await;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Consumed::Cancelled,
            job = rx.recv() => match job {
                Some(job) => {
                    self.depth.fetch_sub(1, Ordering::SeqCst);
                    Consumed::Job(job)
                }
                None => Consumed::Cancelled,
            },
        }
    }

    /// Jobs produced but not yet claimed by a consumer. Advisory; only the
    /// producer side reads it.
    pub fn len(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Whether every produced job has been claimed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
