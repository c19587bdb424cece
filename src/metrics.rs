//! Transfer metrics collection
//!
//! Lightweight atomic counters updated by the upload and download paths.
//! Advisory only: readers get a point-in-time snapshot, not a consistent
//! cut across counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Runtime counters for a file client
#[derive(Debug, Default)]
pub struct TransferMetrics {
    /// HTTP attempts issued, first tries included
    http_attempts: AtomicU64,
    /// HTTP attempts that were retries of a failed attempt
    http_retries: AtomicU64,
    /// Parts successfully uploaded
    parts_uploaded: AtomicU64,
    /// Bytes successfully uploaded as parts
    bytes_uploaded: AtomicU64,
    /// Chunks delivered to linear-query consumers
    chunks_delivered: AtomicU64,
    /// Bytes delivered to linear-query consumers
    bytes_delivered: AtomicU64,
}

/// Point-in-time view of [`TransferMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub http_attempts: u64,
    pub http_retries: u64,
    pub parts_uploaded: u64,
    pub bytes_uploaded: u64,
    pub chunks_delivered: u64,
    pub bytes_delivered: u64,
}

impl TransferMetrics {
    /// Create a zeroed metrics instance
    pub fn new() -> Self {
        TransferMetrics::default()
    }

    pub(crate) fn record_http_attempt(&self) {
        self.http_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_http_retry(&self) {
        self.http_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_part_uploaded(&self, bytes: u64) {
        self.parts_uploaded.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub(crate) fn record_chunk_delivered(&self, bytes: u64) {
        self.chunks_delivered.fetch_add(1, Ordering::Relaxed);
        self.bytes_delivered.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            http_attempts: self.http_attempts.load(Ordering::Relaxed),
            http_retries: self.http_retries.load(Ordering::Relaxed),
            parts_uploaded: self.parts_uploaded.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            chunks_delivered: self.chunks_delivered.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
        }
    }
}
