//! # remotefile
//!
//! Client library for file objects on a part-based object storage service.
//! A remote file moves through a three-phase lifecycle: it is created
//! open, bytes are appended as numbered parts, and after closing it
//! becomes an immutable, randomly readable object.
//!
//! The two transfer paths do the heavy lifting:
//!
//! - **Buffered parallel multipart upload**: written bytes accumulate into
//!   part-sized buffers; full parts flow through a bounded queue to a pool
//!   of upload workers, each POSTing to a pre-signed URL. `flush` and
//!   `close` guarantee every produced part is uploaded before returning.
//! - **Ordered parallel range download** (linear query): a set of workers
//!   fetches byte ranges concurrently while the consumer receives chunks
//!   in strict offset order, with a bounded reorder buffer between them.
//!
//! Every HTTP request, on both paths and for API calls, is wrapped in a
//! retry layer that treats transport errors and non-2xx responses
//! uniformly with exponential backoff.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use remotefile::{ClientConfig, RemoteFile, RestApi, RetryingClient, RetryPolicy};
//! use remotefile::TransferMetrics;
//! use std::sync::Arc;
//!
//! # async fn run() -> remotefile::Result<()> {
//! let config = ClientConfig::from_file("remotefile.yaml")?;
//! let http = RetryingClient::new(
//!     RetryPolicy::new(config.max_http_attempts),
//!     config.request_timeout(),
//!     Arc::new(TransferMetrics::new()),
//! )?;
//! let api = Arc::new(RestApi::new(&config, http));
//!
//! // Upload
//! let mut file = RemoteFile::create(api.clone(), config.clone(), "text/plain",
//!     serde_json::json!({})).await?;
//! file.write(b"hello world").await?;
//! file.close(true).await?;
//!
//! // Ordered parallel download
//! let mut file = RemoteFile::open(api, config, file.id().to_string())?;
//! file.start_linear_query(None, None, 1 << 20, 20, 5).await?;
//! while let Some(chunk) = file.next_chunk().await? {
//!     // chunks arrive in strict offset order
//!     let _ = chunk;
//! }
//! file.stop_linear_query().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Configuration is loaded from a YAML file:
//!
//! ```yaml
//! api_url: https://api.example.com
//! auth_token: secret
//! project: project-0001
//! max_part_size: 104857600      # 100 MiB parts
//! max_write_workers: 5
//! max_http_attempts: 5
//! ```
//!
//! See [`ClientConfig`] for all options and their defaults.

pub mod api;
pub mod config;
mod download;
pub mod error;
pub mod handle;
pub mod http;
pub mod metrics;
pub mod models;
pub mod queue;
mod upload;

// Re-export commonly used types
pub use api::{RestApi, StorageApi};
pub use config::ClientConfig;
pub use error::{FileError, Result};
pub use handle::RemoteFile;
pub use http::{HttpResponse, RetryPolicy, RetryingClient};
pub use metrics::{MetricsSnapshot, TransferMetrics};
pub use models::{ByteRange, FileDescribe, FileState, NewFile, PartJob, TransferUrl};
