//! remotefile command line tool
//!
//! Uploads local files to, and downloads remote files from, a configured
//! storage endpoint.
//!
//! # Usage
//! ```bash
//! # Upload, waiting until the remote object is closed
//! remotefile upload ./data.bin
//!
//! # Download a closed remote file
//! remotefile download file-0123 ./data.bin
//! ```
//!
//! Configuration is read from the file named by `REMOTEFILE_CONFIG`, or
//! `remotefile.yaml` in the working directory.

use remotefile::{
    ClientConfig, RemoteFile, RestApi, RetryPolicy, RetryingClient, TransferMetrics,
};
use std::env;
use std::sync::Arc;
use tracing::{error, info};

fn usage() -> ! {
    eprintln!("usage: remotefile upload <path> | download <file-id> <path>");
    std::process::exit(2);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let config_path =
        env::var("REMOTEFILE_CONFIG").unwrap_or_else(|_| "remotefile.yaml".to_string());
    let config = match ClientConfig::from_file(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("failed to load configuration from {}: {}", config_path, e);
            std::process::exit(1);
        }
    };

    let http = match RetryingClient::new(
        RetryPolicy::with_base_delay(config.max_http_attempts, config.retry_base_delay()),
        config.request_timeout(),
        Arc::new(TransferMetrics::new()),
    ) {
        Ok(http) => http,
        Err(e) => {
            error!("failed to create HTTP client: {}", e);
            std::process::exit(1);
        }
    };
    let api = Arc::new(RestApi::new(&config, http));

    let args: Vec<String> = env::args().skip(1).collect();
    let result = match args.as_slice() {
        [command, path] if command == "upload" => {
            info!("uploading {} to {}", path, config.api_url);
            RemoteFile::upload_local_file(
                api,
                config,
                path,
                "",
                serde_json::json!({}),
                true,
            )
            .await
            .map(|file| {
                info!("uploaded as {}", file.id());
                let snapshot = file.metrics();
                info!(
                    "{} parts, {} bytes, {} HTTP retries",
                    snapshot.parts_uploaded, snapshot.bytes_uploaded, snapshot.http_retries
                );
            })
        }
        [command, file_id, path] if command == "download" => {
            info!("downloading {} to {}", file_id, path);
            let chunk_size = 1 << 20;
            RemoteFile::download_to_path(api, config, file_id, path, chunk_size).await
        }
        _ => usage(),
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}
