//! Storage API client
//!
//! The file handle consumes the service's control plane through the
//! [`StorageApi`] trait: allocating objects, requesting pre-signed transfer
//! URLs, closing, and describing. [`RestApi`] is the default
//! implementation, speaking JSON over POST routes; tests substitute their
//! own doubles.

use crate::config::ClientConfig;
use crate::error::{FileError, Result};
use crate::http::RetryingClient;
use crate::models::{FileDescribe, FileState, NewFile, TransferUrl};
use async_trait::async_trait;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

/// How often [`StorageApi::wait_on_state`] polls describe by default
const STATE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Control-plane operations of the file storage service
#[async_trait]
pub trait StorageApi: Send + Sync {
    /// Allocate a new file object; `params` may carry `project`, `media`,
    /// `name`, and service-specific fields
    async fn file_new(&self, params: Value) -> Result<NewFile>;

    /// Request a pre-signed GET URL for the file's content
    async fn file_download(&self, id: &str) -> Result<TransferUrl>;

    /// Request a pre-signed POST URL for the given 1-based part index
    async fn file_upload(&self, id: &str, index: u32) -> Result<TransferUrl>;

    /// Ask the service to transition the file toward the closed state
    async fn file_close(&self, id: &str) -> Result<()>;

    /// Inspect remote metadata
    async fn describe(&self, id: &str) -> Result<FileDescribe>;

    /// Clone the object into another project
    async fn clone_into(&self, id: &str, dest_project: &str, dest_folder: &str) -> Result<()>;

    /// Poll describe until the remote state equals `target`
    async fn wait_on_state(&self, id: &str, target: FileState) -> Result<()> {
        loop {
            let desc = self.describe(id).await?;
            if desc.state == target {
                return Ok(());
            }
            debug!(
                "file {} is {}, waiting for {}",
                id, desc.state, target
            );
            tokio::time::sleep(STATE_POLL_INTERVAL).await;
        }
    }
}

/// JSON-over-POST implementation of [`StorageApi`].
///
/// Every call is `POST {api_url}/{route}` with a JSON body and a JSON
/// response, authenticated with a bearer token when one is configured.
/// Requests ride the retry layer, so transient API failures get the same
/// backoff discipline as transfers.
pub struct RestApi {
    http: RetryingClient,
    base_url: String,
    auth_token: Option<String>,
}

impl RestApi {
    /// Create a RestApi from configuration and a retry-capable client
    pub fn new(config: &ClientConfig, http: RetryingClient) -> Self {
        RestApi {
            http,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        }
    }

    /// Issue one API call and decode the JSON response
    async fn call(&self, route: &str, body: Value) -> Result<Value> {
        let url = format!("{}/{}", self.base_url, route);
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(token) = &self.auth_token {
            let bearer = format!("Bearer {}", token);
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&bearer)
                    .map_err(|e| FileError::Config(format!("invalid auth token: {}", e)))?,
            );
        }

        let payload = serde_json::to_vec(&body)
            .map_err(|e| FileError::Decode(format!("failed to encode request body: {}", e)))?;
        let response = self
            .http
            .invoke(Method::POST, &url, headers, Some(payload.into()))
            .await?;

        serde_json::from_slice(&response.body).map_err(|e| {
            FileError::Decode(format!("failed to decode response from {}: {}", url, e))
        })
    }

    /// Decode a typed record out of an API response
    fn decode<T: serde::de::DeserializeOwned>(route: &str, value: Value) -> Result<T> {
        serde_json::from_value(value).map_err(|e| {
            FileError::Decode(format!("unexpected response shape from {}: {}", route, e))
        })
    }
}

#[async_trait]
impl StorageApi for RestApi {
    async fn file_new(&self, params: Value) -> Result<NewFile> {
        let response = self.call("file/new", params).await?;
        Self::decode("file/new", response)
    }

    async fn file_download(&self, id: &str) -> Result<TransferUrl> {
        let route = format!("{}/download", id);
        let response = self.call(&route, json!({})).await?;
        Self::decode(&route, response)
    }

    async fn file_upload(&self, id: &str, index: u32) -> Result<TransferUrl> {
        let route = format!("{}/upload", id);
        let response = self.call(&route, json!({ "index": index })).await?;
        Self::decode(&route, response)
    }

    async fn file_close(&self, id: &str) -> Result<()> {
        let route = format!("{}/close", id);
        self.call(&route, json!({})).await?;
        Ok(())
    }

    async fn describe(&self, id: &str) -> Result<FileDescribe> {
        let route = format!("{}/describe", id);
        let response = self.call(&route, json!({})).await?;
        Self::decode(&route, response)
    }

    async fn clone_into(&self, id: &str, dest_project: &str, dest_folder: &str) -> Result<()> {
        let route = format!("{}/clone", id);
        self.call(
            &route,
            json!({ "project": dest_project, "folder": dest_folder }),
        )
        .await?;
        Ok(())
    }
}
