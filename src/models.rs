//! Core data models for the remotefile client

use crate::error::{FileError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Represents a byte range for HTTP Range requests.
///
/// Both ends are inclusive, matching the wire format `bytes=start-end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ByteRange {
    /// Starting byte position (inclusive)
    pub start: u64,
    /// Ending byte position (inclusive)
    pub end: u64,
}

impl ByteRange {
    /// Create a new ByteRange
    ///
    /// # Returns
    /// * `Ok(ByteRange)` if the range is valid
    /// * `Err(FileError)` if start > end
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(FileError::InvalidRange(format!(
                "start ({}) must be <= end ({})",
                start, end
            )));
        }
        Ok(ByteRange { start, end })
    }

    /// Get the size of this byte range in bytes
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Convert this ByteRange to an HTTP Range header value
    ///
    /// # Returns
    /// A string in the format "bytes=start-end"
    pub fn to_header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// One upload job: a full part buffer plus its 1-based part index.
///
/// Owned by the part queue from `produce` until a worker consumes it.
#[derive(Debug, Clone)]
pub struct PartJob {
    /// Raw part bytes, exactly one storage part
    pub bytes: Bytes,
    /// 1-based part index; the service reassembles the object in index order
    pub index: u32,
}

/// Remote lifecycle state of a file object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileState {
    /// Accepting part uploads
    Open,
    /// Close requested, parts still being assembled
    Closing,
    /// Immutable and readable
    Closed,
    /// A state this client version does not know about
    #[serde(other)]
    Unknown,
}

impl FileState {
    /// Wire name of the state
    pub fn as_str(&self) -> &'static str {
        match self {
            FileState::Open => "open",
            FileState::Closing => "closing",
            FileState::Closed => "closed",
            FileState::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response record for file allocation
#[derive(Debug, Clone, Deserialize)]
pub struct NewFile {
    /// Opaque id of the newly allocated file object
    pub id: String,
}

/// Response record carrying a pre-signed transfer URL.
///
/// The URL authorises a single GET (download) or POST (part upload)
/// without further credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct TransferUrl {
    /// The pre-signed URL
    pub url: String,
}

/// Response record for describe calls
#[derive(Debug, Clone, Deserialize)]
pub struct FileDescribe {
    /// Opaque file id
    pub id: String,
    /// Owning project/workspace id, when reported
    #[serde(default)]
    pub project: Option<String>,
    /// Total size in bytes; negative while the service has not settled it
    #[serde(default = "unknown_size")]
    pub size: i64,
    /// Remote lifecycle state
    pub state: FileState,
}

fn unknown_size() -> i64 {
    -1
}

impl FileDescribe {
    /// Size as an unsigned count, treating an unsettled size as zero
    pub fn size_bytes(&self) -> u64 {
        if self.size < 0 {
            0
        } else {
            self.size as u64
        }
    }
}
