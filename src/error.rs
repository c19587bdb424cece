//! Error types for the remotefile client

use thiserror::Error;

/// Result type alias for file client operations
pub type Result<T> = std::result::Result<T, FileError>;

/// Error types that can occur while talking to the file storage service
#[derive(Error, Debug, Clone)]
pub enum FileError {
    /// The HTTP transport failed before a response was received
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a status outside 200-299
    #[error("server returned HTTP status {status}: {message}")]
    HttpStatus { status: u16, message: String },

    /// A request failed on every attempt allowed by the retry policy
    #[error(
        "unrecoverable error while performing '{method} {url}'. \
         Request headers: [{headers}]. Giving up after {attempts} tries. \
         Last error: {message}"
    )]
    RetriesExhausted {
        method: String,
        url: String,
        headers: String,
        attempts: usize,
        message: String,
    },

    /// An operation was called in a state that does not permit it
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The remote object is in a state that does not permit the operation
    #[error("remote state error: {0}")]
    RemoteState(String),

    /// The storage API rejected a request or returned an error payload
    #[error("API error: {0}")]
    Api(String),

    /// A response body could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// An invalid byte range was requested or returned
    #[error("invalid byte range: {0}")]
    InvalidRange(String),

    /// A background transfer worker failed; surfaced by flush/close or
    /// the linear-query consumer
    #[error("transfer worker failed: {0}")]
    Worker(String),

    /// Local file I/O failed
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for FileError {
    fn from(err: std::io::Error) -> Self {
        FileError::Io(err.to_string())
    }
}

impl FileError {
    /// Whether the retry layer should attempt this request again.
    ///
    /// Transport faults and non-2xx statuses are treated uniformly as
    /// retryable: expired pre-signed URLs, transient 5xx, and proxy faults
    /// all present as one or the other. Everything else is surfaced as-is.
    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            FileError::Transport(_) | FileError::HttpStatus { .. }
        )
    }

    /// Create an error from an HTTP status code outside the success range
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        FileError::HttpStatus {
            status,
            message: message.into(),
        }
    }

    /// Create a precondition error
    pub fn precondition(message: impl Into<String>) -> Self {
        FileError::Precondition(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_classification() {
        assert!(FileError::Transport("connection reset".into()).should_retry());
        assert!(FileError::from_http_status(503, "unavailable").should_retry());

        assert!(!FileError::precondition("file not closed").should_retry());
        assert!(!FileError::Api("bad request".into()).should_retry());
        assert!(!FileError::Decode("truncated".into()).should_retry());
        assert!(!FileError::RetriesExhausted {
            method: "POST".into(),
            url: "http://example/part".into(),
            headers: String::new(),
            attempts: 5,
            message: "HTTP 503".into(),
        }
        .should_retry());
    }

    #[test]
    fn test_retries_exhausted_display() {
        let err = FileError::RetriesExhausted {
            method: "POST".into(),
            url: "http://upload.example/part/1".into(),
            headers: "content-length: 11".into(),
            attempts: 5,
            message: "server returned HTTP status 503: service unavailable".into(),
        };
        let text = err.to_string();
        assert!(text.contains("Giving up after 5 tries"));
        assert!(text.contains("POST"));
        assert!(text.contains("http://upload.example/part/1"));
        assert!(text.contains("content-length: 11"));
        assert!(text.contains("503"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: FileError = io.into();
        assert!(matches!(err, FileError::Io(_)));
    }
}
