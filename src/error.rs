//! Error types shared by the data sources and sinks

use std::time::Duration;
use thiserror::Error;

/// Failure to fetch data from an external source
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request did not complete within the configured timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Transport-level failure (connection refused, DNS, TLS, ...)
    #[error("http error: {0}")]
    Http(String),
    /// Non-success status code
    #[error("{status} from {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    /// Response body did not match the expected shape
    #[error("unexpected response: {0}")]
    Decode(String),
    /// The requested item does not exist
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Http(e.to_string())
        }
    }
}

/// Failure to persist a row
#[derive(Debug, Error)]
pub enum SinkError {
    /// Primary store unreachable or rejected the statement
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Local fallback file could not be written
    #[error("fallback write failed: {0}")]
    Fallback(String),
}

impl From<sqlx::Error> for SinkError {
    fn from(e: sqlx::Error) -> Self {
        SinkError::Unavailable(e.to_string())
    }
}

impl From<csv::Error> for SinkError {
    fn from(e: csv::Error) -> Self {
        SinkError::Fallback(e.to_string())
    }
}

impl From<std::io::Error> for SinkError {
    fn from(e: std::io::Error) -> Self {
        SinkError::Fallback(e.to_string())
    }
}

/// Run a fetch with a timeout, mapping elapsed time to [`FetchError::Timeout`]
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, FetchError>
where
    F: std::future::Future<Output = Result<T, FetchError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout(timeout)),
    }
}
