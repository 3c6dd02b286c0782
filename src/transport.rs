//! Transport layer for fetching scheme files
//!
//! Abstracts HTTP access for testability:
//! - [`Transport`] trait: plain GET of a URL, optionally straight to a file
//! - [`HttpTransport`]: blocking `reqwest` client for production
//! - [`MockTransport`]: in-memory URL map that records every request

use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use crate::cancel::CancelToken;
use crate::disk;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation deadline exceeded")]
    DeadlineExceeded,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
}

/// Fetches remote files by URL
pub trait Transport: Send + Sync {
    /// GET `url` and return the body
    fn get_bytes(&self, url: &str, cancel: &CancelToken) -> Result<Vec<u8>, TransportError>;

    /// GET `url` and write the body atomically to `dest`
    fn get_file(&self, url: &str, dest: &Path, cancel: &CancelToken) -> Result<(), TransportError> {
        let bytes = self.get_bytes(url, cancel)?;
        disk::save_file(dest, &bytes)?;
        Ok(())
    }
}

/// Blocking HTTPS transport
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get_bytes(&self, url: &str, cancel: &CancelToken) -> Result<Vec<u8>, TransportError> {
        cancel.check()?;
        debug!(url, "fetching");

        let mut request = self.client.get(url);
        if let Some(remaining) = cancel.remaining() {
            request = request.timeout(remaining);
        }

        let response = request.send().map_err(|source| TransportError::Http {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().map_err(|source| TransportError::Http {
            url: url.to_string(),
            source,
        })?;
        Ok(body.to_vec())
    }
}

/// In-memory transport for tests
///
/// Unknown URLs answer HTTP 404. Requests are recorded only when they pass
/// the cancellation check.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, Vec<u8>>>,
    requests: Mutex<Vec<String>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `contents` at `url`, replacing any previous response
    pub fn insert(&self, url: impl Into<String>, contents: impl Into<Vec<u8>>) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(url.into(), contents.into());
        }
    }

    pub fn remove(&self, url: &str) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.remove(url);
        }
    }

    /// Every URL requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn clear_requests(&self) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.clear();
        }
    }
}

impl Transport for MockTransport {
    fn get_bytes(&self, url: &str, cancel: &CancelToken) -> Result<Vec<u8>, TransportError> {
        cancel.check()?;
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }

        let responses = self
            .responses
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "mock transport poisoned"))?;
        responses
            .get(url)
            .cloned()
            .ok_or_else(|| TransportError::Status {
                url: url.to_string(),
                status: 404,
            })
    }
}
