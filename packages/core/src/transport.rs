//! The seam between the query layer and whatever actually fetches URLs.
//!
//! The query layer only needs "give me the bytes behind this URL with
//! these headers". [`Transport`] is that seam; the HTTP crate provides
//! the real client and [`StubTransport`] serves canned responses in
//! tests.

use std::collections::HashMap;
use std::sync::Mutex;

use bytes::Bytes;

use crate::error::Error;

/// A fetched response: just the status and the body bytes.
#[derive(Clone, Debug)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Bytes,
}

impl FetchResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        FetchResponse {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: &str) -> Self {
        FetchResponse::new(200, body.as_bytes().to_vec())
    }

    pub fn not_found() -> Self {
        FetchResponse::new(404, Vec::new())
    }

    /// The body as UTF-8 text.
    pub fn text(&self) -> Result<&str, Error> {
        std::str::from_utf8(&self.body).map_err(|e| Error::Transport {
            message: format!("response body is not UTF-8: {}", e),
        })
    }
}

/// Fetches one URL synchronously. Transports are shared behind an `Arc`
/// and may be handed to worker threads, hence the bounds.
pub trait Transport: Send + Sync {
    fn fetch(&self, url: &str, headers: &HashMap<String, String>) -> Result<FetchResponse, Error>;
}

/// In-memory transport serving stubbed responses and recording calls.
#[derive(Default)]
pub struct StubTransport {
    responses: Mutex<HashMap<String, FetchResponse>>,
    calls: Mutex<Vec<RecordedCall>>,
}

#[derive(Clone, Debug)]
pub struct RecordedCall {
    pub url: String,
    pub headers: HashMap<String, String>,
}

impl StubTransport {
    pub fn new() -> Self {
        StubTransport::default()
    }

    /// Register the response served for an exact URL.
    pub fn stub(&self, url: impl Into<String>, response: FetchResponse) {
        if let Ok(mut responses) = self.responses.lock() {
            responses.insert(url.into(), response);
        }
    }

    pub fn with(self, url: impl Into<String>, response: FetchResponse) -> Self {
        self.stub(url, response);
        self
    }

    /// URLs fetched so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.recorded().into_iter().map(|c| c.url).collect()
    }

    /// Calls with the headers they carried, in call order.
    pub fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|u| u.as_str() == url).count()
    }
}

impl Transport for StubTransport {
    fn fetch(&self, url: &str, headers: &HashMap<String, String>) -> Result<FetchResponse, Error> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                url: url.to_string(),
                headers: headers.clone(),
            });
        }
        let responses = self.responses.lock().map_err(|_| Error::Transport {
            message: "stub transport poisoned".to_string(),
        })?;
        responses.get(url).cloned().ok_or_else(|| Error::Transport {
            message: format!("no stubbed response for {}", url),
        })
    }
}
