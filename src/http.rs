//! Request descriptors and stored responses
//!
//! These are host-independent stand-ins for the browser's `Request` and
//! `Response`. A `Response` is fully buffered and serializable so cache
//! storage can persist it as-is.

use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

/// An outgoing request as seen by the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Absolute request URL
    pub url: Url,
}

impl Request {
    /// Creates a GET request for the given URL
    pub fn get(url: Url) -> Self {
        Self {
            method: Method::GET,
            url,
        }
    }

    /// Creates a request with an explicit method
    pub fn new(method: Method, url: Url) -> Self {
        Self { method, url }
    }

    /// Key under which the request's response is stored in a bucket
    ///
    /// The fragment never reaches the server, so `a.js#x` and `a.js` share
    /// one entry.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.into()
    }
}

/// Visibility class of a response, mirroring the Fetch standard's types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response
    Basic,
    /// Cross-origin response with CORS headers exposed
    Cors,
    /// Cross-origin response without CORS; body and status hidden
    Opaque,
    /// Network error placeholder
    Error,
}

/// A buffered HTTP response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Reason phrase
    pub status_text: String,
    /// Response type
    pub response_type: ResponseType,
    /// Whether the response is the result of following a redirect
    #[serde(default)]
    pub redirected: bool,
    /// Header name/value pairs in arrival order
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl Response {
    /// Creates a same-origin response with the given status and body
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            status_text: reason_phrase(status).to_string(),
            response_type: ResponseType::Basic,
            redirected: false,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Adds a header, keeping any existing ones
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the response type
    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Marks the response as redirected
    pub fn with_redirected(mut self, redirected: bool) -> Self {
        self.redirected = redirected;
        self
    }

    /// Returns the first header value with the given name (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether the status is in the 2xx range
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Reason phrase for the statuses the worker produces or commonly sees
fn reason_phrase(status: u16) -> &'static str {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("")
}
