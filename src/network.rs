//! Network access for the worker
//!
//! The worker never talks to reqwest directly; it goes through the
//! `Network` trait so lifecycle handlers can be exercised offline.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Url};
use thiserror::Error;

use crate::http::{Request, Response, ResponseType};

/// Errors that can occur when a request never produced a response
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP transport failed (DNS, connect, TLS, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// No connection to the server could be made
    #[error("Network unavailable: {0}")]
    Offline(String),
}

impl FetchError {
    /// Sorts a reqwest error: failing to connect at all means offline
    fn from_transport(error: reqwest::Error) -> Self {
        if error.is_connect() {
            FetchError::Offline(error.to_string())
        } else {
            FetchError::Http(error)
        }
    }
}

/// Something that can turn a request into a response
pub trait Network: Send + Sync {
    /// Performs the request and buffers the full response
    ///
    /// Any HTTP status counts as success; only transport failures are errors.
    fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, FetchError>> + Send;
}

/// Network access over reqwest
#[derive(Debug, Clone)]
pub struct HttpNetwork {
    /// HTTP client for making requests
    client: Client,
    /// Origin responses are classified against
    origin: Url,
}

impl HttpNetwork {
    /// Creates a network client for a worker served from `origin`
    pub fn new(origin: Url) -> Self {
        Self {
            client: Client::new(),
            origin,
        }
    }

    /// Creates a network client with a custom HTTP client
    pub fn with_client(client: Client, origin: Url) -> Self {
        Self { client, origin }
    }

    /// Creates a network client whose requests give up after `timeout`
    pub fn with_timeout(origin: Url, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, origin))
    }

    /// Classifies a response by where it finally came from
    fn response_type(&self, final_url: &Url) -> ResponseType {
        if final_url.origin() == self.origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        let status = response.status();
        let final_url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
            response_type: self.response_type(&final_url),
            redirected: final_url != request.url,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://example.github.io/").unwrap()
    }

    #[test]
    fn test_same_origin_is_basic() {
        let network = HttpNetwork::new(origin());
        let url = Url::parse("https://example.github.io/assets/app.js").unwrap();
        assert_eq!(network.response_type(&url), ResponseType::Basic);
    }

    #[test]
    fn test_cross_origin_is_cors() {
        let network = HttpNetwork::new(origin());
        let url = Url::parse("https://cdn.example.com/assets/app.js").unwrap();
        assert_eq!(network.response_type(&url), ResponseType::Cors);
    }

    #[test]
    fn test_with_timeout_builds_client() {
        assert!(HttpNetwork::with_timeout(origin(), Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    async fn test_fetch_unreachable_host_is_offline() {
        let local = Url::parse("http://127.0.0.1:9/").unwrap();
        let network = HttpNetwork::with_timeout(local.clone(), Duration::from_secs(2)).unwrap();
        let request = Request::get(local.join("assets/app.js").unwrap());

        let result = network.fetch(&request).await;

        assert!(matches!(result, Err(FetchError::Offline(_))), "{:?}", result);
    }
}
