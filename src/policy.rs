//! Pure caching policy
//!
//! Everything the worker decides about a request or response lives here,
//! free of any storage or network handle, so it can be checked without a
//! running host.

use reqwest::{Method, Url};

use crate::http::{Request, Response, ResponseType};

/// Status of the synthesized offline response
pub const OFFLINE_STATUS: u16 = 408;

/// Body of the synthesized offline response
pub const OFFLINE_BODY: &str = "Network error happened";

/// URL schemes used by browser extensions
const EXTENSION_SCHEMES: [&str; 4] = [
    "chrome-extension",
    "moz-extension",
    "safari-extension",
    "safari-web-extension",
];

/// Whether the URL belongs to a browser extension
pub fn is_extension_url(url: &Url) -> bool {
    EXTENSION_SCHEMES.contains(&url.scheme())
}

/// Whether the URL points at a source map
pub fn is_source_map(url: &Url) -> bool {
    url.path().ends_with(".map")
}

/// Whether the URL has the same origin as the worker
pub fn is_same_origin(url: &Url, origin: &Url) -> bool {
    url.origin() == origin.origin()
}

/// Whether the request path falls under one of the cacheable prefixes
pub fn matches_prefix(url: &Url, prefixes: &[String]) -> bool {
    let path = url.path();
    prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
}

/// Decides whether the worker intercepts a request at all
///
/// Only GET requests to the worker's own origin whose path sits under a
/// cacheable prefix are intercepted; source maps and extension URLs never are.
pub fn should_intercept(request: &Request, origin: &Url, prefixes: &[String]) -> bool {
    request.method == Method::GET
        && !is_extension_url(&request.url)
        && is_same_origin(&request.url, origin)
        && !is_source_map(&request.url)
        && matches_prefix(&request.url, prefixes)
}

/// Whether a network response may be stored in the bucket
///
/// Requires status 200 and a same-origin (`basic`) type. Redirected
/// responses are not stored: replaying them from cache would serve the
/// redirect target's body under the original URL.
pub fn is_cacheable_response(response: &Response) -> bool {
    response.status == 200 && response.response_type == ResponseType::Basic && !response.redirected
}

/// Whether a response counts as a successful pre-cache during install
pub fn is_precacheable(response: &Response) -> bool {
    response.ok() && response.response_type != ResponseType::Opaque
}

/// Response returned when neither cache nor network can answer
pub fn offline_response() -> Response {
    Response::new(OFFLINE_STATUS, OFFLINE_BODY).with_header("Content-Type", "text/plain")
}
