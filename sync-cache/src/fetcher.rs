//! Network fetch abstraction for the cache manager.
//!
//! The manager reaches the network only through [`Fetcher`]. An HTTP error
//! *status* is still a response (it gets returned, and possibly cached);
//! a [`FetchError`] means no response arrived at all. The distinction
//! matters: only a connectivity-attributable failure triggers offline
//! fallbacks and mutation queueing.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex};
use sync_core::classify::RequestMeta;
use thiserror::Error;

use crate::region::StoredResponse;

/// Fetch errors.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never reached the origin (connectivity, DNS, timeout).
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// The transport failed for a reason other than connectivity.
    #[error("http error: {0}")]
    Http(String),
}

/// An outgoing request as the cache manager sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    /// Request method, uppercased.
    pub method: String,
    /// Full request URL (absolute or path-only).
    pub url: String,
    /// `Accept` header value, when present.
    pub accept: Option<String>,
    /// Form fields for mutating requests, sent urlencoded.
    pub form: Option<BTreeMap<String, String>>,
}

impl ResourceRequest {
    /// A plain GET.
    pub fn get(url: &str) -> Self {
        Self {
            method: "GET".to_string(),
            url: url.to_string(),
            accept: None,
            form: None,
        }
    }

    /// A GET with an `Accept` header.
    pub fn get_with_accept(url: &str, accept: &str) -> Self {
        Self {
            accept: Some(accept.to_string()),
            ..Self::get(url)
        }
    }

    /// A form-encoded POST.
    pub fn post_form(url: &str, form: BTreeMap<String, String>) -> Self {
        Self {
            method: "POST".to_string(),
            url: url.to_string(),
            accept: None,
            form: Some(form),
        }
    }

    /// The path component of the URL.
    pub fn path(&self) -> &str {
        match self.url.split_once("://") {
            Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or("/"),
            None => &self.url,
        }
    }

    /// The classification view of this request.
    pub fn meta(&self) -> RequestMeta {
        let meta = RequestMeta::new(&self.method, self.path());
        match &self.accept {
            Some(accept) => meta.with_accept(accept),
            None => meta,
        }
    }
}

/// Trait for issuing requests to the network.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue the request and return whatever response arrived.
    async fn fetch(&self, request: &ResourceRequest) -> Result<StoredResponse, FetchError>;
}

/// Fetches over HTTP via reqwest.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Create a fetcher with a fresh client.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &ResourceRequest) -> Result<StoredResponse, FetchError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| FetchError::Http(format!("invalid method: {}", request.method)))?;

        let mut builder = self.client.request(method, &request.url);
        if let Some(accept) = &request.accept {
            builder = builder.header(reqwest::header::ACCEPT, accept);
        }
        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_connect() || e.is_timeout() {
                FetchError::Disconnected(e.to_string())
            } else {
                FetchError::Http(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Http(e.to_string()))?;

        Ok(StoredResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }
}

/// Mock fetcher for testing.
///
/// Allows queueing responses, simulating connectivity loss, and capturing
/// issued requests for verification.
#[derive(Debug, Default)]
pub struct MockFetcher {
    inner: Arc<Mutex<MockFetcherInner>>,
}

#[derive(Debug, Default)]
struct MockFetcherInner {
    requests: Vec<ResourceRequest>,
    response_queue: VecDeque<StoredResponse>,
    offline: bool,
    fail_next_fetch: Option<String>,
}

impl MockFetcher {
    /// Create a new mock fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response to be returned by the next `fetch()` call.
    pub fn queue_response(&self, response: StoredResponse) {
        let mut inner = self.inner.lock().unwrap();
        inner.response_queue.push_back(response);
    }

    /// Simulate connectivity loss: every fetch fails `Disconnected` until
    /// the flag is cleared. Queued responses are left untouched.
    pub fn set_offline(&self, offline: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.offline = offline;
    }

    /// Cause only the next fetch() to fail with a connectivity error.
    pub fn fail_next_fetch(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_fetch = Some(error.to_string());
    }

    /// All requests issued so far.
    pub fn requests(&self) -> Vec<ResourceRequest> {
        let inner = self.inner.lock().unwrap();
        inner.requests.clone()
    }

    /// Number of fetch calls so far.
    pub fn fetch_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.requests.len()
    }

    /// URLs of all requests issued so far.
    pub fn fetched_urls(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.requests.iter().map(|r| r.url.clone()).collect()
    }

    /// Clear all state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockFetcherInner::default();
    }
}

impl Clone for MockFetcher {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &ResourceRequest) -> Result<StoredResponse, FetchError> {
        let mut inner = self.inner.lock().unwrap();
        inner.requests.push(request.clone());

        if let Some(error) = inner.fail_next_fetch.take() {
            return Err(FetchError::Disconnected(error));
        }
        if inner.offline {
            return Err(FetchError::Disconnected("offline".to_string()));
        }

        inner
            .response_queue
            .pop_front()
            .ok_or_else(|| FetchError::Http("no queued response".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sync_core::classify::{classify, ResourceClass};

    #[test]
    fn path_extraction() {
        assert_eq!(ResourceRequest::get("/static/app.css").path(), "/static/app.css");
        assert_eq!(
            ResourceRequest::get("https://host.example/static/app.css").path(),
            "/static/app.css"
        );
        assert_eq!(ResourceRequest::get("https://host.example").path(), "/");
    }

    #[test]
    fn meta_feeds_the_classifier() {
        let req = ResourceRequest::get_with_accept("https://host.example/page/", "text/html");
        assert_eq!(classify(&req.meta()), ResourceClass::Navigation);

        let req = ResourceRequest::get("https://host.example/static/app.css");
        assert_eq!(classify(&req.meta()), ResourceClass::StaticAsset);
    }

    #[test]
    fn post_form_is_mutating() {
        let req = ResourceRequest::post_form("/attendance/save/", BTreeMap::new());
        assert!(req.meta().is_mutating());
    }

    #[tokio::test]
    async fn mock_returns_queued_responses() {
        let fetcher = MockFetcher::new();
        fetcher.queue_response(StoredResponse::new(200, None, b"one".to_vec()));
        fetcher.queue_response(StoredResponse::new(404, None, b"two".to_vec()));

        let r1 = fetcher.fetch(&ResourceRequest::get("/a")).await.unwrap();
        let r2 = fetcher.fetch(&ResourceRequest::get("/b")).await.unwrap();

        assert_eq!(r1.body, b"one");
        assert_eq!(r2.status, 404);
        assert_eq!(fetcher.fetched_urls(), vec!["/a", "/b"]);
    }

    #[tokio::test]
    async fn offline_mode_fails_every_fetch() {
        let fetcher = MockFetcher::new();
        fetcher.queue_response(StoredResponse::new(200, None, b"kept".to_vec()));
        fetcher.set_offline(true);

        let result = fetcher.fetch(&ResourceRequest::get("/a")).await;
        assert!(matches!(result, Err(FetchError::Disconnected(_))));

        // Back online, the queued response is still there.
        fetcher.set_offline(false);
        let response = fetcher.fetch(&ResourceRequest::get("/a")).await.unwrap();
        assert_eq!(response.body, b"kept");
    }

    #[tokio::test]
    async fn fail_next_fetch_affects_one_call() {
        let fetcher = MockFetcher::new();
        fetcher.queue_response(StoredResponse::new(200, None, b"later".to_vec()));
        fetcher.fail_next_fetch("cable unplugged");

        assert!(fetcher.fetch(&ResourceRequest::get("/a")).await.is_err());
        assert!(fetcher.fetch(&ResourceRequest::get("/a")).await.is_ok());
    }

    #[tokio::test]
    async fn empty_queue_is_an_http_error() {
        let fetcher = MockFetcher::new();
        let result = fetcher.fetch(&ResourceRequest::get("/a")).await;
        assert!(matches!(result, Err(FetchError::Http(_))));
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let fetcher1 = MockFetcher::new();
        let fetcher2 = fetcher1.clone();

        fetcher2.queue_response(StoredResponse::new(200, None, b"x".to_vec()));
        fetcher1.fetch(&ResourceRequest::get("/a")).await.unwrap();

        assert_eq!(fetcher2.fetch_count(), 1);
    }
}
