//! HTTP transport abstraction.
//!
//! Adapters speak to their backends through [`HttpClient`], so the wire
//! logic can be driven by in-process fakes in tests and by
//! [`ReqwestClient`](crate::http::ReqwestClient) in production.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
    /// PATCH.
    Patch,
}

impl Method {
    /// Returns the method name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Absolute URL including query string.
    pub url: String,
    /// Headers in insertion order.
    pub headers: Vec<(String, String)>,
    /// Body, empty for GET.
    pub body: Vec<u8>,
}

impl HttpRequest {
    fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Creates a GET request.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Creates a POST request.
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Creates a PUT request.
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::Put, url)
    }

    /// Creates a PATCH request.
    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::Patch, url)
    }

    /// Adds a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a JSON body and the matching content type.
    pub fn json_body<T: Serialize + ?Sized>(mut self, body: &T) -> SyncResult<Self> {
        self.body = serde_json::to_vec(body)?;
        Ok(self.header("Content-Type", "application/json"))
    }

    /// Returns the first header named `name`, case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parses the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> SyncResult<T> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// A received response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a response with a JSON body.
    pub fn json_value(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// Returns true for 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns true if the body is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.body.iter().all(u8::is_ascii_whitespace)
    }

    /// Parses the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> SyncResult<T> {
        serde_json::from_slice(&self.body)
            .map_err(|e| SyncError::protocol(format!("malformed response body: {e}")))
    }

    /// Converts a non-2xx response into the matching error.
    pub fn error_for_status(self) -> SyncResult<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(SyncError::from_status(self.status, &self.body))
        }
    }
}

/// Sends HTTP requests.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request and returns the response, whatever its status.
    ///
    /// Only failures that produce no response are errors.
    async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse>;
}

type Handler = Box<dyn Fn(&HttpRequest) -> SyncResult<HttpResponse> + Send + Sync>;

/// A scripted client for tests.
///
/// Every request is recorded; responses come from the handler closure.
pub struct MockHttpClient {
    handler: Handler,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    /// Creates a client answering with `handler`.
    pub fn new(
        handler: impl Fn(&HttpRequest) -> SyncResult<HttpResponse> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates a client that answers every request with `response`.
    pub fn always(response: HttpResponse) -> Self {
        Self::new(move |_| Ok(response.clone()))
    }

    /// Returns the requests seen so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Returns how many requests used `method`.
    pub fn count(&self, method: Method) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == method)
            .count()
    }
}

impl fmt::Debug for MockHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockHttpClient")
            .field("requests", &self.requests.lock().len())
            .finish()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn send(&self, request: HttpRequest) -> SyncResult<HttpResponse> {
        self.requests.lock().push(request.clone());
        (self.handler)(&request)
    }
}
