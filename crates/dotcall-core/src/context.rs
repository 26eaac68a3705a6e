//! Per-call request context handed to every service method.

use std::net::SocketAddr;

use http::{HeaderMap, Method, Uri};

/// What a method can see about the request that reached it.
#[derive(Debug, Clone)]
pub struct Context {
    service: String,
    method: String,
    http_method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
}

impl Context {
    pub fn new(service: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            method: method.into(),
            http_method: Method::POST,
            uri: Uri::default(),
            headers: HeaderMap::new(),
            remote_addr: None,
        }
    }

    /// Copy the request line and headers from `parts`.
    pub fn with_request(mut self, parts: &http::request::Parts) -> Self {
        self.http_method = parts.method.clone();
        self.uri = parts.uri.clone();
        self.headers = parts.headers.clone();
        self
    }

    pub fn with_remote_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.remote_addr = addr;
        self
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn http_method(&self) -> &Method {
        &self.http_method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Shorthand for a header value that is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }
}
