//! HTTP transport middleware for request/response transformation.
//!
//! Every request sent by [`ApiClient`](crate::client::ApiClient) flows through
//! an [`HttpMiddlewareChain`]: request hooks run in priority order before the
//! request is sent, response hooks run in reverse order once a response
//! arrives (success or failure status alike), and error hooks observe
//! normalized failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use url::Url;

use crate::error::{Error, Result};

/// Context for HTTP middleware execution.
#[derive(Debug, Clone)]
pub struct HttpMiddlewareContext {
    /// Request ID for correlation
    pub request_id: String,
    /// HTTP method
    pub method: Method,
    /// Full URL being requested
    pub url: Url,
    /// Endpoint path relative to the API base (e.g. `/auth/login`)
    pub path: String,
    /// When the request entered the chain
    pub started: Instant,
    /// Custom metadata
    pub metadata: Arc<parking_lot::RwLock<HashMap<String, String>>>,
}

impl HttpMiddlewareContext {
    /// Create a new HTTP middleware context
    ///
    /// `path` is stored with a leading `/` whether or not the caller gave one.
    pub fn new(method: Method, url: Url, path: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            method,
            url,
            path: rooted_path(path.into()),
            started: Instant::now(),
            metadata: Arc::new(parking_lot::RwLock::new(HashMap::new())),
        }
    }

    /// Set metadata value
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.write().insert(key.into(), value.into());
    }

    /// Get metadata value
    pub fn get_metadata(&self, key: &str) -> Option<String> {
        self.metadata.read().get(key).cloned()
    }
}

/// `path` with exactly one leading `/`.
pub(crate) fn rooted_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

/// Outgoing request as seen by middleware.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Target URL
    pub url: Url,
    /// Request headers
    pub headers: HeaderMap,
    /// Request body
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Create a new HTTP request
    pub fn new(method: Method, url: Url, body: Option<Vec<u8>>) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Add or replace a header. Invalid names or values are rejected.
    pub fn add_header(&mut self, name: &str, value: &str) -> Result<()> {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| Error::config(format!("invalid header name '{name}': {e}")))?;
        let mut value = HeaderValue::from_str(value)
            .map_err(|e| Error::config(format!("invalid value for header '{name}': {e}")))?;
        if name == http::header::AUTHORIZATION {
            value.set_sensitive(true);
        }
        self.headers.insert(name, value);
        Ok(())
    }

    /// Get a header value
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Whether a header is present
    pub fn has_header(&self, name: &str) -> bool {
        self.headers.contains_key(name)
    }
}

/// Received response as seen by middleware.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Create a new HTTP response
    pub fn new(status: u16, body: Vec<u8>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// Whether the status is in the 2xx range
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get a header value
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// HTTP-level middleware trait.
///
/// # Examples
///
/// ```rust
/// use fieldsync::client::http_middleware::{HttpMiddleware, HttpRequest, HttpMiddlewareContext};
/// use async_trait::async_trait;
///
/// struct DeviceHeaderMiddleware {
///     device_id: String,
/// }
///
/// #[async_trait]
/// impl HttpMiddleware for DeviceHeaderMiddleware {
///     async fn on_request(
///         &self,
///         request: &mut HttpRequest,
///         _context: &HttpMiddlewareContext,
///     ) -> fieldsync::Result<()> {
///         request.add_header("X-Device-Id", &self.device_id)
///     }
/// }
/// ```
#[async_trait]
pub trait HttpMiddleware: Send + Sync {
    /// Called before HTTP request is sent
    async fn on_request(
        &self,
        request: &mut HttpRequest,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        let _ = (request, context);
        Ok(())
    }

    /// Called after HTTP response is received, whatever its status
    async fn on_response(
        &self,
        response: &mut HttpResponse,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        let _ = (response, context);
        Ok(())
    }

    /// Called when the request fails (transport error or error status)
    async fn on_error(&self, error: &Error, context: &HttpMiddlewareContext) {
        let _ = (error, context);
    }

    /// Priority for ordering (lower runs first)
    fn priority(&self) -> i32 {
        50
    }

    /// Should this middleware execute for this context?
    fn should_execute(&self, _context: &HttpMiddlewareContext) -> bool {
        true
    }
}

/// Chain of HTTP middleware
#[derive(Clone, Default)]
pub struct HttpMiddlewareChain {
    middlewares: Vec<Arc<dyn HttpMiddleware>>,
}

impl HttpMiddlewareChain {
    /// Create a new HTTP middleware chain
    pub fn new() -> Self {
        Self::default()
    }

    /// Add middleware to the chain
    pub fn add(&mut self, middleware: Arc<dyn HttpMiddleware>) {
        self.middlewares.push(middleware);
        // Stable sort keeps insertion order among equal priorities
        self.middlewares.sort_by_key(|m| m.priority());
    }

    /// Number of installed middleware
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Process request through all middleware
    pub async fn process_request(
        &self,
        request: &mut HttpRequest,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        for middleware in &self.middlewares {
            if middleware.should_execute(context) {
                middleware.on_request(request, context).await?;
            }
        }
        Ok(())
    }

    /// Process response through all middleware (in reverse order)
    pub async fn process_response(
        &self,
        response: &mut HttpResponse,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        for middleware in self.middlewares.iter().rev() {
            if middleware.should_execute(context) {
                middleware.on_response(response, context).await?;
            }
        }
        Ok(())
    }

    /// Notify all middleware of a failure
    pub async fn process_error(&self, error: &Error, context: &HttpMiddlewareContext) {
        for middleware in self.middlewares.iter().rev() {
            if middleware.should_execute(context) {
                middleware.on_error(error, context).await;
            }
        }
    }
}

impl std::fmt::Debug for HttpMiddlewareChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMiddlewareChain")
            .field("count", &self.middlewares.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        priority: i32,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl HttpMiddleware for Recorder {
        async fn on_request(&self, _r: &mut HttpRequest, _c: &HttpMiddlewareContext) -> Result<()> {
            self.log.lock().push(format!("req:{}", self.name));
            Ok(())
        }

        async fn on_response(&self, _r: &mut HttpResponse, _c: &HttpMiddlewareContext) -> Result<()> {
            self.log.lock().push(format!("resp:{}", self.name));
            Ok(())
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    fn context() -> HttpMiddlewareContext {
        HttpMiddlewareContext::new(
            Method::GET,
            Url::parse("http://example.com/api/New/GetTask").unwrap(),
            "/New/GetTask",
        )
    }

    #[tokio::test]
    async fn requests_run_by_priority_and_responses_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut chain = HttpMiddlewareChain::new();
        chain.add(Arc::new(Recorder { name: "late", priority: 90, log: log.clone() }));
        chain.add(Arc::new(Recorder { name: "early", priority: 10, log: log.clone() }));

        let ctx = context();
        let mut request = HttpRequest::new(Method::GET, ctx.url.clone(), None);
        chain.process_request(&mut request, &ctx).await.unwrap();
        let mut response = HttpResponse::new(200, vec![]);
        chain.process_response(&mut response, &ctx).await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["req:early", "req:late", "resp:late", "resp:early"]
        );
    }

    #[test]
    fn authorization_header_is_marked_sensitive() {
        let mut request = HttpRequest::new(Method::GET, context().url, None);
        request.add_header("Authorization", "Bearer abc").unwrap();
        assert!(request.headers.get("authorization").unwrap().is_sensitive());
        assert_eq!(request.get_header("authorization"), Some("Bearer abc"));
    }

    #[test]
    fn context_path_is_rooted() {
        let url = Url::parse("http://example.com/api/auth/login").unwrap();
        let ctx = HttpMiddlewareContext::new(Method::POST, url.clone(), "auth/login");
        assert_eq!(ctx.path, "/auth/login");
        let ctx = HttpMiddlewareContext::new(Method::POST, url, "/auth/login");
        assert_eq!(ctx.path, "/auth/login");
    }

    #[test]
    fn context_metadata() {
        let ctx = context();
        ctx.set_metadata("auth.epoch", "3");
        assert_eq!(ctx.get_metadata("auth.epoch"), Some("3".to_string()));
        assert!(ctx.get_metadata("missing").is_none());
    }
}
