//! HTTP logging middleware with sensitive header redaction.
//!
//! Redaction is on by default:
//! - `authorization`: logged as "Bearer [REDACTED]"
//! - `cookie` / `set-cookie` / `x-api-key`: logged as "[REDACTED]"
//!
//! Bodies are not logged unless [`with_max_body_bytes`] is set, and bodies of
//! auth endpoints (which carry passwords and identity tokens) are never
//! logged. Auth endpoints are `/auth/` unless [`with_withheld_paths`] says
//! otherwise.
//!
//! [`with_max_body_bytes`]: HttpLoggingMiddleware::with_max_body_bytes
//! [`with_withheld_paths`]: HttpLoggingMiddleware::with_withheld_paths

use std::collections::HashSet;

use async_trait::async_trait;
use http::header::HeaderName;
use http::HeaderMap;

use crate::client::http_middleware::{
    rooted_path, HttpMiddleware, HttpMiddlewareContext, HttpRequest, HttpResponse,
};
use crate::error::{Error, Result};

/// HTTP logging middleware with sensitive header redaction.
#[derive(Debug, Clone)]
pub struct HttpLoggingMiddleware {
    level: tracing::Level,
    redact_headers: HashSet<HeaderName>,
    show_auth_scheme: bool,
    max_body_bytes: Option<usize>,
    withheld_paths: Vec<String>,
}

impl Default for HttpLoggingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpLoggingMiddleware {
    /// Create a logging middleware at DEBUG level with default redactions.
    pub fn new() -> Self {
        let redact_headers = [
            "authorization",
            "cookie",
            "set-cookie",
            "x-api-key",
            "proxy-authorization",
        ]
        .into_iter()
        .map(HeaderName::from_static)
        .collect();

        Self {
            level: tracing::Level::DEBUG,
            redact_headers,
            show_auth_scheme: true,
            max_body_bytes: None,
            withheld_paths: vec!["/auth/".to_string()],
        }
    }

    /// Set the log level for this middleware.
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.level = level;
        self
    }

    /// Add a header to the redaction list.
    pub fn redact_header(mut self, name: HeaderName) -> Self {
        self.redact_headers.insert(name);
        self
    }

    /// Log "Bearer [REDACTED]" (true) or just "[REDACTED]" (false).
    pub fn with_show_auth_scheme(mut self, show: bool) -> Self {
        self.show_auth_scheme = show;
        self
    }

    /// Log up to `max_bytes` of each body.
    pub fn with_max_body_bytes(mut self, max_bytes: usize) -> Self {
        self.max_body_bytes = Some(max_bytes);
        self
    }

    /// Path prefixes whose bodies are never logged, replacing the default.
    pub fn with_withheld_paths(mut self, paths: Vec<String>) -> Self {
        self.withheld_paths = paths.into_iter().map(rooted_path).collect();
        self
    }

    fn is_withheld(&self, path: &str) -> bool {
        self.withheld_paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Redact a header value based on the header name.
    pub fn redact_header_value(&self, name: &HeaderName, value: &str) -> String {
        if !self.redact_headers.contains(name) {
            return value.to_string();
        }

        if name == http::header::AUTHORIZATION && self.show_auth_scheme {
            if let Some((scheme, _)) = value.split_once(' ') {
                return format!("{scheme} [REDACTED]");
            }
        }
        "[REDACTED]".to_string()
    }

    /// Format headers for logging with redaction.
    pub fn format_headers(&self, headers: &HeaderMap) -> String {
        let parts: Vec<String> = headers
            .iter()
            .map(|(name, value)| {
                let value = value.to_str().unwrap_or("<invalid-utf8>");
                format!("{}: {}", name.as_str(), self.redact_header_value(name, value))
            })
            .collect();

        if parts.is_empty() {
            "(no headers)".to_string()
        } else {
            parts.join(", ")
        }
    }

    fn body_preview(&self, body: &[u8], context: &HttpMiddlewareContext) -> String {
        match self.max_body_bytes {
            Some(_) if self.is_withheld(&context.path) => {
                format!(" body={}B (withheld)", body.len())
            },
            Some(max) if !body.is_empty() => {
                let shown = max.min(body.len());
                let preview = String::from_utf8_lossy(&body[..shown]);
                if body.len() > max {
                    format!(" body={}B: {}...", body.len(), preview)
                } else {
                    format!(" body={}B: {}", body.len(), preview)
                }
            },
            _ => format!(" body={}B", body.len()),
        }
    }

    fn emit(&self, line: &str, context: &HttpMiddlewareContext) {
        let request_id = context.request_id.as_str();
        match self.level {
            tracing::Level::TRACE => tracing::trace!(request_id, "{}", line),
            tracing::Level::DEBUG => tracing::debug!(request_id, "{}", line),
            tracing::Level::INFO => tracing::info!(request_id, "{}", line),
            tracing::Level::WARN => tracing::warn!(request_id, "{}", line),
            tracing::Level::ERROR => tracing::error!(request_id, "{}", line),
        }
    }
}

#[async_trait]
impl HttpMiddleware for HttpLoggingMiddleware {
    async fn on_request(
        &self,
        request: &mut HttpRequest,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        let body = request.body.as_deref().unwrap_or_default();
        let line = format!(
            "→ HTTP {} {} | headers: [{}]{}",
            request.method,
            request.url,
            self.format_headers(&request.headers),
            self.body_preview(body, context)
        );
        self.emit(&line, context);
        Ok(())
    }

    async fn on_response(
        &self,
        response: &mut HttpResponse,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        let marker = if response.is_success() { "✓" } else { "✗" };
        let line = format!(
            "{} HTTP {} {} {} in {}ms{}",
            marker,
            response.status,
            context.method,
            context.path,
            context.started.elapsed().as_millis(),
            self.body_preview(&response.body, context)
        );
        self.emit(&line, context);
        Ok(())
    }

    async fn on_error(&self, error: &Error, context: &HttpMiddlewareContext) {
        tracing::warn!(
            request_id = context.request_id.as_str(),
            kind = %error.kind(),
            "HTTP {} {} failed after {}ms: {}",
            context.method,
            context.path,
            context.started.elapsed().as_millis(),
            error
        );
    }

    fn priority(&self) -> i32 {
        90 // Run last on requests so the logged headers are final
    }
}
