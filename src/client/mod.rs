//! HTTP client for the inspection backend.
//!
//! Requests flow through an [`HttpMiddlewareChain`]: bearer injection and
//! 401 detection ([`BearerAuthMiddleware`]) run first, request/response
//! logging ([`HttpLoggingMiddleware`]) last.

pub mod api;
pub mod auth_middleware;
pub mod http_logging_middleware;
pub mod http_middleware;

pub use api::{ApiClient, ApiClientBuilder};
pub use auth_middleware::{
    BearerAuthMiddleware, BearerCredential, TokenProvider, UnauthorizedHandler,
};
pub use http_logging_middleware::HttpLoggingMiddleware;
pub use http_middleware::{
    HttpMiddleware, HttpMiddlewareChain, HttpMiddlewareContext, HttpRequest, HttpResponse,
};
