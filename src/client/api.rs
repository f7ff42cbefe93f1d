//! JSON REST client for the inspection backend.
//!
//! [`ApiClient`] sends every request through its [`HttpMiddlewareChain`] and
//! normalizes every outcome:
//!
//! | Outcome                          | Result                                 |
//! |----------------------------------|----------------------------------------|
//! | 2xx                              | `Ok`, body decoded as JSON             |
//! | 401                              | [`Error::Authentication`]              |
//! | other non-2xx                    | [`Error::Server`] with the body's `error`/`message` |
//! | timeout / connection failure     | [`Error::Network`]                     |

use std::sync::Arc;

use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use http::{HeaderValue, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

use crate::client::http_middleware::{
    HttpMiddleware, HttpMiddlewareChain, HttpMiddlewareContext, HttpRequest, HttpResponse,
};
use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Message used when a 401 carries no body text.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";

/// Cheaply cloneable REST client.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    http: reqwest::Client,
    base_url: Url,
    user_agent: HeaderValue,
    chain: HttpMiddlewareChain,
}

/// Builder for [`ApiClient`].
#[derive(Debug)]
pub struct ApiClientBuilder {
    base_url: Url,
    timeout: std::time::Duration,
    user_agent: String,
    chain: HttpMiddlewareChain,
}

impl ApiClientBuilder {
    /// Install a middleware.
    pub fn middleware(mut self, middleware: Arc<dyn HttpMiddleware>) -> Self {
        self.chain.add(middleware);
        self
    }

    /// Override the request timeout.
    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<ApiClient> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        let user_agent = HeaderValue::from_str(&self.user_agent)
            .map_err(|e| Error::config(format!("invalid user agent: {e}")))?;

        Ok(ApiClient {
            inner: Arc::new(ApiClientInner {
                http,
                base_url: self.base_url,
                user_agent,
                chain: self.chain,
            }),
        })
    }
}

impl ApiClient {
    /// Start building a client from configuration.
    pub fn builder(config: &ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            base_url: config.api_base_url.clone(),
            timeout: config.request_timeout(),
            user_agent: config.user_agent.clone(),
            chain: HttpMiddlewareChain::new(),
        }
    }

    /// Base URL requests are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Resolve an endpoint path (e.g. `/New/GetTask/u1`) against the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self.inner.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Url::parse(&format!("{base}/{path}"))
            .map_err(|e| Error::config(format!("invalid endpoint '{path}': {e}")))
    }

    /// `GET` and decode a JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send(Method::GET, path, None).await?;
        decode(&response)
    }

    /// `GET` with query parameters and decode a JSON body.
    pub async fn get_json_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        let mut url = self.endpoint(path)?;
        url.query_pairs_mut().extend_pairs(query);
        let response = self.send_to(Method::GET, url, path, None).await?;
        decode(&response)
    }

    /// `POST` a JSON body and decode the JSON response.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::POST, path, Some(encode(body)?)).await?;
        decode(&response)
    }

    /// `PUT` a JSON body and decode the JSON response.
    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.send(Method::PUT, path, Some(encode(body)?)).await?;
        decode(&response)
    }

    /// `DELETE`, ignoring any response body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(Method::DELETE, path, None).await.map(|_| ())
    }

    /// Send a request to an endpoint path through the middleware chain.
    ///
    /// Non-2xx statuses are returned as errors.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse> {
        let url = self.endpoint(path)?;
        self.dispatch(method, url, path, body, true).await
    }

    /// Like [`send`](Self::send) but hands back non-2xx responses as `Ok` so
    /// the caller can apply its own status mapping. Only transport failures
    /// are errors.
    pub async fn exchange(
        &self,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse> {
        let url = self.endpoint(path)?;
        self.dispatch(method, url, path, body, false).await
    }

    async fn send_to(
        &self,
        method: Method,
        url: Url,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse> {
        self.dispatch(method, url, path, body, true).await
    }

    async fn dispatch(
        &self,
        method: Method,
        url: Url,
        path: &str,
        body: Option<Vec<u8>>,
        check_status: bool,
    ) -> Result<HttpResponse> {
        let context = HttpMiddlewareContext::new(method.clone(), url.clone(), path);
        let result = match self.execute(method, url, body, &context).await {
            Ok(response) if check_status && !response.is_success() => {
                Err(error_from_response(&response))
            },
            other => other,
        };
        if let Err(error) = &result {
            self.inner.chain.process_error(error, &context).await;
        }
        result
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
        context: &HttpMiddlewareContext,
    ) -> Result<HttpResponse> {
        let mut request = HttpRequest::new(method, url, body);
        request.headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        request.headers.insert(USER_AGENT, self.inner.user_agent.clone());
        if request.body.is_some() {
            request
                .headers
                .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        self.inner.chain.process_request(&mut request, context).await?;

        let mut builder = self
            .inner
            .http
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| Error::from_reqwest(&e))?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| Error::from_reqwest(&e))?;

        let mut response = HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        };
        self.inner.chain.process_response(&mut response, context).await?;
        Ok(response)
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.base_url.as_str())
            .field("chain", &self.inner.chain)
            .finish()
    }
}

fn encode<B: Serialize + ?Sized>(body: &B) -> Result<Vec<u8>> {
    serde_json::to_vec(body).map_err(|e| Error::config(format!("failed to encode request body: {e}")))
}

fn decode<T: DeserializeOwned>(response: &HttpResponse) -> Result<T> {
    // An empty 2xx body decodes as `null`.
    let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        &response.body
    };
    serde_json::from_slice(body).map_err(|e| {
        Error::server(response.status, format!("malformed response body: {e}"))
    })
}

/// Extract the server-provided message from an error body, if any.
///
/// Looks at the `error` field first and `message` second, matching the
/// backend's two error shapes.
pub fn server_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    ["error", "message"].iter().find_map(|key| {
        value
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    })
}

/// Map a non-2xx response onto the error taxonomy.
pub fn error_from_response(response: &HttpResponse) -> Error {
    let message = server_message(&response.body);
    match response.status {
        401 => Error::authentication(message.unwrap_or_else(|| SESSION_EXPIRED_MESSAGE.to_string())),
        status => Error::server(status, message.unwrap_or_default()),
    }
}
