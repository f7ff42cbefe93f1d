//! Bearer token injection and authorization-failure detection.
//!
//! [`BearerAuthMiddleware`] resolves the token through a [`TokenProvider`] on
//! every request, so a token that changed after the client was built (login,
//! logout, re-login) is always the one that gets sent. When a response comes
//! back with status 401 for a request it signed, it awaits the
//! [`UnauthorizedHandler`] before the response continues to the caller.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::client::http_middleware::{
    rooted_path, HttpMiddleware, HttpMiddlewareContext, HttpRequest, HttpResponse,
};
use crate::error::Result;

/// Metadata key recording which credential epoch signed a request.
pub const SIGNED_EPOCH_KEY: &str = "auth.epoch";

/// A bearer token together with the session epoch it belongs to.
///
/// The epoch changes every time a session is established or destroyed, which
/// lets a 401 handler tell whether the failing request was signed with the
/// session that is still current.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerCredential {
    /// Opaque bearer token
    pub token: String,
    /// Session epoch the token belongs to
    pub epoch: u64,
}

impl BearerCredential {
    /// Value for the `Authorization` header.
    pub fn to_header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for BearerCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerCredential")
            .field("token", &"[REDACTED]")
            .field("epoch", &self.epoch)
            .finish()
    }
}

/// Source of the current credential, consulted at send time.
pub trait TokenProvider: Send + Sync {
    /// The credential to sign the next request with, if any.
    fn current_credential(&self) -> Option<BearerCredential>;
}

/// Reaction to a 401 response on a signed request.
#[async_trait]
pub trait UnauthorizedHandler: Send + Sync {
    /// Called with the epoch of the credential that signed the failing request.
    async fn on_unauthorized(&self, signed_epoch: u64);
}

/// Middleware attaching `Authorization: Bearer <token>` to backend requests.
pub struct BearerAuthMiddleware {
    tokens: Arc<dyn TokenProvider>,
    handler: Arc<dyn UnauthorizedHandler>,
    public_paths: Vec<String>,
}

impl BearerAuthMiddleware {
    /// Create the middleware.
    ///
    /// Requests whose endpoint path starts with one of `public_paths` are sent
    /// unsigned and never trigger the unauthorized handler.
    pub fn new(
        tokens: Arc<dyn TokenProvider>,
        handler: Arc<dyn UnauthorizedHandler>,
        public_paths: Vec<String>,
    ) -> Self {
        Self {
            tokens,
            handler,
            public_paths: public_paths.into_iter().map(rooted_path).collect(),
        }
    }

    fn is_public(&self, path: &str) -> bool {
        self.public_paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }
}

impl fmt::Debug for BearerAuthMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerAuthMiddleware")
            .field("public_paths", &self.public_paths)
            .finish()
    }
}

#[async_trait]
impl HttpMiddleware for BearerAuthMiddleware {
    async fn on_request(
        &self,
        request: &mut HttpRequest,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        if self.is_public(&context.path) {
            tracing::trace!(path = %context.path, "Public endpoint, sending unsigned");
            return Ok(());
        }

        if request.has_header("authorization") {
            tracing::warn!(
                "Authorization header already present - skipping bearer injection. \
                Check for duplicate auth configuration."
            );
            return Ok(());
        }

        let Some(credential) = self.tokens.current_credential() else {
            return Ok(());
        };

        request.add_header("Authorization", &credential.to_header_value())?;
        context.set_metadata(SIGNED_EPOCH_KEY, credential.epoch.to_string());
        tracing::trace!("Bearer token injected into Authorization header");
        Ok(())
    }

    async fn on_response(
        &self,
        response: &mut HttpResponse,
        context: &HttpMiddlewareContext,
    ) -> Result<()> {
        if response.status != 401 {
            return Ok(());
        }

        let signed_epoch = context
            .get_metadata(SIGNED_EPOCH_KEY)
            .and_then(|epoch| epoch.parse::<u64>().ok());

        match signed_epoch {
            Some(epoch) => {
                tracing::warn!(
                    "Authorization rejected for {} {} (epoch {}), forcing logout",
                    context.method,
                    context.path,
                    epoch
                );
                self.handler.on_unauthorized(epoch).await;
            },
            None => {
                tracing::debug!("401 on unsigned request to {}", context.path);
            },
        }
        Ok(())
    }

    fn priority(&self) -> i32 {
        10 // High priority - run early
    }
}
