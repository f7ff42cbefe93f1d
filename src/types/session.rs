//! Authenticated identity types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Profile of the signed-in user, as returned by the auth endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Backend user id.
    #[serde(alias = "_id")]
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub full_name: String,

    /// Login email.
    #[serde(default)]
    pub email: String,

    /// Avatar URL.
    #[serde(rename = "image", default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// An authenticated identity plus its bearer token.
///
/// The token is opaque; its `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Signed-in user.
    pub user: UserProfile,
    /// Opaque bearer token.
    pub token: String,
}

impl Session {
    /// Create a session from a token and profile.
    pub fn new(token: impl Into<String>, user: UserProfile) -> Self {
        Self {
            user,
            token: token.into(),
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Body returned by `POST /auth/login` and `POST /auth/{provider}`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    /// Bearer token for subsequent requests.
    pub token: String,
    /// Signed-in user profile.
    pub user: UserProfile,
}

impl From<AuthResponse> for Session {
    fn from(response: AuthResponse) -> Self {
        Session::new(response.token, response.user)
    }
}
