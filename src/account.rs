//! Profile maintenance and password reset.

use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::error::{Error, Result};
use crate::session::validation::{validate_email, validate_new_password};
use crate::types::data_url;

/// Full profile as edited on the account screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountProfile {
    /// Backend id.
    #[serde(alias = "_id", default)]
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub full_name: String,
    /// Login email.
    #[serde(default)]
    pub email: String,
    /// Street address.
    #[serde(default)]
    pub address: String,
    /// City.
    #[serde(default)]
    pub city: String,
    /// Phone number.
    #[serde(default)]
    pub contact: String,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Fields sent by `POST /updateProfile`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    /// Display name.
    pub full_name: String,
    /// Login email.
    pub email: String,
    /// Street address.
    pub address: String,
    /// City.
    pub city: String,
    /// Phone number.
    pub contact: String,
    /// Existing avatar URL, or a data URL for a new one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl ProfileUpdate {
    /// Start an update from the current profile.
    pub fn from_profile(profile: &AccountProfile) -> Self {
        Self {
            full_name: profile.full_name.clone(),
            email: profile.email.clone(),
            address: profile.address.clone(),
            city: profile.city.clone(),
            contact: profile.contact.clone(),
            image: profile.image.clone(),
        }
    }

    /// Replace the avatar with freshly picked image bytes.
    pub fn with_new_image(mut self, mime: &str, bytes: &[u8]) -> Self {
        self.image = Some(data_url(mime, bytes));
        self
    }
}

/// One-time code issued by `POST /auth/forgot-password`.
#[derive(Clone, Deserialize)]
pub struct PasswordResetChallenge {
    #[serde(default)]
    otp: String,
}

impl PasswordResetChallenge {
    /// Whether the code typed by the user matches.
    pub fn verify(&self, entered: &str) -> bool {
        !self.otp.is_empty() && entered.trim() == self.otp
    }
}

impl std::fmt::Debug for PasswordResetChallenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PasswordResetChallenge")
            .field("otp", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize)]
struct ProfileEnvelope {
    user: AccountProfile,
}

#[derive(Deserialize)]
struct MessageEnvelope {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordRequest<'a> {
    email: &'a str,
    new_password: &'a str,
}

/// Account endpoints on the shared API client.
#[derive(Debug, Clone)]
pub struct AccountClient {
    api: ApiClient,
}

impl AccountClient {
    /// Wrap the shared API client.
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Fetch the full profile for `email`.
    pub async fn fetch_profile(&self, email: &str) -> Result<AccountProfile> {
        validate_email(email)?;
        let envelope: ProfileEnvelope = self
            .api
            .get_json_with_query("/users/getusersmobile", &[("email", email.trim())])
            .await?;
        Ok(envelope.user)
    }

    /// Save profile changes.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<()> {
        validate_email(&update.email)?;
        let _: serde_json::Value = self.api.post_json("/updateProfile", update).await?;
        tracing::info!("Profile updated");
        Ok(())
    }

    /// Ask the backend to issue a reset code for `email`.
    pub async fn request_password_reset(&self, email: &str) -> Result<PasswordResetChallenge> {
        validate_email(email)?;
        let challenge: PasswordResetChallenge = self
            .api
            .post_json("/auth/forgot-password", &serde_json::json!({ "email": email.trim() }))
            .await?;
        if challenge.otp.is_empty() {
            return Err(Error::server(200, "Failed to send OTP"));
        }
        Ok(challenge)
    }

    /// Set a new password after the reset code was verified.
    ///
    /// `confirmation` must equal `new_password`, which must satisfy
    /// [`validate_new_password`].
    pub async fn reset_password(
        &self,
        email: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<String> {
        validate_email(email)?;
        validate_new_password(new_password)?;
        if new_password != confirmation {
            return Err(Error::invalid_field("confirmPassword", "Passwords do not match"));
        }
        let body = ResetPasswordRequest {
            email: email.trim(),
            new_password,
        };
        let reply: MessageEnvelope = self.api.put_json("/auth/reset-password", &body).await?;
        tracing::info!("Password reset completed");
        Ok(reply
            .message
            .unwrap_or_else(|| "Password reset successful".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use url::Url;

    fn client(base: &str) -> AccountClient {
        let config = ClientConfig::new(
            Url::parse(base).unwrap(),
            Url::parse("http://127.0.0.1:9").unwrap(),
        );
        AccountClient::new(ApiClient::builder(&config).build().unwrap())
    }

    #[test]
    fn challenge_verifies_code() {
        let challenge: PasswordResetChallenge = serde_json::from_str(r#"{"otp":"12345"}"#).unwrap();
        assert!(challenge.verify("12345"));
        assert!(!challenge.verify("54321"));
        assert!(!format!("{challenge:?}").contains("12345"));
    }

    #[test]
    fn new_image_becomes_data_url() {
        let update = ProfileUpdate::default().with_new_image("image/png", b"abc");
        assert_eq!(update.image.as_deref(), Some("data:image/png;base64,YWJj"));
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.get("fullName").is_some());
    }

    #[tokio::test]
    async fn fetch_profile_passes_email_query() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/users/getusersmobile")
            .match_query(mockito::Matcher::UrlEncoded("email".into(), "jane@x.com".into()))
            .with_status(200)
            .with_body(r#"{"user":{"_id":"u1","fullName":"Jane","email":"jane@x.com","city":"Lahore"}}"#)
            .create_async()
            .await;

        let profile = client(&format!("{}/api", server.url()))
            .fetch_profile("jane@x.com")
            .await
            .unwrap();
        assert_eq!(profile.city, "Lahore");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn reset_password_checks_rules_before_sending() {
        let account = client("http://127.0.0.1:9/api");
        let err = account
            .reset_password("jane@x.com", "weak", "weak")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let err = account
            .reset_password("jane@x.com", "Str0ng!pw", "Str0ng!px")
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Passwords do not match");
    }

    #[tokio::test]
    async fn reset_password_surfaces_server_error() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("PUT", "/api/auth/reset-password")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"email":"jane@x.com","newPassword":"Str0ng!pw"}"#.into(),
            ))
            .with_status(404)
            .with_body(r#"{"error":"User not found"}"#)
            .create_async()
            .await;

        let err = client(&format!("{}/api", server.url()))
            .reset_password("jane@x.com", "Str0ng!pw", "Str0ng!pw")
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "User not found");
        mock.assert_async().await;
    }
}
