//! Persistent credential store.
//!
//! # Architecture
//!
//! 1. **[`KeyValueBackend`]** -- dumb durable string storage
//!    ([`FileBackend`] on disk, [`MemoryBackend`] for tests).
//! 2. **[`CredentialStore`]** -- session semantics on top of a backend: the
//!    token and the serialized profile are two entries written together on
//!    login and removed together on logout.
//!
//! A corrupt or partial entry pair is a recoverable condition: [`load`]
//! reports "no session" instead of failing.
//!
//! [`load`]: CredentialStore::load

pub mod backend;
pub mod file;
pub mod memory;

use std::sync::Arc;

pub use backend::KeyValueBackend;
pub use file::FileBackend;
pub use memory::MemoryBackend;

use crate::error::Result;
use crate::types::{Session, UserProfile};

/// Key under which the bearer token is stored.
pub const TOKEN_KEY: &str = "authToken";
/// Key under which the serialized user profile is stored.
pub const USER_KEY: &str = "user";

/// Durable storage for the current [`Session`].
///
/// # Examples
///
/// ```
/// use fieldsync::credentials::CredentialStore;
/// use fieldsync::types::{Session, UserProfile};
///
/// # tokio_test_block(async {
/// let store = CredentialStore::in_memory();
/// let session = Session::new("abc", UserProfile {
///     id: "u1".into(),
///     full_name: "Jane".into(),
///     email: "jane@x.com".into(),
///     image_url: None,
/// });
/// store.save(&session).await.unwrap();
/// assert_eq!(store.load().await.unwrap(), Some(session));
/// store.clear().await.unwrap();
/// assert_eq!(store.load().await.unwrap(), None);
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct CredentialStore {
    backend: Arc<dyn KeyValueBackend>,
}

impl CredentialStore {
    /// Wrap an existing backend.
    pub fn new(backend: Arc<dyn KeyValueBackend>) -> Self {
        Self { backend }
    }

    /// Store backed by files under `dir`.
    pub fn on_disk(dir: impl Into<std::path::PathBuf>) -> Self {
        Self::new(Arc::new(FileBackend::new(dir)))
    }

    /// Store that keeps everything in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Write the token and profile, replacing any previous session.
    ///
    /// If the profile cannot be written the token entry is rolled back so a
    /// half-written pair never survives.
    pub async fn save(&self, session: &Session) -> Result<()> {
        let user_json = serde_json::to_string(&session.user)
            .map_err(|e| crate::Error::storage(format!("failed to serialize profile: {e}")))?;

        self.backend.set(TOKEN_KEY, &session.token).await?;
        if let Err(e) = self.backend.set(USER_KEY, &user_json).await {
            tracing::error!("Failed to store user profile, rolling back token: {}", e);
            if let Err(rollback) = self.backend.remove(TOKEN_KEY).await {
                tracing::warn!("Token rollback failed: {}", rollback);
            }
            return Err(e);
        }
        tracing::debug!(user_id = %session.user.id, "Session persisted");
        Ok(())
    }

    /// Read the last saved session.
    ///
    /// Returns `Ok(None)` when either entry is missing, the token is blank,
    /// or the profile JSON does not parse.
    pub async fn load(&self) -> Result<Option<Session>> {
        let token = self.backend.get(TOKEN_KEY).await?;
        let user = self.backend.get(USER_KEY).await?;

        let (Some(token), Some(user)) = (token, user) else {
            return Ok(None);
        };
        if token.trim().is_empty() {
            tracing::warn!("Stored token is empty, treating as no session");
            return Ok(None);
        }

        match serde_json::from_str::<UserProfile>(&user) {
            Ok(profile) => Ok(Some(Session::new(token, profile))),
            Err(e) => {
                tracing::warn!("Stored user profile is corrupt, treating as no session: {}", e);
                Ok(None)
            },
        }
    }

    /// Remove both entries.
    pub async fn clear(&self) -> Result<()> {
        let token = self.backend.remove(TOKEN_KEY).await;
        let user = self.backend.remove(USER_KEY).await;
        token.and(user)
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore").finish_non_exhaustive()
    }
}
