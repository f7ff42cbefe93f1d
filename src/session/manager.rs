//! Session manager: restore, login, logout, and forced logout on 401.
//!
//! The manager owns the shared [`ApiClient`]. Its bearer middleware reads the
//! token from the manager's core at send time and reports 401 responses back
//! to it, so the client never holds a captured token.
//!
//! Every state transition (restore, establish, logout) runs under one async
//! mutex. Each established session gets a fresh epoch; a 401 only forces a
//! logout when the request was signed with the epoch that is still current,
//! which makes forced logout happen at most once per session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use http::Method;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::client::api::server_message;
use crate::client::{
    ApiClient, BearerAuthMiddleware, BearerCredential, HttpLoggingMiddleware, HttpResponse,
    TokenProvider, UnauthorizedHandler,
};
use crate::config::ClientConfig;
use crate::credentials::CredentialStore;
use crate::error::{Error, Result};
use crate::session::state::SessionState;
use crate::session::validation::validate_login;
use crate::types::{AuthResponse, Session, UserProfile};

/// Message used when the login endpoint rejects credentials without a body.
pub const LOGIN_FAILED_MESSAGE: &str = "Login failed. Please try again.";

/// Endpoint for password login.
pub const LOGIN_PATH: &str = "/auth/login";

/// Something that must drop authenticated-only state on logout.
pub trait SessionListener: Send + Sync {
    /// Called after the session has been cleared.
    fn on_logout(&self);
}

/// Read access to the signed-in identity.
pub trait Identity: Send + Sync {
    /// Profile of the signed-in user.
    fn current_user(&self) -> Option<UserProfile>;

    /// Id of the signed-in user.
    fn current_user_id(&self) -> Option<String> {
        self.current_user().map(|u| u.id)
    }
}

/// Why a logout happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogoutReason {
    Requested,
    Unauthorized,
}

struct SessionCore {
    store: CredentialStore,
    state: watch::Sender<SessionState>,
    credential: RwLock<Option<BearerCredential>>,
    next_epoch: AtomicU64,
    transition: Mutex<()>,
    listeners: RwLock<Vec<Weak<dyn SessionListener>>>,
    /// A forced logout could not remove the persisted entries.
    stale_on_disk: AtomicBool,
}

impl SessionCore {
    fn new(store: CredentialStore) -> Self {
        let (state, _) = watch::channel(SessionState::Uninitialized);
        Self {
            store,
            state,
            credential: RwLock::new(None),
            next_epoch: AtomicU64::new(1),
            transition: Mutex::new(()),
            listeners: RwLock::new(Vec::new()),
            stale_on_disk: AtomicBool::new(false),
        }
    }

    fn set_state(&self, next: SessionState) {
        let previous = self.state.send_replace(next);
        tracing::debug!(
            "Session state {} -> {}",
            previous.label(),
            self.state.borrow().label()
        );
    }

    /// Install `session` in memory. Caller holds the transition lock and has
    /// already persisted it.
    fn activate(&self, session: Session) -> bool {
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);
        *self.credential.write() = Some(BearerCredential {
            token: session.token.clone(),
            epoch,
        });
        let replaced = self.state.borrow().is_authenticated();
        // Callers save the session first, which overwrites any leftovers.
        self.stale_on_disk.store(false, Ordering::Release);
        self.set_state(SessionState::Authenticated(session));
        replaced
    }

    /// Clear the session. Caller holds the transition lock.
    ///
    /// A requested logout whose entries cannot be removed keeps the session
    /// and returns the storage error, so memory and disk never disagree. A
    /// forced logout always ends anonymous; leftover entries are removed on
    /// the next [`logout`](SessionManager::logout).
    async fn clear_locked(&self, reason: LogoutReason) -> Result<()> {
        if !self.state.borrow().is_authenticated() {
            if self.stale_on_disk.load(Ordering::Acquire) {
                self.store.clear().await?;
                self.stale_on_disk.store(false, Ordering::Release);
                tracing::info!("Removed session entries left by a forced logout");
            } else {
                tracing::debug!(?reason, "Logout requested without a session, ignoring");
            }
            return Ok(());
        }

        // Stop signing before anything else so no request goes out with the
        // token being torn down.
        let previous = self.credential.write().take();
        if let Err(e) = self.store.clear().await {
            tracing::error!("Failed to clear persisted session: {}", e);
            if reason == LogoutReason::Requested {
                *self.credential.write() = previous;
                return Err(e);
            }
            self.stale_on_disk.store(true, Ordering::Release);
        }
        self.set_state(SessionState::Anonymous);
        self.notify_logout();

        match reason {
            LogoutReason::Requested => tracing::info!("Logged out"),
            LogoutReason::Unauthorized => {
                tracing::warn!("Session rejected by server, logged out")
            },
        }
        Ok(())
    }

    fn notify_logout(&self) {
        let listeners: Vec<_> = {
            let mut guard = self.listeners.write();
            guard.retain(|l| l.strong_count() > 0);
            guard.iter().filter_map(Weak::upgrade).collect()
        };
        for listener in listeners {
            listener.on_logout();
        }
    }
}

impl TokenProvider for SessionCore {
    fn current_credential(&self) -> Option<BearerCredential> {
        self.credential.read().clone()
    }
}

#[async_trait]
impl UnauthorizedHandler for SessionCore {
    async fn on_unauthorized(&self, signed_epoch: u64) {
        let _guard = self.transition.lock().await;
        let current = self.credential.read().as_ref().map(|c| c.epoch);
        if current != Some(signed_epoch) {
            tracing::debug!(
                signed_epoch,
                ?current,
                "Ignoring 401 for a session that is no longer current"
            );
            return;
        }
        if let Err(e) = self.clear_locked(LogoutReason::Unauthorized).await {
            tracing::error!("Forced logout failed: {}", e);
        }
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OAuthLoginRequest<'a> {
    provider: &'a str,
    id_token: &'a str,
}

/// Owner of the authenticated identity and the shared [`ApiClient`].
///
/// Cheap to clone; clones share state.
///
/// # Examples
///
/// ```no_run
/// use fieldsync::config::ClientConfig;
/// use fieldsync::session::SessionManager;
///
/// # async fn demo() -> fieldsync::Result<()> {
/// let config = ClientConfig::from_file("fieldsync.toml")?;
/// let sessions = SessionManager::new(&config)?;
/// sessions.restore().await?;
/// if !sessions.state().is_authenticated() {
///     let user = sessions.login("user@x.com", "secret123").await?;
///     println!("signed in as {}", user.full_name);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionManager {
    core: Arc<SessionCore>,
    api: ApiClient,
}

impl SessionManager {
    /// Create a manager persisting to `config.credentials_dir`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Self::with_store(config, CredentialStore::on_disk(config.credentials_dir.clone()))
    }

    /// Create a manager with an explicit credential store.
    pub fn with_store(config: &ClientConfig, store: CredentialStore) -> Result<Self> {
        let core = Arc::new(SessionCore::new(store));
        let bearer = BearerAuthMiddleware::new(
            core.clone(),
            core.clone(),
            config.auth_paths.clone(),
        );
        let api = ApiClient::builder(config)
            .middleware(Arc::new(bearer))
            .middleware(Arc::new(
                HttpLoggingMiddleware::new().with_withheld_paths(config.auth_paths.clone()),
            ))
            .build()?;
        Ok(Self { core, api })
    }

    /// Shared client whose requests carry the current session token.
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Credential store backing this manager.
    pub fn credentials(&self) -> &CredentialStore {
        &self.core.store
    }

    /// Current state snapshot.
    pub fn state(&self) -> SessionState {
        self.core.state.borrow().clone()
    }

    /// True until [`restore`](Self::restore) has finished.
    pub fn is_loading(&self) -> bool {
        self.core.state.borrow().is_loading()
    }

    /// Observe state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.core.state.subscribe()
    }

    /// Wait until restoration has finished and return the settled state.
    pub async fn wait_until_ready(&self) -> SessionState {
        let mut rx = self.core.state.subscribe();
        let settled = match rx.wait_for(|state| !state.is_loading()).await {
            Ok(state) => SessionState::clone(&state),
            Err(_) => self.state(),
        };
        settled
    }

    /// Register a listener notified after every logout.
    ///
    /// Only a weak reference is kept; dropped listeners are pruned.
    pub fn add_listener<L>(&self, listener: &Arc<L>)
    where
        L: SessionListener + 'static,
    {
        let weak: Weak<dyn SessionListener> = Arc::downgrade(listener) as Weak<dyn SessionListener>;
        self.core.listeners.write().push(weak);
    }

    /// Load the persisted session.
    ///
    /// Runs once; later calls return the current state. A storage failure
    /// leaves the manager anonymous and is returned to the caller.
    pub async fn restore(&self) -> Result<SessionState> {
        let _guard = self.core.transition.lock().await;
        if !matches!(*self.core.state.borrow(), SessionState::Uninitialized) {
            return Ok(self.state());
        }

        self.core.set_state(SessionState::Restoring);
        match self.core.store.load().await {
            Ok(Some(session)) => {
                tracing::info!(user_id = %session.user.id, "Restored persisted session");
                self.core.activate(session);
            },
            Ok(None) => {
                tracing::info!("No persisted session");
                self.core.set_state(SessionState::Anonymous);
            },
            Err(e) => {
                tracing::error!("Failed to read persisted session: {}", e);
                self.core.set_state(SessionState::Anonymous);
                return Err(e);
            },
        }
        Ok(self.state())
    }

    /// Sign in with email and password.
    ///
    /// Input is validated locally first; nothing is sent when it is invalid.
    /// On any failure the previous state is kept.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
        validate_login(email, password)?;
        let body = LoginRequest {
            email: email.trim(),
            password,
        };
        self.authenticate(LOGIN_PATH, &body).await
    }

    /// Sign in by exchanging a third-party identity token.
    pub async fn login_with_oauth_token(
        &self,
        provider: &str,
        id_token: &str,
    ) -> Result<UserProfile> {
        let provider = provider.trim();
        if provider.is_empty() || provider.contains('/') {
            return Err(Error::invalid_field("provider", "Unknown sign-in provider"));
        }
        if id_token.trim().is_empty() {
            return Err(Error::invalid_field("idToken", "Missing identity token"));
        }
        let body = OAuthLoginRequest { provider, id_token };
        self.authenticate(&format!("/auth/{provider}"), &body).await
    }

    /// Clear the session. A no-op when nobody is signed in.
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.core.transition.lock().await;
        self.core.clear_locked(LogoutReason::Requested).await
    }

    async fn authenticate<B: Serialize>(&self, path: &str, body: &B) -> Result<UserProfile> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| Error::config(format!("failed to encode login request: {e}")))?;
        let response = self.api.exchange(Method::POST, path, Some(bytes)).await?;
        let auth = parse_auth_response(&response)?;
        let session = Session::from(auth);
        let user = session.user.clone();

        let _guard = self.core.transition.lock().await;
        self.core.store.save(&session).await?;
        if self.core.activate(session) {
            // A different session was replaced; drop whatever it loaded.
            self.core.notify_logout();
        }
        tracing::info!(user_id = %user.id, "Logged in");
        Ok(user)
    }
}

fn parse_auth_response(response: &HttpResponse) -> Result<AuthResponse> {
    match response.status {
        200..=299 => {
            let auth: AuthResponse = serde_json::from_slice(&response.body).map_err(|e| {
                Error::server(response.status, format!("malformed login response: {e}"))
            })?;
            if auth.token.trim().is_empty() {
                return Err(Error::server(response.status, "login response carried no token"));
            }
            Ok(auth)
        },
        400..=499 => Err(Error::authentication(
            server_message(&response.body).unwrap_or_else(|| LOGIN_FAILED_MESSAGE.to_string()),
        )),
        status => Err(Error::server(
            status,
            server_message(&response.body).unwrap_or_default(),
        )),
    }
}

impl Identity for SessionManager {
    fn current_user(&self) -> Option<UserProfile> {
        self.core.state.borrow().user().cloned()
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("state", &self.core.state.borrow().label())
            .field("api", &self.api)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use url::Url;

    fn config() -> ClientConfig {
        ClientConfig::new(
            Url::parse("http://127.0.0.1:9/api").unwrap(),
            Url::parse("http://127.0.0.1:9").unwrap(),
        )
    }

    fn user(id: &str) -> UserProfile {
        UserProfile {
            id: id.into(),
            full_name: "Jane".into(),
            email: "jane@x.com".into(),
            image_url: None,
        }
    }

    #[derive(Default)]
    struct CountingListener(AtomicUsize);

    impl SessionListener for CountingListener {
        fn on_logout(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn restore_without_credentials_is_anonymous() {
        let manager = SessionManager::with_store(&config(), CredentialStore::in_memory()).unwrap();
        assert!(manager.is_loading());
        let state = manager.restore().await.unwrap();
        assert_eq!(state, SessionState::Anonymous);
        assert!(!manager.is_loading());
    }

    #[tokio::test]
    async fn restore_loads_saved_session_once() {
        let store = CredentialStore::in_memory();
        store.save(&Session::new("abc", user("u1"))).await.unwrap();
        let manager = SessionManager::with_store(&config(), store.clone()).unwrap();

        manager.restore().await.unwrap();
        assert_eq!(manager.current_user_id().as_deref(), Some("u1"));

        store.clear().await.unwrap();
        let again = manager.restore().await.unwrap();
        assert!(again.is_authenticated());
    }

    #[tokio::test]
    async fn logout_clears_and_notifies() {
        let store = CredentialStore::in_memory();
        store.save(&Session::new("abc", user("u1"))).await.unwrap();
        let manager = SessionManager::with_store(&config(), store.clone()).unwrap();
        let listener = Arc::new(CountingListener::default());
        manager.add_listener(&listener);
        manager.restore().await.unwrap();

        manager.logout().await.unwrap();
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert_eq!(store.load().await.unwrap(), None);
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);

        // Idempotent.
        manager.logout().await.unwrap();
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_unauthorized_is_ignored() {
        let store = CredentialStore::in_memory();
        store.save(&Session::new("abc", user("u1"))).await.unwrap();
        let manager = SessionManager::with_store(&config(), store).unwrap();
        manager.restore().await.unwrap();

        let epoch = manager.core.current_credential().unwrap().epoch;
        manager.core.on_unauthorized(epoch + 1).await;
        assert!(manager.state().is_authenticated());

        manager.core.on_unauthorized(epoch).await;
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(manager.core.current_credential().is_none());
    }

    /// Memory backend whose removals can be made to fail.
    #[derive(Default)]
    struct FlakyBackend {
        inner: crate::credentials::MemoryBackend,
        fail_removes: AtomicBool,
    }

    #[async_trait]
    impl crate::credentials::KeyValueBackend for FlakyBackend {
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: &str) -> Result<()> {
            self.inner.set(key, value).await
        }

        async fn remove(&self, key: &str) -> Result<()> {
            if self.fail_removes.load(Ordering::SeqCst) {
                return Err(Error::storage("disk is read-only"));
            }
            self.inner.remove(key).await
        }
    }

    async fn flaky_manager() -> (Arc<FlakyBackend>, CredentialStore, SessionManager) {
        let backend = Arc::new(FlakyBackend::default());
        let store = CredentialStore::new(backend.clone());
        store.save(&Session::new("abc", user("u1"))).await.unwrap();
        let manager = SessionManager::with_store(&config(), store.clone()).unwrap();
        manager.restore().await.unwrap();
        backend.fail_removes.store(true, Ordering::SeqCst);
        (backend, store, manager)
    }

    #[tokio::test]
    async fn failed_clear_keeps_the_session() {
        let (backend, store, manager) = flaky_manager().await;
        let listener = Arc::new(CountingListener::default());
        manager.add_listener(&listener);

        let err = manager.logout().await.unwrap_err();
        assert!(matches!(err, Error::Storage { .. }));
        assert!(manager.state().is_authenticated());
        assert!(manager.core.current_credential().is_some());
        assert!(store.load().await.unwrap().is_some());
        assert_eq!(listener.0.load(Ordering::SeqCst), 0);

        backend.fail_removes.store(false, Ordering::SeqCst);
        manager.logout().await.unwrap();
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn forced_logout_leftovers_are_removed_by_next_logout() {
        let (backend, store, manager) = flaky_manager().await;

        let epoch = manager.core.current_credential().unwrap().epoch;
        manager.core.on_unauthorized(epoch).await;
        assert_eq!(manager.state(), SessionState::Anonymous);
        assert!(store.load().await.unwrap().is_some());

        backend.fail_removes.store(false, Ordering::SeqCst);
        manager.logout().await.unwrap();
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_login_input_fails_locally() {
        let manager = SessionManager::with_store(&config(), CredentialStore::in_memory()).unwrap();
        let err = manager.login("not-an-email", "123").await.unwrap_err();
        assert!(matches!(err, Error::Validation(ref v) if v.len() == 2));
    }

    #[tokio::test]
    async fn wait_until_ready_resolves_after_restore() {
        let manager = SessionManager::with_store(&config(), CredentialStore::in_memory()).unwrap();
        let waiter = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.wait_until_ready().await })
        };
        manager.restore().await.unwrap();
        assert_eq!(waiter.await.unwrap(), SessionState::Anonymous);
    }

    #[test]
    fn login_rejection_uses_server_message() {
        let rejected = HttpResponse::new(400, br#"{"message":"Invalid credentials"}"#.to_vec());
        let err = parse_auth_response(&rejected).unwrap_err();
        assert_eq!(err.user_message(), "Invalid credentials");
        assert_eq!(err.kind(), crate::error::ErrorKind::Authentication);

        let bare = HttpResponse::new(401, vec![]);
        assert_eq!(parse_auth_response(&bare).unwrap_err().user_message(), LOGIN_FAILED_MESSAGE);

        let outage = HttpResponse::new(503, vec![]);
        assert!(matches!(
            parse_auth_response(&outage).unwrap_err(),
            Error::Server { status: 503, .. }
        ));
    }
}
