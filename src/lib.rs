//! Session and task synchronization for field-inspection clients.
//!
//! `fieldsync` keeps an authenticated identity alive across restarts and
//! requests, and talks to the inspection backend on its behalf.
//!
//! # Module Organization
//!
//! - [`credentials`] - Durable token and profile storage
//! - [`session`] - Session lifecycle, login, logout, forced logout on 401
//! - [`client`] - REST client with bearer and logging middleware
//! - [`detection`] - Image-detection uploads
//! - [`tours`] - Inspections and virtual tours
//! - [`account`] - Profile and password reset
//! - [`view`] - Stale-view guard for async completions
//!
//! Task records, the canonical task collection, and the task editor live in
//! the `fieldsync-tasks` crate.
//!
//! # Example
//!
//! ```no_run
//! use fieldsync::{ClientConfig, SessionManager};
//!
//! # async fn demo() -> fieldsync::Result<()> {
//! let config = ClientConfig::from_file("fieldsync.toml")?.with_env_overrides()?;
//! let sessions = SessionManager::new(&config)?;
//!
//! if !sessions.restore().await?.is_authenticated() {
//!     sessions.login("user@x.com", "secret123").await?;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_debug_implementations)]

pub mod account;
pub mod client;
pub mod config;
pub mod credentials;
pub mod detection;
pub mod error;
#[cfg(feature = "logging")]
pub mod logging;
pub mod session;
pub mod tours;
pub mod types;
pub mod view;

pub use account::AccountClient;
pub use client::ApiClient;
pub use config::ClientConfig;
pub use credentials::CredentialStore;
pub use detection::{DetectionClient, DetectionKind, DetectionReport};
pub use error::{Error, ErrorKind, FieldViolation, Result};
pub use session::{Identity, SessionListener, SessionManager, SessionState};
pub use tours::ToursClient;
pub use view::ViewScope;
