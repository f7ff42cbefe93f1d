//! Low-level durable key-value backend trait.
//!
//! Backends are dumb string stores with three operations:
//! [`get`](KeyValueBackend::get), [`set`](KeyValueBackend::set) and
//! [`remove`](KeyValueBackend::remove). Session semantics (which keys exist,
//! how the profile is serialized, what counts as "no session") live in
//! [`CredentialStore`](super::CredentialStore).

use async_trait::async_trait;

use crate::error::Result;

/// Durable string key-value storage.
#[async_trait]
pub trait KeyValueBackend: Send + Sync {
    /// Read a value. Absent keys return `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value, overwriting any previous one.
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a value. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<()>;
}
