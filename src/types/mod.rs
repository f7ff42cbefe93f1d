//! Wire types shared by the session, task, and tour clients.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the backend's
//! JSON field naming. Identifiers accept both `id` and the backend's `_id`.

pub mod media;
pub mod session;

pub use media::{data_url, MediaRef};
pub use session::{AuthResponse, Session, UserProfile};
