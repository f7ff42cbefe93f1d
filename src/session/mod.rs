//! Authenticated identity lifecycle.

pub mod manager;
pub mod state;
pub mod validation;

pub use manager::{Identity, SessionListener, SessionManager, LOGIN_FAILED_MESSAGE};
pub use state::SessionState;
pub use validation::{is_valid_email, validate_login, validate_new_password};
