//! Observable session lifecycle state.

use crate::types::{Session, UserProfile};

/// Lifecycle of the in-memory session.
///
/// `Uninitialized → Restoring → {Anonymous | Authenticated} → Anonymous`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing has been loaded yet.
    #[default]
    Uninitialized,
    /// Persisted credentials are being read.
    Restoring,
    /// No session.
    Anonymous,
    /// A session is active.
    Authenticated(Session),
}

impl SessionState {
    /// True until restoration has finished.
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Uninitialized | Self::Restoring)
    }

    /// True when a session is active.
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    /// The signed-in user, if any.
    pub fn user(&self) -> Option<&UserProfile> {
        self.session().map(|s| &s.user)
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Restoring => "restoring",
            Self::Anonymous => "anonymous",
            Self::Authenticated(_) => "authenticated",
        }
    }
}
