//! Error types shared by every client in the crate.
//!
//! All network-facing operations normalize their failures into [`Error`]
//! before handing them to the caller. [`Error::kind`] maps each variant onto
//! the four user-visible categories (validation, authentication, network,
//! server); storage and configuration problems are reported as
//! [`ErrorKind::Local`] because they never reach the network.

use std::fmt;

use thiserror::Error;

/// Generic message shown when no response arrived.
pub const NETWORK_FALLBACK_MESSAGE: &str = "No response from server. Please check your connection.";

/// Generic message shown when the server rejected a request without a body.
pub const SERVER_FALLBACK_MESSAGE: &str = "Something went wrong. Please try again.";

/// A single locally detected problem with user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Name of the offending field (e.g. `"email"`).
    pub field: &'static str,
    /// Human-readable message for the field.
    pub message: String,
}

impl FieldViolation {
    /// Create a new violation for `field`.
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Coarse error category used by callers to pick a presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or invalid input, detected before any request was sent.
    Validation,
    /// Invalid credentials or an expired/invalid session token.
    Authentication,
    /// No response received (connectivity problem or timeout).
    Network,
    /// The server answered with a non-success status.
    Server,
    /// Local persistence or configuration failure.
    Local,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Authentication => write!(f, "authentication"),
            Self::Network => write!(f, "network"),
            Self::Server => write!(f, "server"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// Errors returned by the session, credential, and HTTP layers.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Locally detected invalid input. Never sent to the network.
    #[error("validation failed: {}", join_violations(.0))]
    Validation(Vec<FieldViolation>),

    /// Credentials were rejected or the session is no longer valid.
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// The request produced no response.
    #[error("network error: {message}")]
    Network { message: String, timed_out: bool },

    /// The server answered with a non-success status.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Durable storage could not be read or written.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Client configuration is invalid.
    #[error("configuration error: {message}")]
    Config { message: String },
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Build a validation error from a single field problem.
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldViolation::new(field, message)])
    }

    /// Build an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Build a network error that was not a timeout.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            timed_out: false,
        }
    }

    /// Build a server error.
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    /// Build a storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Build a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Network { .. } => ErrorKind::Network,
            Self::Server { .. } => ErrorKind::Server,
            Self::Storage { .. } | Self::Config { .. } => ErrorKind::Local,
        }
    }

    /// Whether a user-initiated retry has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(violations) => violations
                .first()
                .map(|v| v.message.clone())
                .unwrap_or_else(|| "Please check the highlighted fields.".to_string()),
            Self::Authentication { message } => message.clone(),
            Self::Network { .. } => NETWORK_FALLBACK_MESSAGE.to_string(),
            Self::Server { message, .. } if !message.is_empty() => message.clone(),
            Self::Server { .. } => SERVER_FALLBACK_MESSAGE.to_string(),
            Self::Storage { .. } | Self::Config { .. } => self.to_string(),
        }
    }

    /// Classify a transport failure from `reqwest`.
    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Network {
                message: "request timed out".to_string(),
                timed_out: true,
            }
        } else if let Some(status) = err.status() {
            Self::server(status.as_u16(), err.to_string())
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::from_reqwest(&err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::storage(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
