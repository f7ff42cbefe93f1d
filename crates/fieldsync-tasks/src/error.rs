//! Error types for task operations.
//!
//! Provides [`TaskError`]. [`TaskError::kind`] maps every variant onto the
//! same categories as [`fieldsync::ErrorKind`], so callers present task
//! failures the same way as any other request failure.

use std::fmt;

use fieldsync::ErrorKind;

use crate::types::Violation;

/// Errors that can occur during task operations.
///
/// # Examples
///
/// ```
/// use fieldsync::ErrorKind;
/// use fieldsync_tasks::TaskError;
///
/// let err = TaskError::NotFound {
///     task_id: "missing-task".to_string(),
/// };
/// assert_eq!(err.kind(), ErrorKind::Validation);
/// assert!(err.to_string().contains("missing-task"));
/// ```
#[derive(Debug)]
pub enum TaskError {
    /// The draft or patch failed local validation. Nothing was sent.
    Invalid {
        /// Every problem found, in field order.
        violations: Vec<Violation>,
    },

    /// No task with this id in the canonical collection.
    NotFound {
        /// The id that was looked up.
        task_id: String,
    },

    /// A submission from the same surface is still in flight.
    SubmissionInProgress,

    /// The request failed (authentication, network, or server).
    Api(fieldsync::Error),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid { violations } => {
                let fields: Vec<_> = violations.iter().map(|v| v.field).collect();
                write!(f, "invalid task: missing or invalid {}", fields.join(", "))
            },
            Self::NotFound { task_id } => write!(f, "task not found: {task_id}"),
            Self::SubmissionInProgress => write!(f, "a submission is already in progress"),
            Self::Api(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }
}

impl From<fieldsync::Error> for TaskError {
    fn from(err: fieldsync::Error) -> Self {
        Self::Api(err)
    }
}

impl TaskError {
    /// Category of this error.
    ///
    /// - [`ErrorKind::Validation`]: `Invalid`, `NotFound`, `SubmissionInProgress`
    /// - anything else: the kind of the wrapped request error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Invalid { .. } | Self::NotFound { .. } | Self::SubmissionInProgress => {
                ErrorKind::Validation
            },
            Self::Api(err) => err.kind(),
        }
    }

    /// Whether a user-initiated retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Api(err) if err.is_retryable())
    }

    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Invalid { violations } => violations
                .first()
                .map(|v| v.message.clone())
                .unwrap_or_else(|| "Please fill in all required fields.".to_string()),
            Self::NotFound { .. } => "This task no longer exists.".to_string(),
            Self::SubmissionInProgress => "Please wait for the current request to finish.".to_string(),
            Self::Api(err) => err.user_message(),
        }
    }
}

/// Result alias for task operations.
pub type TaskResult<T> = std::result::Result<T, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = TaskError::NotFound {
            task_id: "abc".to_string(),
        };
        assert_eq!(err.to_string(), "task not found: abc");

        let err = TaskError::Invalid {
            violations: vec![
                Violation::new("tags", "Add at least one tag"),
                Violation::new("groundFloorImages", "Add at least one ground floor image"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "invalid task: missing or invalid tags, groundFloorImages"
        );
        assert_eq!(err.user_message(), "Add at least one tag");
    }

    #[test]
    fn kinds_follow_wrapped_error() {
        assert_eq!(TaskError::SubmissionInProgress.kind(), ErrorKind::Validation);
        let err = TaskError::from(fieldsync::Error::network("offline"));
        assert_eq!(err.kind(), ErrorKind::Network);
        assert!(err.is_retryable());
        let err = TaskError::from(fieldsync::Error::authentication("expired"));
        assert_eq!(err.kind(), ErrorKind::Authentication);
        assert!(!err.is_retryable());
    }
}
