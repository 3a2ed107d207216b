//! Error types for the WOPI authentication flow.

use thiserror::Error;

/// Result type alias for flow operations.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Coarse classification of a [`FlowError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing configuration, or an operation whose
    /// preconditions do not hold. No network call is made.
    Validation,
    /// Connection-level failure talking to the provider.
    Transport,
    /// The provider answered, but not in the expected dialect.
    Protocol,
    /// Explicit abort by the user.
    UserCanceled,
    /// The persistence collaborator failed.
    Storage,
}

/// Everything that can go wrong in the flow.
///
/// Messages are the human-readable lines written to the flow log.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    // ═══════════════════════════════════════════════════════════
    // Validation
    // ═══════════════════════════════════════════════════════════

    /// A provider, bootstrap or connection record failed validation.
    #[error("{message}")]
    Validation {
        /// What is wrong
        message: String,
    },

    /// The requested operation is not enabled for this connection,
    /// or another operation is already running.
    #[error("{0}")]
    NotPermitted(String),

    // ═══════════════════════════════════════════════════════════
    // Network
    // ═══════════════════════════════════════════════════════════

    /// Connection-level failure (DNS, TLS, timeout, reset).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Unexpected status code, header or body.
    #[error("{0}")]
    Protocol(String),

    /// A required `WWW-Authenticate` parameter was absent.
    #[error("No {field} in WWW-Authenticate header")]
    MissingField {
        /// The parameter name
        field: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Sign-in
    // ═══════════════════════════════════════════════════════════

    /// The provider redirected back with an OAuth2 error.
    #[error("Sign-in failed with \"{error}\": {description}")]
    SignInRejected {
        /// `error` parameter
        error: String,
        /// `error_description` parameter
        description: String,
        /// `error_uri` parameter
        uri: String,
    },

    /// The redirect carried neither a code nor an error.
    #[error("Did not find valid auth_code on redir")]
    MissingAuthCode,

    /// The sign-in surface closed before the redirect was captured.
    #[error("Failed to obtain required auth information from sign-in")]
    SignInAbandoned,

    /// The user aborted the operation.
    #[error("User cancelled request")]
    UserCanceled,

    // ═══════════════════════════════════════════════════════════
    // Persistence
    // ═══════════════════════════════════════════════════════════

    /// Reading or writing preferences failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl FlowError {
    /// Shorthand for [`FlowError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for [`FlowError::Protocol`].
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// The coarse kind of this error.
    ///
    /// # Examples
    ///
    /// ```
    /// # use wopi_auth::error::{ErrorKind, FlowError};
    /// assert_eq!(FlowError::MissingAuthCode.kind(), ErrorKind::Protocol);
    /// assert_eq!(FlowError::validation("x").kind(), ErrorKind::Validation);
    /// ```
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::NotPermitted(_) => ErrorKind::Validation,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Protocol(_)
            | Self::MissingField { .. }
            | Self::SignInRejected { .. }
            | Self::MissingAuthCode
            | Self::SignInAbandoned => ErrorKind::Protocol,
            Self::UserCanceled => ErrorKind::UserCanceled,
            Self::Storage(_) => ErrorKind::Storage,
        }
    }

    /// Whether this is a user cancellation rather than a failure.
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::UserCanceled)
    }
}

impl From<reqwest::Error> for FlowError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Transport(format!("request timed out: {error}"))
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl From<serde_json::Error> for FlowError {
    fn from(error: serde_json::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

impl From<std::io::Error> for FlowError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_names_the_parameter() {
        let error = FlowError::MissingField {
            field: "tokenIssuance_uri".to_string(),
        };
        assert_eq!(error.to_string(), "No tokenIssuance_uri in WWW-Authenticate header");
        assert_eq!(error.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn cancellation_is_its_own_kind() {
        assert!(FlowError::UserCanceled.is_cancellation());
        assert_eq!(FlowError::UserCanceled.kind(), ErrorKind::UserCanceled);
        assert!(!FlowError::SignInAbandoned.is_cancellation());
    }

    #[test]
    fn not_permitted_is_a_validation_problem() {
        let error = FlowError::NotPermitted("Refresh is not enabled".to_string());
        assert_eq!(error.kind(), ErrorKind::Validation);
    }
}
