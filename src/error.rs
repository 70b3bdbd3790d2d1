//! Error types shared by every fixture component.
//!
//! Deployment failures are deliberately absent: `deploy` reports them through
//! [`crate::fixture::DeploymentOutcome`] so a broken fixture can still be inspected.

use thiserror::Error;

/// Which kind of entry a [`FixtureError::DuplicateName`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateKind {
    /// Two discovered scripts resolved to the same name.
    Script,
    /// The ordered inclusion list names the same script twice.
    Inclusion,
}

impl std::fmt::Display for DuplicateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicateKind::Script => write!(f, "script"),
            DuplicateKind::Inclusion => write!(f, "inclusion"),
        }
    }
}

/// Errors raised by fixture operations.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// Malformed server URL or database name.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The fixture is not in a state that allows the operation.
    #[error("{0}")]
    State(String),

    /// A named resource could not be resolved.
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// Duplicate names under the strict selection policy.
    #[error("Duplicate {kind} name '{name}'")]
    DuplicateName { kind: DuplicateKind, name: String },

    /// The database engine rejected a statement or a connection.
    #[error("{operation} failed: {message}")]
    Execution { operation: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FixtureError {
    pub fn execution(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        FixtureError::Execution {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        FixtureError::NotFound {
            kind,
            name: name.into(),
        }
    }
}

/// Result alias for fixture operations.
pub type Result<T> = std::result::Result<T, FixtureError>;
