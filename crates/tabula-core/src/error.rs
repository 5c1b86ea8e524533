//! Core error types.

use crate::migration::MigrationError;
use crate::model::ComponentId;
use thiserror::Error;

/// Registry errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A referenced component does not exist.
    #[error("component {id} does not exist")]
    NotExist {
        /// The missing identifier.
        id: ComponentId,
    },

    /// A name or identifier is already taken in its scope.
    #[error("{name} already exists in {scope}")]
    AlreadyExists {
        /// The duplicate name.
        name: String,
        /// Description of the sibling scope.
        scope: String,
    },

    /// A structural invariant would be violated.
    #[error("check failed: {reason}")]
    CheckFailed {
        /// What was violated.
        reason: String,
    },

    /// The migration handler refused the change.
    #[error("change to component {id} refused: {source}")]
    ChangeRefused {
        /// The component whose change was refused.
        id: ComponentId,
        /// Why the handler refused.
        #[source]
        source: MigrationError,
    },

    /// The operation is not supported.
    #[error("unsupported operation: {operation}")]
    Unsupported {
        /// The rejected operation.
        operation: String,
    },

    /// I/O error from a model backend.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding error from a model backend.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn check(reason: impl Into<String>) -> Self {
        Error::CheckFailed {
            reason: reason.into(),
        }
    }
}
