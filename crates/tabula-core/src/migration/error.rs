//! Migration-specific error types.

use crate::model::ComponentId;
use thiserror::Error;

/// Errors reported by a schema connection for a single statement.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SqlError {
    /// The object being created already exists.
    #[error("{object} already exists")]
    AlreadyExists {
        /// The clashing object.
        object: String,
    },

    /// The object being altered or dropped does not exist.
    #[error("{object} does not exist")]
    NotFound {
        /// The missing object.
        object: String,
    },

    /// Any other failure.
    #[error("{message}")]
    Failed {
        /// Server-provided message.
        message: String,
    },
}

/// Reasons a migration handler refuses a change.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Neither a before nor an after state was given.
    #[error("change to {id} has neither a before nor an after state")]
    EmptyChange {
        /// The component concerned.
        id: ComponentId,
    },

    /// The delta cannot be expressed as a schema change.
    #[error("unsupported change to {id}: {what}")]
    Unsupported {
        /// The component concerned.
        id: ComponentId,
        /// What was attempted.
        what: String,
    },

    /// A name cannot be used as an SQL identifier.
    #[error("invalid identifier: {name:?}")]
    InvalidIdentifier {
        /// The rejected name.
        name: String,
    },

    /// A name collides with a permanent table.
    #[error("{name} is reserved")]
    ReservedName {
        /// The rejected name.
        name: String,
    },

    /// The model lacks something the change depends on.
    #[error("cannot resolve {id}: {reason}")]
    MissingContext {
        /// The component concerned.
        id: ComponentId,
        /// What is missing.
        reason: String,
    },

    /// A statement failed.
    #[error("statement failed: {statement}: {source}")]
    Statement {
        /// Rendered statement.
        statement: String,
        /// Connection error.
        #[source]
        source: SqlError,
    },

    /// The handler declined the change for another reason.
    #[error("refused: {reason}")]
    Refused {
        /// Why.
        reason: String,
    },
}
