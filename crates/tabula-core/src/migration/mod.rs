//! Migration protocol between the registry and a backing schema.
//!
//! The registry reports every structural delta to a [`MigrationHandler`]:
//!
//! | before | after | meaning  |
//! |--------|-------|----------|
//! | `None` | `Some`| creation |
//! | `Some` | `None`| deletion |
//! | `Some` | `Some`| update   |
//!
//! A handler either applies a delta completely or refuses it; the registry
//! undoes its own mutation on refusal.
//!
//! # Example
//!
//! ```
//! use tabula_core::migration::{MemorySchema, RelationalConfig, RelationalMigrationHandler};
//! use tabula_core::model::{Attributes, ClassType};
//! use tabula_core::Registry;
//!
//! let handler = RelationalMigrationHandler::new(MemorySchema::new(), RelationalConfig::default())?;
//! let mut registry = Registry::new(handler);
//! registry.create(Attributes::class("article", ClassType::Entity))?;
//!
//! assert!(registry.handler().connection().has_table("article"));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod columns;
pub mod config;
pub mod connection;
pub mod ddl;
pub mod error;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod naming;
pub mod relational;

pub use config::RelationalConfig;
pub use connection::{MemorySchema, SchemaConnection, TableState, TriggerState};
pub use ddl::{ColumnDef, Ident, Statement, TriggerEvent};
pub use error::{MigrationError, SqlError};
#[cfg(feature = "mysql")]
pub use mysql::MySqlSchema;
pub use relational::RelationalMigrationHandler;

use crate::model::{Attributes, ComponentId, ContentHash, Model};

/// Receives structural deltas and applies or refuses them.
pub trait MigrationHandler {
    /// Apply one delta.
    ///
    /// For creations the component is already in `model`; for deletions it is
    /// still there. Either the whole change is applied or none of it is.
    fn register_change(
        &mut self,
        model: &Model,
        id: ComponentId,
        before: Option<&Attributes>,
        after: Option<&Attributes>,
    ) -> Result<(), MigrationError>;

    /// Record the content hash after a committed change. Advisory only.
    fn register_model_state(&mut self, _model: &Model, _hash: ContentHash) {}
}

impl<H: MigrationHandler + ?Sized> MigrationHandler for Box<H> {
    fn register_change(
        &mut self,
        model: &Model,
        id: ComponentId,
        before: Option<&Attributes>,
        after: Option<&Attributes>,
    ) -> Result<(), MigrationError> {
        (**self).register_change(model, id, before, after)
    }

    fn register_model_state(&mut self, model: &Model, hash: ContentHash) {
        (**self).register_model_state(model, hash)
    }
}

/// A delta classified by which states are present.
#[derive(Debug, Clone, Copy)]
pub enum Change<'a> {
    /// The component was created.
    Create(&'a Attributes),
    /// The component is being deleted.
    Delete(&'a Attributes),
    /// The component's attributes changed.
    Update {
        /// State before.
        before: &'a Attributes,
        /// State after.
        after: &'a Attributes,
    },
}

impl<'a> Change<'a> {
    /// Classify a before/after pair.
    pub fn classify(
        id: ComponentId,
        before: Option<&'a Attributes>,
        after: Option<&'a Attributes>,
    ) -> Result<Self, MigrationError> {
        match (before, after) {
            (None, None) => Err(MigrationError::EmptyChange { id }),
            (None, Some(after)) => Ok(Change::Create(after)),
            (Some(before), None) => Ok(Change::Delete(before)),
            (Some(before), Some(after)) => Ok(Change::Update { before, after }),
        }
    }
}

/// Handler that accepts every change without side effects.
#[derive(Debug, Clone, Default)]
pub struct NullMigrationHandler {
    last_state: Option<ContentHash>,
}

impl NullMigrationHandler {
    /// Create a handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last hash reported through [`MigrationHandler::register_model_state`].
    pub fn last_state(&self) -> Option<ContentHash> {
        self.last_state
    }
}

impl MigrationHandler for NullMigrationHandler {
    fn register_change(
        &mut self,
        _model: &Model,
        id: ComponentId,
        before: Option<&Attributes>,
        after: Option<&Attributes>,
    ) -> Result<(), MigrationError> {
        Change::classify(id, before, after).map(|_| ())
    }

    fn register_model_state(&mut self, _model: &Model, hash: ContentHash) {
        self.last_state = Some(hash);
    }
}
