//! Tabula core: a structural meta-model with schema migration.
//!
//! A [`Registry`] owns classes, field groups, fields and types, keeps their
//! ranks contiguous and their hierarchies valid, and reports every structural
//! change to a [`MigrationHandler`]. The
//! [`RelationalMigrationHandler`](migration::RelationalMigrationHandler)
//! turns those changes into relational DDL.

pub mod backend;
pub mod error;
pub mod migration;
pub mod model;
pub mod registry;

pub use backend::{JsonFileBackend, ModelBackend};
pub use error::Error;
pub use migration::{MigrationError, MigrationHandler, NullMigrationHandler};
pub use model::{Attributes, ClassType, Component, ComponentId, ContentHash, FieldType, Kind, Model};
pub use registry::Registry;
