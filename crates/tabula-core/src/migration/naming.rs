//! Naming rules for tables, constraints and triggers.

use super::ddl::{Ident, TriggerEvent};
use super::error::MigrationError;

/// Shared table holding one row per stored object.
pub const OBJECT_TABLE: &str = "object";

/// Shared table holding hierarchy edges between objects.
pub const RELATION_TABLE: &str = "relation";

/// Primary key column of every generated table.
pub const PRIMARY_KEY: &str = "id";

/// Check if a name collides with a permanent table.
pub fn is_reserved(name: &str) -> bool {
    name.eq_ignore_ascii_case(OBJECT_TABLE) || name.eq_ignore_ascii_case(RELATION_TABLE)
}

/// Table backing a class.
pub fn class_table(class_name: &str) -> Result<Ident, MigrationError> {
    if is_reserved(class_name) {
        return Err(MigrationError::ReservedName {
            name: class_name.to_string(),
        });
    }
    Ident::new(class_name)
}

/// Auxiliary table holding the attributes of a typed relation from a class to
/// a type.
pub fn relation_table(class_name: &str, type_name: &str) -> Result<Ident, MigrationError> {
    Ident::new(format!("{class_name}_to_{type_name}"))
}

/// Foreign key constraint from one table to another.
pub fn foreign_key(source: &Ident, destination: &Ident) -> Result<Ident, MigrationError> {
    Ident::new(format!("fk_{}_{}", source.as_str(), destination.as_str()))
}

/// Trigger for one event on a table.
pub fn trigger(table: &Ident, event: TriggerEvent) -> Result<Ident, MigrationError> {
    Ident::new(format!("{}_{event}_trig", table.as_str()))
}
