//! Mapping from field types to column definitions.

use super::ddl::{ColumnDef, Ident, TriggerEvent};
use crate::model::FieldType;

/// SQL type of surrogate keys and references to them.
pub const SURROGATE_TYPE: &str = "INT UNSIGNED";

/// Expression assigned by timestamp triggers.
pub const NOW: &str = "NOW()";

/// SQL type for a field type, or `None` if the field has no column of its own.
///
/// Primary keys live in the column created with the table, and relation
/// descriptors are stored as rows of the shared relation table.
pub fn sql_type(fieldtype: &FieldType) -> Option<String> {
    match fieldtype {
        FieldType::PrimaryKey | FieldType::TypeRelation { .. } => None,
        FieldType::Integer => Some("INT".to_string()),
        FieldType::String { length } => Some(format!("VARCHAR({length})")),
        FieldType::Text => Some("TEXT".to_string()),
        FieldType::Boolean => Some("BOOLEAN".to_string()),
        FieldType::DateTime { .. } => Some("DATETIME".to_string()),
        FieldType::TypeRelationAttribute { value, .. } => sql_type(value),
    }
}

/// Column specs for a field.
pub fn spec(optional: bool) -> &'static str {
    if optional {
        "NULL"
    } else {
        "NOT NULL"
    }
}

/// Column definition for a field, if it has a column.
pub fn column_for(name: Ident, fieldtype: &FieldType, optional: bool) -> Option<ColumnDef> {
    sql_type(fieldtype).map(|sql_type| ColumnDef::new(name, sql_type, spec(optional)))
}

/// Events on which a field is set to the current time.
pub fn now_events(fieldtype: &FieldType) -> Vec<TriggerEvent> {
    match fieldtype {
        FieldType::DateTime {
            now_on_create,
            now_on_update,
        } => {
            let mut events = Vec::new();
            if *now_on_create {
                events.push(TriggerEvent::Insert);
            }
            if *now_on_update {
                events.push(TriggerEvent::Update);
            }
            events
        }
        FieldType::TypeRelationAttribute { value, .. } => now_events(value),
        _ => Vec::new(),
    }
}

/// Surrogate key column.
pub fn surrogate(name: Ident, auto_increment: bool) -> ColumnDef {
    let spec = if auto_increment {
        "NOT NULL AUTO_INCREMENT"
    } else {
        "NOT NULL"
    };
    ColumnDef::new(name, SURROGATE_TYPE, spec)
}
