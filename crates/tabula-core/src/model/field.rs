//! Field groups, fields and field types.

use super::component::ComponentId;
use serde::{Deserialize, Serialize};

/// Payload of a field group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldGroupDef {
    /// Owning class.
    pub class: ComponentId,
    /// Whether the fields of this group are selectable by types.
    ///
    /// Fields of a non-selectable group are always present on every type.
    #[serde(default)]
    pub selectable: bool,
}

/// Field data types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    /// The table's primary key.
    PrimaryKey,
    /// Signed integer.
    Integer,
    /// String bounded to `length` characters.
    String {
        /// Maximum length.
        length: u32,
    },
    /// Unbounded text.
    Text,
    /// Boolean value.
    Boolean,
    /// Date and time.
    DateTime {
        /// Populate with the current time on insert.
        #[serde(default)]
        now_on_create: bool,
        /// Populate with the current time on update.
        #[serde(default)]
        now_on_update: bool,
    },
    /// Descriptor of a typed relation from the owning class to a type.
    TypeRelation {
        /// Target type.
        target: ComponentId,
    },
    /// Attribute carried by a typed relation.
    TypeRelationAttribute {
        /// The descriptor field this attribute attaches to.
        descriptor: ComponentId,
        /// Value type of the attribute (must be a scalar type).
        value: Box<FieldType>,
    },
}

impl FieldType {
    /// Bounded string of the given length.
    pub fn string(length: u32) -> Self {
        FieldType::String { length }
    }

    /// Date and time without automatic population.
    pub fn datetime() -> Self {
        FieldType::DateTime {
            now_on_create: false,
            now_on_update: false,
        }
    }

    /// Date and time populated on insert.
    pub fn created_at() -> Self {
        FieldType::DateTime {
            now_on_create: true,
            now_on_update: false,
        }
    }

    /// Date and time populated on insert and update.
    pub fn updated_at() -> Self {
        FieldType::DateTime {
            now_on_create: true,
            now_on_update: true,
        }
    }

    /// Relation descriptor targeting a type.
    pub fn type_relation(target: ComponentId) -> Self {
        FieldType::TypeRelation { target }
    }

    /// Attribute of a relation descriptor.
    pub fn type_relation_attribute(descriptor: ComponentId, value: FieldType) -> Self {
        FieldType::TypeRelationAttribute {
            descriptor,
            value: Box::new(value),
        }
    }

    /// Check if this type holds a single plain value.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            FieldType::Integer
                | FieldType::String { .. }
                | FieldType::Text
                | FieldType::Boolean
                | FieldType::DateTime { .. }
        )
    }

    /// Short tag name, used in listings and error messages.
    pub fn tag(&self) -> &'static str {
        match self {
            FieldType::PrimaryKey => "primary_key",
            FieldType::Integer => "integer",
            FieldType::String { .. } => "string",
            FieldType::Text => "text",
            FieldType::Boolean => "boolean",
            FieldType::DateTime { .. } => "date_time",
            FieldType::TypeRelation { .. } => "type_relation",
            FieldType::TypeRelationAttribute { .. } => "type_relation_attribute",
        }
    }
}

/// Payload of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Owning field group.
    pub group: ComponentId,
    /// Data type.
    pub fieldtype: FieldType,
    /// Whether the field may be left empty (and selected by types).
    #[serde(default)]
    pub optional: bool,
    /// Whether the field is hidden from editors.
    #[serde(default)]
    pub internal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_checks() {
        assert!(FieldType::string(64).is_scalar());
        assert!(FieldType::created_at().is_scalar());
        assert!(!FieldType::PrimaryKey.is_scalar());
        assert!(!FieldType::type_relation(ComponentId(3)).is_scalar());
    }

    #[test]
    fn test_field_type_json_shape() {
        let json = serde_json::to_value(FieldType::type_relation_attribute(
            ComponentId(7),
            FieldType::Integer,
        ))
        .unwrap();

        assert_eq!(json["type"], "type_relation_attribute");
        assert_eq!(json["descriptor"], 7);
        assert_eq!(json["value"]["type"], "integer");
    }
}
