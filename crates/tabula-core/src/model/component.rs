//! The component sum type shared by classes, field groups, fields and types.

use super::class::{ClassDef, ClassType};
use super::field::{FieldDef, FieldGroupDef, FieldType};
use super::text::MultilingualString;
use super::typedef::TypeDef;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Process-unique component identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(pub u64);

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Component kinds, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// A class.
    Class,
    /// A type.
    Type,
    /// A field group.
    FieldGroup,
    /// A field.
    Field,
}

impl Kind {
    /// All kinds in replay order.
    pub const ALL: [Kind; 4] = [Kind::Class, Kind::Type, Kind::FieldGroup, Kind::Field];
}

impl std::fmt::Display for Kind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Kind::Class => write!(f, "class"),
            Kind::Type => write!(f, "type"),
            Kind::FieldGroup => write!(f, "field_group"),
            Kind::Field => write!(f, "field"),
        }
    }
}

impl FromStr for Kind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "class" => Ok(Kind::Class),
            "type" => Ok(Kind::Type),
            "field_group" | "fieldgroup" | "group" => Ok(Kind::FieldGroup),
            "field" => Ok(Kind::Field),
            other => Err(format!("unknown component kind: {other}")),
        }
    }
}

/// Kind-specific payload of a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Class payload.
    Class(ClassDef),
    /// Field group payload.
    FieldGroup(FieldGroupDef),
    /// Field payload.
    Field(FieldDef),
    /// Type payload.
    Type(TypeDef),
}

impl Payload {
    /// The kind of this payload.
    pub fn kind(&self) -> Kind {
        match self {
            Payload::Class(_) => Kind::Class,
            Payload::FieldGroup(_) => Kind::FieldGroup,
            Payload::Field(_) => Kind::Field,
            Payload::Type(_) => Kind::Type,
        }
    }
}

/// Key of the group within which ranks are contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RankGroupKey {
    /// Classes sharing a classtype.
    Classes(ClassType),
    /// Types of one class.
    Types(ComponentId),
    /// Field groups of one class.
    FieldGroups(ComponentId),
    /// Fields of one field group.
    Fields(ComponentId),
}

/// Attribute snapshot of a component, excluding identity and timestamps.
///
/// This is what the migration handler receives as the before/after state of
/// a change, and what model backends load and save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    /// Name, unique within the sibling scope.
    pub name: String,
    /// Requested rank. `None` appends to the end of the rank-group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u32>,
    /// Display text.
    #[serde(default, skip_serializing_if = "MultilingualString::is_empty")]
    pub display_text: MultilingualString,
    /// Help text.
    #[serde(default, skip_serializing_if = "MultilingualString::is_empty")]
    pub help_text: MultilingualString,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub payload: Payload,
}

impl Attributes {
    /// Create attributes from a name and payload.
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            rank: None,
            display_text: MultilingualString::new(),
            help_text: MultilingualString::new(),
            payload,
        }
    }

    /// Class attributes.
    pub fn class(name: impl Into<String>, classtype: ClassType) -> Self {
        Self::new(name, Payload::Class(ClassDef { classtype }))
    }

    /// Field group attributes.
    pub fn field_group(name: impl Into<String>, class: ComponentId, selectable: bool) -> Self {
        Self::new(name, Payload::FieldGroup(FieldGroupDef { class, selectable }))
    }

    /// Required field attributes.
    pub fn field(name: impl Into<String>, group: ComponentId, fieldtype: FieldType) -> Self {
        Self::new(
            name,
            Payload::Field(FieldDef {
                group,
                fieldtype,
                optional: false,
                internal: false,
            }),
        )
    }

    /// Type attributes.
    pub fn type_of(name: impl Into<String>, class: ComponentId) -> Self {
        Self::new(name, Payload::Type(TypeDef::new(class)))
    }

    /// Request a specific rank.
    pub fn with_rank(mut self, rank: u32) -> Self {
        self.rank = Some(rank);
        self
    }

    /// Request the first rank.
    pub fn first(self) -> Self {
        self.with_rank(1)
    }

    /// Add display text in a language.
    pub fn with_display(mut self, language: &str, text: &str) -> Self {
        self.display_text = self.display_text.with(language, text);
        self
    }

    /// Add help text in a language.
    pub fn with_help(mut self, language: &str, text: &str) -> Self {
        self.help_text = self.help_text.with(language, text);
        self
    }

    /// Mark a field as optional. No effect on other kinds.
    pub fn optional(mut self) -> Self {
        if let Payload::Field(def) = &mut self.payload {
            def.optional = true;
        }
        self
    }

    /// Mark a field as internal. No effect on other kinds.
    pub fn internal(mut self) -> Self {
        if let Payload::Field(def) = &mut self.payload {
            def.internal = true;
        }
        self
    }

    /// The component kind these attributes describe.
    pub fn kind(&self) -> Kind {
        self.payload.kind()
    }
}

/// A structural component owned by the registry.
///
/// Components refer to one another only by [`ComponentId`].
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub(crate) id: ComponentId,
    pub(crate) name: String,
    pub(crate) rank: u32,
    pub(crate) display_text: MultilingualString,
    pub(crate) help_text: MultilingualString,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
    pub(crate) payload: Payload,
}

impl Component {
    pub(crate) fn from_attributes(id: ComponentId, attributes: Attributes, rank: u32) -> Self {
        let now = Utc::now();
        Self {
            id,
            name: attributes.name,
            rank,
            display_text: attributes.display_text,
            help_text: attributes.help_text,
            created_at: now,
            updated_at: now,
            payload: attributes.payload,
        }
    }

    /// Identifier.
    pub fn id(&self) -> ComponentId {
        self.id
    }

    /// Name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rank within the rank-group.
    pub fn rank(&self) -> u32 {
        self.rank
    }

    /// Display text.
    pub fn display_text(&self) -> &MultilingualString {
        &self.display_text
    }

    /// Help text.
    pub fn help_text(&self) -> &MultilingualString {
        &self.help_text
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Last modification time.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Kind-specific payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Component kind.
    pub fn kind(&self) -> Kind {
        self.payload.kind()
    }

    /// Class payload, if this is a class.
    pub fn as_class(&self) -> Option<&ClassDef> {
        match &self.payload {
            Payload::Class(def) => Some(def),
            _ => None,
        }
    }

    /// Field group payload, if this is a field group.
    pub fn as_field_group(&self) -> Option<&FieldGroupDef> {
        match &self.payload {
            Payload::FieldGroup(def) => Some(def),
            _ => None,
        }
    }

    /// Field payload, if this is a field.
    pub fn as_field(&self) -> Option<&FieldDef> {
        match &self.payload {
            Payload::Field(def) => Some(def),
            _ => None,
        }
    }

    /// Type payload, if this is a type.
    pub fn as_type(&self) -> Option<&TypeDef> {
        match &self.payload {
            Payload::Type(def) => Some(def),
            _ => None,
        }
    }

    pub(crate) fn as_type_mut(&mut self) -> Option<&mut TypeDef> {
        match &mut self.payload {
            Payload::Type(def) => Some(def),
            _ => None,
        }
    }

    /// The rank-group this component belongs to.
    pub fn rank_group(&self) -> RankGroupKey {
        match &self.payload {
            Payload::Class(def) => RankGroupKey::Classes(def.classtype),
            Payload::Type(def) => RankGroupKey::Types(def.class),
            Payload::FieldGroup(def) => RankGroupKey::FieldGroups(def.class),
            Payload::Field(def) => RankGroupKey::Fields(def.group),
        }
    }

    /// Snapshot of the current attributes, with the rank filled in.
    pub fn attributes(&self) -> Attributes {
        Attributes {
            name: self.name.clone(),
            rank: Some(self.rank),
            display_text: self.display_text.clone(),
            help_text: self.help_text.clone(),
            payload: self.payload.clone(),
        }
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Deterministic digest of every attribute except the timestamps.
    pub fn content_digest(&self) -> blake3::Hash {
        let mut digest = Digest::default();
        digest.u64(self.id.0);
        digest.str(&self.kind().to_string());
        digest.str(&self.name);
        digest.u64(u64::from(self.rank));
        digest.text(&self.display_text);
        digest.text(&self.help_text);

        match &self.payload {
            Payload::Class(def) => digest.str(&def.classtype.to_string()),
            Payload::FieldGroup(def) => {
                digest.u64(def.class.0);
                digest.flag(def.selectable);
            }
            Payload::Field(def) => {
                digest.u64(def.group.0);
                digest.fieldtype(&def.fieldtype);
                digest.flag(def.optional);
                digest.flag(def.internal);
            }
            Payload::Type(def) => {
                digest.u64(def.class.0);
                digest.u64(def.selected_fields.len() as u64);
                for field in &def.selected_fields {
                    digest.u64(field.0);
                }
                digest.u64(def.superiors.len() as u64);
                for (nature, superiors) in &def.superiors {
                    digest.str(&nature.to_string());
                    digest.u64(superiors.len() as u64);
                    for superior in superiors {
                        digest.u64(superior.0);
                    }
                }
            }
        }

        digest.finish()
    }
}

/// Length-prefixed feeder so that adjacent values cannot run into each other.
#[derive(Default)]
struct Digest(blake3::Hasher);

impl Digest {
    fn u64(&mut self, value: u64) {
        self.0.update(&value.to_le_bytes());
    }

    fn flag(&mut self, value: bool) {
        self.0.update(&[u8::from(value)]);
    }

    fn str(&mut self, value: &str) {
        self.u64(value.len() as u64);
        self.0.update(value.as_bytes());
    }

    fn text(&mut self, value: &MultilingualString) {
        let pairs: Vec<_> = value.iter().collect();
        self.u64(pairs.len() as u64);
        for (language, text) in pairs {
            self.str(language);
            self.str(text);
        }
    }

    fn fieldtype(&mut self, value: &FieldType) {
        self.str(value.tag());
        match value {
            FieldType::String { length } => self.u64(u64::from(*length)),
            FieldType::DateTime {
                now_on_create,
                now_on_update,
            } => {
                self.flag(*now_on_create);
                self.flag(*now_on_update);
            }
            FieldType::TypeRelation { target } => self.u64(target.0),
            FieldType::TypeRelationAttribute { descriptor, value } => {
                self.u64(descriptor.0);
                self.fieldtype(value);
            }
            FieldType::PrimaryKey | FieldType::Integer | FieldType::Text | FieldType::Boolean => {}
        }
    }

    fn finish(self) -> blake3::Hash {
        self.0.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attributes_json_roundtrip_keeps_kind_tag() {
        let attrs = Attributes::field("title", ComponentId(2), FieldType::string(64))
            .optional()
            .with_display("en", "Title");

        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(json["kind"], "field");
        assert_eq!(json["fieldtype"]["type"], "string");

        let decoded: Attributes = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, attrs);
    }

    #[test]
    fn test_digest_ignores_timestamps() {
        let mut a = Component::from_attributes(
            ComponentId(1),
            Attributes::class("article", ClassType::Entity),
            1,
        );
        let b = a.clone();
        a.touch();
        a.created_at = a.updated_at;

        assert_eq!(a.content_digest(), b.content_digest());
    }

    #[test]
    fn test_digest_tracks_attribute_changes() {
        let a = Component::from_attributes(
            ComponentId(1),
            Attributes::class("article", ClassType::Entity),
            1,
        );
        let mut b = a.clone();
        b.display_text = b.display_text.with("en", "Article");

        assert_ne!(a.content_digest(), b.content_digest());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Class".parse::<Kind>().unwrap(), Kind::Class);
        assert_eq!("fieldgroup".parse::<Kind>().unwrap(), Kind::FieldGroup);
        assert!("widget".parse::<Kind>().is_err());
    }
}
