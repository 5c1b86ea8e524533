//! Structural meta-model: classes, field groups, fields and types.
//!
//! Components are stored in a [`Model`] arena and refer to each other by
//! [`ComponentId`]. All mutation goes through the registry.

mod class;
mod component;
mod field;
mod hash;
#[allow(clippy::module_inception)]
mod model;
mod text;
mod typedef;

pub use class::{AttachPolicy, ClassDef, ClassType, HierarchyRules, Nature};
pub use component::{Attributes, Component, ComponentId, Kind, Payload, RankGroupKey};
pub use field::{FieldDef, FieldGroupDef, FieldType};
pub use hash::ContentHash;
pub use model::Model;
pub use text::MultilingualString;
pub use typedef::TypeDef;
