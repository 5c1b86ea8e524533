//! Class definitions and classtype hierarchy rules.

use serde::{Deserialize, Serialize};

/// The classtype tag of a class.
///
/// Each classtype declares which hierarchy natures its types may take part in
/// and how those hierarchies are constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassType {
    /// Plain content entities.
    Entity,
    /// Editorial entries that can be nested and translated.
    Entry,
    /// People and accounts.
    Person,
}

/// Semantic label of a hierarchical relation between two types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nature {
    /// Containment (a type nested under another).
    Parent,
    /// A translated variant of the same type.
    Translation,
    /// Identity link between person-like types.
    Identity,
}

/// Which types may be attached as superiors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachPolicy {
    /// The superior must belong to a class of the same classtype.
    SameClassType,
    /// The superior must be the very same type.
    ExactSameType,
}

/// Constraints a classtype places on one hierarchy nature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchyRules {
    /// Which types may be attached as superiors.
    pub attach: AttachPolicy,
    /// Maximum number of edges along a chain of this nature.
    pub max_depth: Option<usize>,
    /// Maximum number of subordinate types a superior may have.
    pub max_children: Option<usize>,
}

impl HierarchyRules {
    const fn new(attach: AttachPolicy, max_depth: Option<usize>, max_children: Option<usize>) -> Self {
        Self {
            attach,
            max_depth,
            max_children,
        }
    }
}

impl ClassType {
    /// All classtypes in rank-group order.
    pub const ALL: [ClassType; 3] = [ClassType::Entity, ClassType::Entry, ClassType::Person];

    /// Rules for a nature, or `None` if this classtype does not declare it.
    pub fn hierarchy_rules(&self, nature: Nature) -> Option<HierarchyRules> {
        use AttachPolicy::*;
        match (self, nature) {
            (ClassType::Entity, Nature::Parent) => {
                Some(HierarchyRules::new(SameClassType, None, None))
            }
            (ClassType::Entry, Nature::Parent) => {
                Some(HierarchyRules::new(SameClassType, Some(4), None))
            }
            (ClassType::Entry, Nature::Translation) => {
                Some(HierarchyRules::new(ExactSameType, Some(1), None))
            }
            (ClassType::Person, Nature::Identity) => {
                Some(HierarchyRules::new(SameClassType, Some(1), Some(1)))
            }
            _ => None,
        }
    }

    /// Natures declared by this classtype.
    pub fn natures(&self) -> Vec<Nature> {
        [Nature::Parent, Nature::Translation, Nature::Identity]
            .into_iter()
            .filter(|n| self.hierarchy_rules(*n).is_some())
            .collect()
    }
}

impl std::fmt::Display for ClassType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClassType::Entity => write!(f, "entity"),
            ClassType::Entry => write!(f, "entry"),
            ClassType::Person => write!(f, "person"),
        }
    }
}

impl std::fmt::Display for Nature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Nature::Parent => write!(f, "parent"),
            Nature::Translation => write!(f, "translation"),
            Nature::Identity => write!(f, "identity"),
        }
    }
}

/// Payload of a class component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDef {
    /// Classtype tag.
    pub classtype: ClassType,
}
