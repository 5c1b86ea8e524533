//! Type definitions: named specializations of a class.

use super::class::Nature;
use super::component::ComponentId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Payload of a type component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDef {
    /// The class this type specializes.
    pub class: ComponentId,
    /// Optional fields of the class selected by this type.
    #[serde(default)]
    pub selected_fields: BTreeSet<ComponentId>,
    /// Superior types keyed by relation nature.
    #[serde(default)]
    pub superiors: BTreeMap<Nature, BTreeSet<ComponentId>>,
}

impl TypeDef {
    /// Create a type of the given class with no selection and no superiors.
    pub fn new(class: ComponentId) -> Self {
        Self {
            class,
            selected_fields: BTreeSet::new(),
            superiors: BTreeMap::new(),
        }
    }

    /// Superiors of one nature.
    pub fn superiors_of(&self, nature: Nature) -> impl Iterator<Item = ComponentId> + '_ {
        self.superiors
            .get(&nature)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Check if `superior` is attached under `nature`.
    pub fn has_superior(&self, nature: Nature, superior: ComponentId) -> bool {
        self.superiors
            .get(&nature)
            .is_some_and(|set| set.contains(&superior))
    }

    /// Attach a superior. Returns false if it was already attached.
    pub(crate) fn insert_superior(&mut self, nature: Nature, superior: ComponentId) -> bool {
        self.superiors.entry(nature).or_default().insert(superior)
    }

    /// Detach a superior. Returns false if it was not attached.
    pub(crate) fn remove_superior(&mut self, nature: Nature, superior: ComponentId) -> bool {
        let Some(set) = self.superiors.get_mut(&nature) else {
            return false;
        };
        let removed = set.remove(&superior);
        if set.is_empty() {
            self.superiors.remove(&nature);
        }
        removed
    }

    /// Copy of this definition with selection and superiors cleared.
    pub(crate) fn without_links(&self) -> Self {
        Self::new(self.class)
    }
}
