//! The component arena and its structural invariants.

use super::class::{AttachPolicy, Nature};
use super::component::{Attributes, Component, ComponentId, Kind, Payload, RankGroupKey};
use super::field::{FieldDef, FieldType};
use super::hash::ContentHash;
use super::typedef::TypeDef;
use crate::error::Error;
use std::collections::{BTreeMap, HashSet};

/// Every component of a meta-model, keyed by identifier.
///
/// Components reference each other only by id, so superior/subordinate
/// cycles between types are plain lookups rather than live references.
#[derive(Debug, Clone, Default)]
pub struct Model {
    components: BTreeMap<ComponentId, Component>,
}

impl Model {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Check if the model has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Check if a component exists.
    pub fn contains(&self, id: ComponentId) -> bool {
        self.components.contains_key(&id)
    }

    /// Get a component.
    pub fn get(&self, id: ComponentId) -> Result<&Component, Error> {
        self.components.get(&id).ok_or(Error::NotExist { id })
    }

    /// Get a component if it exists.
    pub fn lookup(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    /// Iterate over all components in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    /// Highest identifier in use.
    pub fn max_id(&self) -> Option<ComponentId> {
        self.components.keys().next_back().copied()
    }

    /// List components, optionally of one kind.
    ///
    /// Ranked listings are ordered by kind, then rank-group, then rank;
    /// unranked listings are in id order.
    pub fn list(&self, kind: Option<Kind>, ranked: bool) -> Vec<&Component> {
        let mut out: Vec<&Component> = self
            .components
            .values()
            .filter(|c| kind.map_or(true, |k| c.kind() == k))
            .collect();
        if ranked {
            out.sort_by_key(|c| (c.kind(), c.rank_group(), c.rank(), c.id()));
        }
        out
    }

    /// Find a component by kind and name.
    pub fn find(&self, kind: Kind, name: &str) -> Option<&Component> {
        self.components
            .values()
            .find(|c| c.kind() == kind && c.name() == name)
    }

    /// Members of a rank-group, ordered by rank.
    pub fn rank_group_members(&self, key: RankGroupKey) -> Vec<&Component> {
        let mut members: Vec<&Component> = self
            .components
            .values()
            .filter(|c| c.rank_group() == key)
            .collect();
        members.sort_by_key(|c| (c.rank(), c.id()));
        members
    }

    /// Highest rank in a rank-group (0 when empty).
    pub fn max_rank(&self, key: RankGroupKey) -> u32 {
        self.components
            .values()
            .filter(|c| c.rank_group() == key)
            .map(Component::rank)
            .max()
            .unwrap_or(0)
    }

    /// All distinct rank-groups in use.
    pub fn rank_groups(&self) -> Vec<RankGroupKey> {
        let mut keys: Vec<_> = self.components.values().map(Component::rank_group).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// The class owning a component (a class owns itself).
    pub fn class_of(&self, id: ComponentId) -> Result<ComponentId, Error> {
        let component = self.get(id)?;
        match component.payload() {
            Payload::Class(_) => Ok(id),
            Payload::Type(def) => Ok(def.class),
            Payload::FieldGroup(def) => Ok(def.class),
            Payload::Field(def) => self.class_of(def.group),
        }
    }

    /// Field groups of a class, in rank order.
    pub fn field_groups_of(&self, class: ComponentId) -> Vec<&Component> {
        self.rank_group_members(RankGroupKey::FieldGroups(class))
    }

    /// Types of a class, in rank order.
    pub fn types_of(&self, class: ComponentId) -> Vec<&Component> {
        self.rank_group_members(RankGroupKey::Types(class))
    }

    /// Fields of every group of a class.
    pub fn fields_of_class(&self, class: ComponentId) -> Vec<&Component> {
        self.field_groups_of(class)
            .into_iter()
            .flat_map(|group| self.rank_group_members(RankGroupKey::Fields(group.id())))
            .collect()
    }

    /// Attribute fields attached to a relation descriptor.
    pub fn attributes_of(&self, descriptor: ComponentId) -> Vec<&Component> {
        self.components
            .values()
            .filter(|c| {
                matches!(
                    c.as_field().map(|f| &f.fieldtype),
                    Some(FieldType::TypeRelationAttribute { descriptor: d, .. }) if *d == descriptor
                )
            })
            .collect()
    }

    /// Types that list `id` as a superior, with the nature of each link.
    ///
    /// Self links are not reported.
    pub fn subordinates_of(&self, id: ComponentId) -> Vec<(Nature, ComponentId)> {
        let mut out = Vec::new();
        for component in self.components.values() {
            if component.id() == id {
                continue;
            }
            if let Some(def) = component.as_type() {
                for (nature, superiors) in &def.superiors {
                    if superiors.contains(&id) {
                        out.push((*nature, component.id()));
                    }
                }
            }
        }
        out
    }

    /// Types currently selecting a field.
    pub fn types_selecting(&self, field: ComponentId) -> Vec<ComponentId> {
        self.components
            .values()
            .filter(|c| c.as_type().is_some_and(|t| t.selected_fields.contains(&field)))
            .map(Component::id)
            .collect()
    }

    /// Order-independent digest of the whole model, excluding timestamps.
    pub fn content_hash(&self) -> ContentHash {
        ContentHash::aggregate(self.components.values().map(Component::content_digest))
    }

    // ---------------------------------------------------------------------
    // Invariant checks
    // ---------------------------------------------------------------------

    /// Validate a new component's name and references.
    ///
    /// Type links (selected fields, superiors) are checked separately once the
    /// component is in place, see [`Model::check_type_links`].
    pub(crate) fn check_new(&self, attributes: &Attributes) -> Result<(), Error> {
        if attributes.name.trim().is_empty() {
            return Err(Error::check("component name must not be empty"));
        }

        match &attributes.payload {
            Payload::Class(_) => {}
            Payload::FieldGroup(def) => {
                self.expect_kind(def.class, Kind::Class)?;
            }
            Payload::Type(def) => {
                self.expect_kind(def.class, Kind::Class)?;
            }
            Payload::Field(def) => {
                self.expect_kind(def.group, Kind::FieldGroup)?;
                self.check_fieldtype(def)?;
            }
        }

        self.check_unique_name(attributes)
    }

    fn check_unique_name(&self, attributes: &Attributes) -> Result<(), Error> {
        let (scope, clash) = match &attributes.payload {
            Payload::Class(_) => (
                "classes".to_string(),
                self.find(Kind::Class, &attributes.name).is_some(),
            ),
            Payload::FieldGroup(def) => (
                format!("field groups of class {}", def.class),
                self.field_groups_of(def.class)
                    .iter()
                    .any(|c| c.name() == attributes.name),
            ),
            Payload::Type(def) => (
                format!("types of class {}", def.class),
                self.types_of(def.class)
                    .iter()
                    .any(|c| c.name() == attributes.name),
            ),
            Payload::Field(def) => {
                let class = self.class_of(def.group)?;
                (
                    format!("fields of class {class}"),
                    self.fields_of_class(class)
                        .iter()
                        .any(|c| c.name() == attributes.name),
                )
            }
        };

        if clash {
            return Err(Error::AlreadyExists {
                name: attributes.name.clone(),
                scope,
            });
        }
        Ok(())
    }

    fn check_fieldtype(&self, def: &FieldDef) -> Result<(), Error> {
        match &def.fieldtype {
            FieldType::String { length } if *length == 0 => {
                Err(Error::check("string fields need a positive length"))
            }
            FieldType::TypeRelation { target } => {
                self.expect_kind(*target, Kind::Type).map(|_| ())
            }
            FieldType::TypeRelationAttribute { descriptor, value } => {
                if !value.is_scalar() {
                    return Err(Error::check(format!(
                        "relation attribute value must be scalar, got {}",
                        value.tag()
                    )));
                }
                let descriptor_field = self.expect_kind(*descriptor, Kind::Field)?;
                let Some(FieldType::TypeRelation { target }) =
                    descriptor_field.as_field().map(|f| &f.fieldtype)
                else {
                    return Err(Error::check(format!(
                        "field {descriptor} is not a relation descriptor"
                    )));
                };
                self.expect_kind(*target, Kind::Type)?;
                if self.class_of(*descriptor)? != self.class_of(def.group)? {
                    return Err(Error::check(format!(
                        "relation descriptor {descriptor} belongs to another class"
                    )));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn expect_kind(&self, id: ComponentId, kind: Kind) -> Result<&Component, Error> {
        let component = self.get(id)?;
        if component.kind() != kind {
            return Err(Error::check(format!(
                "component {id} is a {}, expected a {kind}",
                component.kind()
            )));
        }
        Ok(component)
    }

    /// Check that `field` may be selected by a type of `class`.
    pub(crate) fn check_selectable(
        &self,
        class: ComponentId,
        field: ComponentId,
    ) -> Result<(), Error> {
        let component = self.expect_kind(field, Kind::Field)?;
        if self.class_of(field)? != class {
            return Err(Error::check(format!(
                "field {field} does not belong to class {class}"
            )));
        }
        if !component.as_field().is_some_and(|f| f.optional) {
            return Err(Error::check(format!(
                "field {field} ({}) is not optional and cannot be selected",
                component.name()
            )));
        }
        Ok(())
    }

    /// Check one superior link of a type, with the link already in place.
    pub(crate) fn check_superior(
        &self,
        id: ComponentId,
        nature: Nature,
        superior: ComponentId,
    ) -> Result<(), Error> {
        let component = self.expect_kind(id, Kind::Type)?;
        let own_class = component.as_type().map(|t| t.class).ok_or(Error::NotExist { id })?;
        let classtype = self
            .expect_kind(own_class, Kind::Class)?
            .as_class()
            .map(|c| c.classtype)
            .ok_or(Error::NotExist { id: own_class })?;

        let rules = classtype.hierarchy_rules(nature).ok_or_else(|| {
            Error::check(format!("classtype {classtype} does not declare nature {nature}"))
        })?;

        let superior_component = self.expect_kind(superior, Kind::Type)?;

        match rules.attach {
            AttachPolicy::ExactSameType => {
                if superior != id {
                    return Err(Error::check(format!(
                        "{nature} superiors of {id} must be the type itself, got {superior}"
                    )));
                }
                // A self link has no chain to measure.
                return Ok(());
            }
            AttachPolicy::SameClassType => {
                if superior == id {
                    return Err(Error::check(format!(
                        "type {id} cannot be its own {nature} superior"
                    )));
                }
                let superior_class = superior_component
                    .as_type()
                    .map(|t| t.class)
                    .ok_or(Error::NotExist { id: superior })?;
                let superior_classtype = self
                    .get(superior_class)?
                    .as_class()
                    .map(|c| c.classtype)
                    .ok_or(Error::NotExist { id: superior_class })?;
                if superior_classtype != classtype {
                    return Err(Error::check(format!(
                        "{nature} superior {superior} is a {superior_classtype}, expected a {classtype}"
                    )));
                }
            }
        }

        if self.reaches(superior, nature, id) {
            return Err(Error::check(format!(
                "attaching {superior} as {nature} superior of {id} creates a cycle"
            )));
        }

        if let Some(max_depth) = rules.max_depth {
            let depth = self.depth_above(superior, nature) + 1 + self.height_below(id, nature);
            if depth > max_depth {
                return Err(Error::check(format!(
                    "{nature} chain through {id} would be {depth} deep, limit is {max_depth}"
                )));
            }
        }

        if let Some(max_children) = rules.max_children {
            let children = self
                .subordinates_of(superior)
                .into_iter()
                .filter(|(n, _)| *n == nature)
                .count();
            if children > max_children {
                return Err(Error::check(format!(
                    "{superior} would have {children} {nature} subordinates, limit is {max_children}"
                )));
            }
        }

        Ok(())
    }

    fn superiors(&self, id: ComponentId, nature: Nature) -> Vec<ComponentId> {
        self.lookup(id)
            .and_then(Component::as_type)
            .map(|t| t.superiors_of(nature).filter(|s| *s != id).collect())
            .unwrap_or_default()
    }

    /// Whether walking up `nature` links from `from` reaches `target`.
    fn reaches(&self, from: ComponentId, nature: Nature, target: ComponentId) -> bool {
        let mut stack = vec![from];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if seen.insert(current) {
                stack.extend(self.superiors(current, nature));
            }
        }
        false
    }

    /// Longest chain of `nature` links above `id`.
    fn depth_above(&self, id: ComponentId, nature: Nature) -> usize {
        self.longest(id, &mut HashSet::new(), &|model: &Model, current: ComponentId| {
            model.superiors(current, nature)
        })
    }

    /// Longest chain of `nature` links below `id`.
    fn height_below(&self, id: ComponentId, nature: Nature) -> usize {
        self.longest(id, &mut HashSet::new(), &|model: &Model, current: ComponentId| {
            model
                .subordinates_of(current)
                .into_iter()
                .filter(|(n, _)| *n == nature)
                .map(|(_, sub)| sub)
                .collect()
        })
    }

    fn longest(
        &self,
        id: ComponentId,
        path: &mut HashSet<ComponentId>,
        next: &dyn Fn(&Model, ComponentId) -> Vec<ComponentId>,
    ) -> usize {
        if !path.insert(id) {
            return 0;
        }
        let best = next(self, id)
            .into_iter()
            .map(|n| 1 + self.longest(n, path, next))
            .max()
            .unwrap_or(0);
        path.remove(&id);
        best
    }

    /// Check every selected field and superior link of a type.
    pub(crate) fn check_type_links(&self, id: ComponentId) -> Result<(), Error> {
        let def = self
            .expect_kind(id, Kind::Type)?
            .as_type()
            .cloned()
            .ok_or(Error::NotExist { id })?;
        for field in &def.selected_fields {
            self.check_selectable(def.class, *field)?;
        }
        for (nature, superiors) in &def.superiors {
            for superior in superiors {
                self.check_superior(id, *nature, *superior)?;
            }
        }
        Ok(())
    }

    /// Why a component cannot be deleted, if it cannot.
    pub fn delete_check(&self, id: ComponentId) -> Result<Option<String>, Error> {
        let component = self.get(id)?;
        let reason = match component.payload() {
            Payload::Class(_) => {
                let groups = self.field_groups_of(id).len();
                let types = self.types_of(id).len();
                if groups > 0 {
                    Some(format!("class {id} still has {groups} field group(s)"))
                } else if types > 0 {
                    Some(format!("class {id} still has {types} type(s)"))
                } else {
                    None
                }
            }
            Payload::FieldGroup(_) => {
                let fields = self.rank_group_members(RankGroupKey::Fields(id)).len();
                (fields > 0).then(|| format!("field group {id} still has {fields} field(s)"))
            }
            Payload::Field(def) => {
                let attributes = self.attributes_of(id).len();
                let selecting = self.types_selecting(id).len();
                let targeted = matches!(def.fieldtype, FieldType::TypeRelation { .. });
                if targeted && attributes > 0 {
                    Some(format!("relation {id} still has {attributes} attribute(s)"))
                } else if selecting > 0 {
                    Some(format!("field {id} is selected by {selecting} type(s)"))
                } else {
                    None
                }
            }
            Payload::Type(_) => {
                let subordinates = self.subordinates_of(id).len();
                let targeted_by = self
                    .components
                    .values()
                    .filter(|c| {
                        matches!(
                            c.as_field().map(|f| &f.fieldtype),
                            Some(FieldType::TypeRelation { target }) if *target == id
                        )
                    })
                    .count();
                if subordinates > 0 {
                    Some(format!("type {id} still has {subordinates} subordinate(s)"))
                } else if targeted_by > 0 {
                    Some(format!("type {id} is targeted by {targeted_by} relation(s)"))
                } else {
                    None
                }
            }
        };
        Ok(reason)
    }

    // ---------------------------------------------------------------------
    // Mutation (registry only)
    // ---------------------------------------------------------------------

    pub(crate) fn insert(&mut self, component: Component) {
        self.components.insert(component.id(), component);
    }

    /// Remove a component and close the gap it leaves in its rank-group.
    pub(crate) fn remove(&mut self, id: ComponentId) -> Option<Component> {
        let removed = self.components.remove(&id)?;
        let key = removed.rank_group();
        for component in self.components.values_mut() {
            if component.rank_group() == key && component.rank > removed.rank {
                component.rank -= 1;
            }
        }
        Some(removed)
    }

    pub(crate) fn get_mut(&mut self, id: ComponentId) -> Result<&mut Component, Error> {
        self.components.get_mut(&id).ok_or(Error::NotExist { id })
    }

    pub(crate) fn type_mut(&mut self, id: ComponentId) -> Result<&mut TypeDef, Error> {
        let component = self.get_mut(id)?;
        let kind = component.kind();
        component.as_type_mut().ok_or_else(|| {
            Error::check(format!("component {id} is a {kind}, expected a type"))
        })
    }

    /// Move a component to `rank`, shifting the members in between by one.
    pub(crate) fn move_rank(&mut self, id: ComponentId, rank: u32) -> Result<(), Error> {
        let component = self.get(id)?;
        let key = component.rank_group();
        let old = component.rank();
        let max = self.max_rank(key);
        if rank < 1 || rank > max {
            return Err(Error::check(format!(
                "rank {rank} for {id} is outside 1..={max}"
            )));
        }
        if rank == old {
            return Ok(());
        }

        for member in self.components.values_mut() {
            if member.rank_group() != key || member.id() == id {
                continue;
            }
            if rank < old && member.rank >= rank && member.rank < old {
                member.rank += 1;
            } else if rank > old && member.rank > old && member.rank <= rank {
                member.rank -= 1;
            }
        }
        self.get_mut(id)?.rank = rank;
        Ok(())
    }

    /// Snapshot of every rank in a rank-group.
    pub(crate) fn rank_snapshot(&self, key: RankGroupKey) -> Vec<(ComponentId, u32)> {
        self.rank_group_members(key)
            .into_iter()
            .map(|c| (c.id(), c.rank()))
            .collect()
    }

    pub(crate) fn restore_ranks(&mut self, snapshot: &[(ComponentId, u32)]) {
        for (id, rank) in snapshot {
            if let Some(component) = self.components.get_mut(id) {
                component.rank = *rank;
            }
        }
    }

    /// Reassign ranks 1..N if the group is not contiguous. Returns true if
    /// anything changed.
    pub(crate) fn renormalize(&mut self, key: RankGroupKey) -> bool {
        let order: Vec<ComponentId> = self
            .rank_group_members(key)
            .into_iter()
            .map(Component::id)
            .collect();
        let mut changed = false;
        for (index, id) in order.into_iter().enumerate() {
            let expected = index as u32 + 1;
            if let Some(component) = self.components.get_mut(&id) {
                if component.rank != expected {
                    component.rank = expected;
                    changed = true;
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClassType;

    fn component(id: u64, attrs: Attributes, rank: u32) -> Component {
        Component::from_attributes(ComponentId(id), attrs, rank)
    }

    fn classes(n: u64) -> Model {
        let mut model = Model::new();
        for i in 1..=n {
            model.insert(component(
                i,
                Attributes::class(format!("c{i}"), ClassType::Entity),
                i as u32,
            ));
        }
        model
    }

    fn ranks(model: &Model) -> Vec<(u64, u32)> {
        model
            .rank_group_members(RankGroupKey::Classes(ClassType::Entity))
            .iter()
            .map(|c| (c.id().0, c.rank()))
            .collect()
    }

    #[test]
    fn test_move_rank_up_and_down() {
        let mut model = classes(4);

        model.move_rank(ComponentId(4), 1).unwrap();
        assert_eq!(ranks(&model), vec![(4, 1), (1, 2), (2, 3), (3, 4)]);

        model.move_rank(ComponentId(4), 3).unwrap();
        assert_eq!(ranks(&model), vec![(1, 1), (2, 2), (4, 3), (3, 4)]);
    }

    #[test]
    fn test_move_rank_out_of_range() {
        let mut model = classes(2);
        assert!(matches!(
            model.move_rank(ComponentId(1), 3),
            Err(Error::CheckFailed { .. })
        ));
        assert!(model.move_rank(ComponentId(1), 0).is_err());
        assert_eq!(ranks(&model), vec![(1, 1), (2, 2)]);
    }

    #[test]
    fn test_remove_closes_gap() {
        let mut model = classes(3);
        model.remove(ComponentId(2));
        assert_eq!(ranks(&model), vec![(1, 1), (3, 2)]);
    }

    #[test]
    fn test_renormalize() {
        let mut model = Model::new();
        model.insert(component(1, Attributes::class("a", ClassType::Entity), 3));
        model.insert(component(2, Attributes::class("b", ClassType::Entity), 7));

        assert!(model.renormalize(RankGroupKey::Classes(ClassType::Entity)));
        assert_eq!(ranks(&model), vec![(1, 1), (2, 2)]);
        assert!(!model.renormalize(RankGroupKey::Classes(ClassType::Entity)));
    }

    #[test]
    fn test_duplicate_class_name() {
        let model = classes(1);
        let err = model
            .check_new(&Attributes::class("c1", ClassType::Person))
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[test]
    fn test_field_group_must_reference_class() {
        let model = classes(1);
        let err = model
            .check_new(&Attributes::field_group("main", ComponentId(9), false))
            .unwrap_err();
        assert!(matches!(err, Error::NotExist { .. }));
    }

    #[test]
    fn test_content_hash_ignores_insertion_order() {
        let components = vec![
            component(
                1,
                Attributes::class("article", ClassType::Entity).with_display("en", "Article"),
                1,
            ),
            component(2, Attributes::field_group("main", ComponentId(1), false), 1),
            component(
                3,
                Attributes::field("title", ComponentId(2), FieldType::string(64)),
                1,
            ),
            component(
                4,
                Attributes::field("views", ComponentId(2), FieldType::Integer).optional(),
                2,
            ),
            component(5, Attributes::type_of("news", ComponentId(1)), 1),
        ];

        let mut forward = Model::new();
        for c in components.iter().cloned() {
            forward.insert(c);
        }
        let mut backward = Model::new();
        for c in components.iter().rev().cloned() {
            backward.insert(c);
        }
        assert_eq!(forward.content_hash(), backward.content_hash());

        backward.remove(ComponentId(4));
        assert_ne!(forward.content_hash(), backward.content_hash());
    }

    #[test]
    fn test_relation_descriptor_must_target_a_type() {
        let mut model = classes(1);
        model.insert(component(
            2,
            Attributes::field_group("main", ComponentId(1), false),
            1,
        ));

        let err = model
            .check_new(&Attributes::field(
                "author",
                ComponentId(2),
                FieldType::type_relation(ComponentId(1)),
            ))
            .unwrap_err();
        assert!(matches!(err, Error::CheckFailed { .. }));
        assert!(matches!(
            model.check_new(&Attributes::field(
                "author",
                ComponentId(2),
                FieldType::type_relation(ComponentId(9)),
            )),
            Err(Error::NotExist { .. })
        ));
    }
}
