//! Rank-groups stay contiguous under arbitrary sequences of structural
//! changes.

use proptest::prelude::*;
use tabula_core::model::{Attributes, ClassType, ComponentId, FieldType, Kind};
use tabula_core::{NullMigrationHandler, Registry};

#[derive(Clone, Debug)]
enum Op {
    CreateClass(ClassType, Option<u32>),
    CreateGroup(usize),
    CreateField(usize, Option<u32>),
    Delete(Kind, usize),
    SetRank(Kind, usize, u32),
    ModifyRank(Kind, usize, i64),
}

fn arb_classtype() -> impl Strategy<Value = ClassType> {
    prop_oneof![
        Just(ClassType::Entity),
        Just(ClassType::Entry),
        Just(ClassType::Person),
    ]
}

fn arb_kind() -> impl Strategy<Value = Kind> {
    prop_oneof![Just(Kind::Class), Just(Kind::FieldGroup), Just(Kind::Field)]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (arb_classtype(), proptest::option::of(0u32..6)).prop_map(|(t, r)| Op::CreateClass(t, r)),
        any::<usize>().prop_map(Op::CreateGroup),
        (any::<usize>(), proptest::option::of(0u32..8)).prop_map(|(g, r)| Op::CreateField(g, r)),
        (arb_kind(), any::<usize>()).prop_map(|(k, i)| Op::Delete(k, i)),
        (arb_kind(), any::<usize>(), 0u32..10).prop_map(|(k, i, r)| Op::SetRank(k, i, r)),
        (arb_kind(), any::<usize>(), any::<i64>()).prop_map(|(k, i, d)| Op::ModifyRank(k, i, d)),
    ]
}

/// Pick an existing component of `kind`, if there is one.
fn pick(registry: &Registry<NullMigrationHandler>, kind: Kind, index: usize) -> Option<ComponentId> {
    let ids: Vec<ComponentId> = registry
        .list(Some(kind), false)
        .iter()
        .map(|c| c.id())
        .collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids[index % ids.len()])
    }
}

/// Apply one operation; rejected operations must leave no trace.
fn apply(registry: &mut Registry<NullMigrationHandler>, op: &Op, serial: usize) {
    let before = registry.content_hash();
    let result = match op {
        Op::CreateClass(classtype, rank) => {
            let mut attrs = Attributes::class(format!("class{serial}"), *classtype);
            attrs.rank = *rank;
            registry.create(attrs).map(|_| ())
        }
        Op::CreateGroup(index) => match pick(registry, Kind::Class, *index) {
            Some(class) => registry
                .create(Attributes::field_group(format!("group{serial}"), class, false))
                .map(|_| ()),
            None => Ok(()),
        },
        Op::CreateField(index, rank) => match pick(registry, Kind::FieldGroup, *index) {
            Some(group) => {
                let mut attrs =
                    Attributes::field(format!("field{serial}"), group, FieldType::Integer)
                        .optional();
                attrs.rank = *rank;
                registry.create(attrs).map(|_| ())
            }
            None => Ok(()),
        },
        Op::Delete(kind, index) => match pick(registry, *kind, *index) {
            Some(id) => registry.delete(id).map(|_| ()),
            None => Ok(()),
        },
        Op::SetRank(kind, index, rank) => match pick(registry, *kind, *index) {
            Some(id) => registry.set_rank(id, *rank),
            None => Ok(()),
        },
        Op::ModifyRank(kind, index, delta) => match pick(registry, *kind, *index) {
            Some(id) => registry.modify_rank(id, *delta).map(|_| ()),
            None => Ok(()),
        },
    };
    if result.is_err() {
        assert_eq!(registry.content_hash(), before, "rejected {op:?} changed the model");
    }
}

fn contiguous(registry: &Registry<NullMigrationHandler>) -> bool {
    let model = registry.model();
    model.rank_groups().into_iter().all(|key| {
        model
            .rank_group_members(key)
            .iter()
            .map(|c| c.rank())
            .eq(1..=model.max_rank(key))
    })
}

proptest! {
    #[test]
    fn ranks_stay_contiguous(ops in prop::collection::vec(arb_op(), 0..60)) {
        let mut registry = Registry::new(NullMigrationHandler::new());
        for (serial, op) in ops.iter().enumerate() {
            apply(&mut registry, op, serial);
            prop_assert!(contiguous(&registry), "after {:?}", op);
        }

        let hash = registry.content_hash();
        prop_assert_eq!(registry.check(), 0);
        prop_assert_eq!(registry.content_hash(), hash);
    }

    #[test]
    fn replay_preserves_the_hash(ops in prop::collection::vec(arb_op(), 0..40)) {
        let mut registry = Registry::new(NullMigrationHandler::new());
        for (serial, op) in ops.iter().enumerate() {
            apply(&mut registry, op, serial);
        }

        let migrated = registry.migrate_handler(NullMigrationHandler::new()).unwrap();
        prop_assert_eq!(migrated.content_hash(), registry.content_hash());
        prop_assert!(contiguous(&migrated));
    }
}
