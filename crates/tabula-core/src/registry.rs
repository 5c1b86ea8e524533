//! The registry: owner of every component and entry point for all
//! structural changes.

use crate::backend::ModelBackend;
use crate::error::Error;
use crate::migration::MigrationHandler;
use crate::model::{
    Attributes, Component, ComponentId, ContentHash, FieldType, Kind, Model, MultilingualString,
    Nature, Payload, TypeDef,
};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Owns a [`Model`] and reports every structural delta to a migration
/// handler.
///
/// Every mutation is all-or-nothing: checks run before anything changes, and
/// a handler refusal undoes the in-memory mutation before the error is
/// returned.
#[derive(Debug)]
pub struct Registry<H: MigrationHandler> {
    model: Model,
    handler: H,
    next_id: u64,
}

impl<H: MigrationHandler> Registry<H> {
    /// Create an empty registry.
    pub fn new(handler: H) -> Self {
        Self {
            model: Model::new(),
            handler,
            next_id: 1,
        }
    }

    /// Rebuild a registry from a backend, replaying every component against
    /// `handler` in dependency order.
    pub fn load<B: ModelBackend + ?Sized>(backend: &B, handler: H) -> Result<Self, Error> {
        let entries = backend.load()?;
        info!(components = entries.len(), "Loading model");
        replay(entries, handler)
    }

    /// Persist the model to a backend.
    pub fn save<B: ModelBackend + ?Sized>(&self, backend: &mut B) -> Result<(), Error> {
        backend.save(&self.model)
    }

    /// The component arena.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// The migration handler.
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The migration handler, mutably.
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Consume the registry, returning the model and handler.
    pub fn into_parts(self) -> (Model, H) {
        (self.model, self.handler)
    }

    /// Get a component.
    pub fn get(&self, id: ComponentId) -> Result<&Component, Error> {
        self.model.get(id)
    }

    /// List components, optionally of one kind. See [`Model::list`].
    pub fn list(&self, kind: Option<Kind>, ranked: bool) -> Vec<&Component> {
        self.model.list(kind, ranked)
    }

    /// Find a component by kind and name.
    pub fn find(&self, kind: Kind, name: &str) -> Option<&Component> {
        self.model.find(kind, name)
    }

    /// Content hash of the whole model.
    pub fn content_hash(&self) -> ContentHash {
        self.model.content_hash()
    }

    /// Create a component with the next free identifier.
    pub fn create(&mut self, attributes: Attributes) -> Result<&Component, Error> {
        let id = ComponentId(self.next_id);
        self.create_with_id(id, attributes)
    }

    /// Create a component with an explicit identifier.
    ///
    /// The identifier must never have been issued by this registry, so it
    /// cannot be below any identifier created or deleted before.
    pub fn create_with_id(
        &mut self,
        id: ComponentId,
        attributes: Attributes,
    ) -> Result<&Component, Error> {
        if id.0 < self.next_id {
            return Err(Error::AlreadyExists {
                name: id.to_string(),
                scope: "issued identifiers".to_string(),
            });
        }
        self.insert_component(id, attributes)
    }

    /// Insert a component under `id`.
    ///
    /// The component is appended to its rank-group and then moved to the
    /// requested rank, if any. Type links in `attributes` are validated with
    /// the component in place.
    fn insert_component(
        &mut self,
        id: ComponentId,
        attributes: Attributes,
    ) -> Result<&Component, Error> {
        if self.model.contains(id) {
            return Err(Error::AlreadyExists {
                name: id.to_string(),
                scope: "identifiers".to_string(),
            });
        }
        self.model.check_new(&attributes)?;

        let requested = attributes.rank;
        let mut component = Component::from_attributes(id, attributes, 0);
        let key = component.rank_group();
        let max = self.model.max_rank(key);
        if let Some(rank) = requested {
            if rank < 1 || rank > max + 1 {
                return Err(Error::check(format!(
                    "requested rank {rank} is outside 1..={}",
                    max + 1
                )));
            }
        }
        component.rank = max + 1;
        self.model.insert(component);

        let placed = match requested {
            Some(rank) => self.model.move_rank(id, rank),
            None => Ok(()),
        };
        let checked = placed.and_then(|()| match self.model.get(id)?.kind() {
            Kind::Type => self.model.check_type_links(id),
            _ => Ok(()),
        });
        if let Err(e) = checked {
            self.model.remove(id);
            return Err(e);
        }

        let after = self.model.get(id)?.attributes();
        if let Err(source) = self
            .handler
            .register_change(&self.model, id, None, Some(&after))
        {
            warn!(id = %id, error = %source, "Creation refused");
            self.model.remove(id);
            return Err(Error::ChangeRefused { id, source });
        }

        self.next_id = self.next_id.max(id.0 + 1);
        info!(id = %id, kind = %after.kind(), name = %after.name, "Component created");
        self.commit_state();
        self.model.get(id)
    }

    /// Delete a component.
    ///
    /// Returns `Ok(false)` without side effects when the component still has
    /// dependents.
    pub fn delete(&mut self, id: ComponentId) -> Result<bool, Error> {
        let before = self.model.get(id)?.attributes();
        if let Some(reason) = self.model.delete_check(id)? {
            info!(id = %id, reason = %reason, "Delete refused");
            return Ok(false);
        }

        self.handler
            .register_change(&self.model, id, Some(&before), None)
            .map_err(|source| {
                warn!(id = %id, error = %source, "Deletion refused");
                Error::ChangeRefused { id, source }
            })?;

        self.model.remove(id);
        info!(id = %id, kind = %before.kind(), name = %before.name, "Component deleted");
        self.commit_state();
        Ok(true)
    }

    /// Renaming is not supported for any component kind.
    pub fn rename(&mut self, id: ComponentId, name: &str) -> Result<(), Error> {
        let current = self.model.get(id)?;
        Err(Error::Unsupported {
            operation: format!("rename of {} {} to {name}", current.kind(), current.name()),
        })
    }

    /// Move a component to `rank` within its rank-group.
    pub fn set_rank(&mut self, id: ComponentId, rank: u32) -> Result<(), Error> {
        let component = self.model.get(id)?;
        let before = component.attributes();
        let snapshot = self.model.rank_snapshot(component.rank_group());

        self.model.move_rank(id, rank)?;
        self.apply_update(id, before, move |model| model.restore_ranks(&snapshot))
    }

    /// Move a component by `delta` positions, clamped to its rank-group.
    ///
    /// Returns whether the full delta was honored.
    pub fn modify_rank(&mut self, id: ComponentId, delta: i64) -> Result<bool, Error> {
        let component = self.model.get(id)?;
        let max = i64::from(self.model.max_rank(component.rank_group()));
        let wanted = i64::from(component.rank()).saturating_add(delta);
        let target = wanted.clamp(1, max.max(1));

        let rank = u32::try_from(target)
            .map_err(|_| Error::check(format!("rank {target} is out of range")))?;
        self.set_rank(id, rank)?;
        Ok(target == wanted)
    }

    /// Renormalize every rank-group to 1..N.
    ///
    /// Returns the number of groups that needed repair.
    pub fn check(&mut self) -> usize {
        let mut repaired = 0;
        for key in self.model.rank_groups() {
            if self.model.renormalize(key) {
                warn!(group = ?key, "Rank-group was not contiguous");
                repaired += 1;
            }
        }
        if repaired > 0 {
            self.commit_state();
        }
        repaired
    }

    /// Replace the display text of a component.
    pub fn set_display_text(
        &mut self,
        id: ComponentId,
        text: MultilingualString,
    ) -> Result<(), Error> {
        let component = self.model.get_mut(id)?;
        let previous = std::mem::replace(&mut component.display_text, text);
        let mut before = component.attributes();
        before.display_text = previous.clone();

        self.apply_update(id, before, move |model| {
            if let Ok(component) = model.get_mut(id) {
                component.display_text = previous;
            }
        })
    }

    /// Replace the help text of a component.
    pub fn set_help_text(&mut self, id: ComponentId, text: MultilingualString) -> Result<(), Error> {
        let component = self.model.get_mut(id)?;
        let previous = std::mem::replace(&mut component.help_text, text);
        let mut before = component.attributes();
        before.help_text = previous.clone();

        self.apply_update(id, before, move |model| {
            if let Ok(component) = model.get_mut(id) {
                component.help_text = previous;
            }
        })
    }

    /// Select an optional field of the type's class.
    pub fn select_field(&mut self, type_id: ComponentId, field: ComponentId) -> Result<(), Error> {
        let component = self.model.expect_kind(type_id, Kind::Type)?;
        let before = component.attributes();
        let class = type_class(component)?;
        self.model.check_selectable(class, field)?;

        if !self.model.type_mut(type_id)?.selected_fields.insert(field) {
            return Ok(());
        }
        self.apply_update(type_id, before, move |model| {
            if let Ok(def) = model.type_mut(type_id) {
                def.selected_fields.remove(&field);
            }
        })
    }

    /// Remove a field from a type's selection. Unselecting a field that is
    /// not selected is a no-op.
    pub fn unselect_field(&mut self, type_id: ComponentId, field: ComponentId) -> Result<(), Error> {
        let before = self.model.expect_kind(type_id, Kind::Type)?.attributes();
        if !self.model.type_mut(type_id)?.selected_fields.remove(&field) {
            return Ok(());
        }
        self.apply_update(type_id, before, move |model| {
            if let Ok(def) = model.type_mut(type_id) {
                def.selected_fields.insert(field);
            }
        })
    }

    /// Attach `superior` to a type under `nature`.
    ///
    /// Fails without mutation if the owning classtype does not declare the
    /// nature, the attach policy does not hold, or a depth, child-count or
    /// cycle limit would be exceeded.
    pub fn add_superior(
        &mut self,
        id: ComponentId,
        nature: Nature,
        superior: ComponentId,
    ) -> Result<(), Error> {
        let before = self.model.expect_kind(id, Kind::Type)?.attributes();
        if !self.model.type_mut(id)?.insert_superior(nature, superior) {
            return Ok(());
        }

        if let Err(e) = self.model.check_superior(id, nature, superior) {
            self.model.type_mut(id)?.remove_superior(nature, superior);
            return Err(e);
        }

        self.apply_update(id, before, move |model| {
            if let Ok(def) = model.type_mut(id) {
                def.remove_superior(nature, superior);
            }
        })
    }

    /// Detach `superior` from a type. Detaching a missing link is a no-op.
    pub fn remove_superior(
        &mut self,
        id: ComponentId,
        nature: Nature,
        superior: ComponentId,
    ) -> Result<(), Error> {
        let before = self.model.expect_kind(id, Kind::Type)?.attributes();
        if !self.model.type_mut(id)?.remove_superior(nature, superior) {
            return Ok(());
        }
        self.apply_update(id, before, move |model| {
            if let Ok(def) = model.type_mut(id) {
                def.insert_superior(nature, superior);
            }
        })
    }

    /// Rebuild an equivalent registry backed by another handler.
    ///
    /// Components keep their identifiers, ranks and timestamps, so the
    /// content hash of the result equals this registry's.
    pub fn migrate_handler<H2: MigrationHandler>(&self, handler: H2) -> Result<Registry<H2>, Error> {
        let entries = self
            .model
            .iter()
            .map(|c| (c.id(), c.attributes()))
            .collect();
        info!(components = self.model.len(), "Migrating to a new handler");

        let mut migrated = replay(entries, handler)?;
        for component in self.model.iter() {
            let copy = migrated.model.get_mut(component.id())?;
            copy.created_at = component.created_at();
            copy.updated_at = component.updated_at();
        }
        migrated.next_id = migrated.next_id.max(self.next_id);
        Ok(migrated)
    }

    /// Report an in-place update of `id` and undo it on refusal.
    fn apply_update<F>(&mut self, id: ComponentId, before: Attributes, undo: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Model),
    {
        let after = self.model.get(id)?.attributes();
        if after == before {
            return Ok(());
        }

        if let Err(source) = self
            .handler
            .register_change(&self.model, id, Some(&before), Some(&after))
        {
            warn!(id = %id, error = %source, "Update refused");
            undo(&mut self.model);
            return Err(Error::ChangeRefused { id, source });
        }

        self.model.get_mut(id)?.touch();
        debug!(id = %id, "Component updated");
        self.commit_state();
        Ok(())
    }

    fn commit_state(&mut self) {
        let hash = self.model.content_hash();
        self.handler.register_model_state(&self.model, hash);
    }
}

fn type_class(component: &Component) -> Result<ComponentId, Error> {
    component
        .as_type()
        .map(|def| def.class)
        .ok_or(Error::NotExist { id: component.id() })
}

/// Replay position: components a later phase depends on come first.
fn phase(attributes: &Attributes) -> u8 {
    match &attributes.payload {
        Payload::Class(_) => 0,
        Payload::Type(_) => 1,
        Payload::FieldGroup(_) => 2,
        Payload::Field(def) => match def.fieldtype {
            FieldType::TypeRelationAttribute { .. } => 4,
            _ => 3,
        },
    }
}

/// Build a registry by creating every entry in dependency order, then
/// attaching type links once every component exists.
fn replay<H: MigrationHandler>(
    entries: BTreeMap<ComponentId, Attributes>,
    handler: H,
) -> Result<Registry<H>, Error> {
    let mut ordered: Vec<(ComponentId, Attributes)> = entries.into_iter().collect();
    ordered.sort_by_key(|(id, attrs)| (phase(attrs), attrs.rank.unwrap_or(u32::MAX), *id));

    let mut registry = Registry::new(handler);
    let mut links: Vec<(ComponentId, TypeDef)> = Vec::new();
    let mut ranks: Vec<(ComponentId, u32)> = Vec::new();

    for (id, mut attributes) in ordered {
        if let Some(rank) = attributes.rank.take() {
            ranks.push((id, rank));
        }
        if let Payload::Type(def) = &mut attributes.payload {
            let bare = def.without_links();
            links.push((id, std::mem::replace(def, bare)));
        }
        registry.insert_component(id, attributes)?;
    }

    for (id, def) in links {
        for field in &def.selected_fields {
            registry.select_field(id, *field)?;
        }
        for (nature, superiors) in &def.superiors {
            for superior in superiors {
                registry.add_superior(id, *nature, *superior)?;
            }
        }
    }

    // Creation order follows dependencies, not ranks; put ranks back.
    registry.model.restore_ranks(&ranks);
    for key in registry.model.rank_groups() {
        registry.model.renormalize(key);
    }
    registry.commit_state();

    debug!(components = registry.model.len(), "Replay complete");
    Ok(registry)
}
