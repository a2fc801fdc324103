//! The top-level container: entities, components, storage, archetypes and
//! queries of one world.
//!
//! Every mutation applies its archetype transition before returning, so a
//! query read straight after it sees consistent membership. Entered/exited
//! diffs, change sets and destroyed entity indices accumulate until
//! [`World::refresh`] runs at the frame boundary.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::archetype::{Archetype, ArchetypeManager, Transition};
use crate::component::{Component, ComponentId, ComponentInstance, ComponentRegistry};
use crate::entity::{Entity, EntityAllocator};
use crate::query::{Query, QueryId, QueryInstance};
use crate::query_manager::QueryManager;
use crate::storage::{PropertyColumn, PropertyColumnMut, StorageManager};
use crate::EcsError;

// ---------------------------------------------------------------------------
// WorldConfig
// ---------------------------------------------------------------------------

/// Construction parameters of a [`World`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    /// Maximum number of simultaneously live entities.
    pub capacity: usize,
    /// Version string stamped into snapshots; `load` rejects any other.
    pub version: String,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

impl WorldConfig {
    /// Default config with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, EcsError> {
        let config: Self = serde_json::from_str(json).map_err(|e| EcsError::InvalidConfig {
            reason: format!("world config: {e}"),
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), EcsError> {
        if self.capacity == 0 {
            return Err(EcsError::InvalidConfig {
                reason: "capacity must be at least 1".to_owned(),
            });
        }
        if u32::try_from(self.capacity).is_err() {
            return Err(EcsError::InvalidConfig {
                reason: format!("capacity {} exceeds the entity index range", self.capacity),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// An entity/component world with a fixed capacity and component set.
pub struct World {
    pub(crate) config: WorldConfig,
    entities: EntityAllocator,
    components: ComponentRegistry,
    pub(crate) storage: StorageManager,
    archetypes: ArchetypeManager,
    queries: QueryManager,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("capacity", &self.config.capacity)
            .field("entity_count", &self.entities.alive_count())
            .field("component_count", &self.components.len())
            .field("archetype_count", &self.archetypes.len())
            .field("query_count", &self.queries.len())
            .field("buffer_bytes", &self.storage.byte_len())
            .finish()
    }
}

impl World {
    /// Build a world for `components` and allocate its storage buffer.
    ///
    /// The bitfield width is fixed here, at one bit per component rounded up
    /// to whole 32-bit words.
    ///
    /// # Errors
    ///
    /// [`EcsError::InvalidConfig`] for a zero capacity,
    /// [`EcsError::DuplicateComponent`] for a repeated name.
    pub fn new<I>(components: I, config: WorldConfig) -> Result<Self, EcsError>
    where
        I: IntoIterator<Item = Component>,
    {
        config.validate()?;
        let capacity = config.capacity;
        let mut registry = ComponentRegistry::new(capacity);
        for component in components {
            registry.register(component)?;
        }
        let storage = StorageManager::new(&registry, capacity);
        let archetypes = ArchetypeManager::new(registry.len(), capacity);
        tracing::debug!(
            capacity,
            components = registry.len(),
            buffer_bytes = storage.byte_len(),
            "world created"
        );
        Ok(Self {
            config,
            entities: EntityAllocator::new(capacity),
            components: registry,
            storage,
            archetypes,
            queries: QueryManager::new(),
        })
    }

    /// Register a component after construction.
    ///
    /// Only tags are accepted, and only while their bit still fits the
    /// bitfield width chosen at construction.
    ///
    /// # Errors
    ///
    /// [`EcsError::RegistrationClosed`] for schema components or when the
    /// width is used up, [`EcsError::DuplicateComponent`] for a taken name.
    pub fn register_component(&mut self, component: Component) -> Result<ComponentId, EcsError> {
        if !component.is_tag() {
            return Err(EcsError::RegistrationClosed {
                name: component.name().to_owned(),
                reason: "the storage buffer is already allocated".to_owned(),
            });
        }
        if self.components.len() >= self.archetypes.bit_width() {
            return Err(EcsError::RegistrationClosed {
                name: component.name().to_owned(),
                reason: format!(
                    "all {} bitfield bits are in use",
                    self.archetypes.bit_width()
                ),
            });
        }
        let id = self.components.register(component)?;
        self.storage.push_tag();
        Ok(id)
    }

    // -- accessors ----------------------------------------------------------

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// Typed storage of every component.
    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    /// Mutable storage access. Writes made here are not change-tracked.
    pub fn storage_mut(&mut self) -> &mut StorageManager {
        &mut self.storage
    }

    pub fn archetypes(&self) -> &ArchetypeManager {
        &self.archetypes
    }

    /// Typed view of the whole `property` array of component `name`.
    ///
    /// Slots are entity indices for dense components; sparse components map
    /// entities through [`ComponentStorage::slot`](crate::storage::ComponentStorage::slot).
    pub fn column(&self, name: &str, property: &str) -> Result<PropertyColumn<'_>, EcsError> {
        let id = self.components.resolve(name)?;
        let index = self.property_index(id, property)?;
        self.storage
            .column(id, index)
            .ok_or_else(|| EcsError::UnknownProperty {
                component: name.to_owned(),
                property: property.to_owned(),
            })
    }

    /// Writable [`World::column`]. Writes made here are not change-tracked.
    pub fn column_mut(
        &mut self,
        name: &str,
        property: &str,
    ) -> Result<PropertyColumnMut<'_>, EcsError> {
        let id = self.components.resolve(name)?;
        let index = self.property_index(id, property)?;
        self.storage
            .column_mut(id, index)
            .ok_or_else(|| EcsError::UnknownProperty {
                component: name.to_owned(),
                property: property.to_owned(),
            })
    }


    pub fn queries(&self) -> &QueryManager {
        &self.queries
    }

    /// Number of live archetypes, including the root.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.entities.alive_count()
    }

    /// Live entities in index order.
    pub fn iter_entities(&self) -> impl Iterator<Item = Entity> + '_ {
        self.entities.iter_alive()
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.entities.is_alive(entity)
    }

    /// The archetype `entity` currently belongs to.
    pub fn archetype_of(&self, entity: Entity) -> Option<&Archetype> {
        self.archetypes
            .location(entity)
            .and_then(|id| self.archetypes.get(id))
    }

    /// Resolve a component name to its id.
    pub fn component_id(&self, name: &str) -> Result<ComponentId, EcsError> {
        self.components.resolve(name)
    }

    fn ensure_alive(&self, entity: Entity) -> Result<(), EcsError> {
        if self.entities.is_alive(entity) {
            Ok(())
        } else {
            Err(EcsError::StaleEntity { entity })
        }
    }

    fn instance(&self, id: ComponentId) -> Result<&ComponentInstance, EcsError> {
        self.components.get(id).ok_or_else(|| EcsError::UnknownComponent {
            name: format!("{id:?}"),
            registered: self.components.registered_names().join(", "),
        })
    }

    fn apply_transition(&mut self, transition: Transition) {
        if let Some(created) = transition.created {
            if let Some(archetype) = self.archetypes.get_mut(created) {
                self.queries.on_archetype_created(archetype);
            }
        }
        for id in [transition.from, transition.to].into_iter().flatten() {
            if let Some(archetype) = self.archetypes.get(id) {
                self.queries.on_membership_changed(archetype);
            }
        }
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity holding no component.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityCapacity`] when every index is live or waiting for
    /// the next refresh to be recycled.
    pub fn create_entity(&mut self) -> Result<Entity, EcsError> {
        let Some(entity) = self.entities.allocate() else {
            tracing::warn!(
                capacity = self.config.capacity,
                pending = self.entities.pending().len(),
                "entity capacity exhausted"
            );
            return Err(EcsError::EntityCapacity {
                capacity: self.config.capacity,
            });
        };
        let transition = self.archetypes.insert_root(entity);
        self.apply_transition(transition);
        Ok(entity)
    }

    /// Destroy `entity`: drop every component it holds, remove it from its
    /// archetype and park its index until the next refresh.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] if the entity is not alive.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        let held: Vec<ComponentId> = self
            .components
            .iter()
            .filter(|c| c.is_owned_by(entity))
            .map(|c| c.id())
            .collect();
        for id in held {
            self.storage.detach(id, entity);
            if let Some(instance) = self.components.get_mut(id) {
                instance.set_owner(entity, false)?;
            }
        }
        if let Some(transition) = self.archetypes.remove_entity(entity) {
            self.apply_transition(transition);
        }
        self.entities.deallocate(entity);
        Ok(())
    }

    // -- components ---------------------------------------------------------

    /// Give `entity` the component `name`, with every property at its default.
    ///
    /// Returns `Ok(false)` without touching anything if the entity already
    /// holds the component.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`], [`EcsError::UnknownComponent`], and
    /// [`EcsError::ComponentCapacity`] when the component's `max_entities`
    /// holders already exist.
    pub fn add_component(&mut self, entity: Entity, name: &str) -> Result<bool, EcsError> {
        self.ensure_alive(entity)?;
        let id = self.components.resolve(name)?;
        let instance = self.instance(id)?;
        if instance.is_owned_by(entity) {
            return Ok(false);
        }
        if let Some(max_entities) = instance.component().max_entities() {
            if instance.owner_count() >= max_entities {
                tracing::warn!(
                    component = %name,
                    max_entities,
                    entity = %entity,
                    "component capacity exhausted"
                );
                return Err(EcsError::ComponentCapacity {
                    component: name.to_owned(),
                    max_entities,
                });
            }
        }

        self.storage.attach(id, entity)?;
        let transition = match self.archetypes.toggle(entity, id.index()) {
            Ok(transition) => transition,
            Err(err) => {
                self.storage.detach(id, entity);
                return Err(err);
            }
        };
        if let Some(instance) = self.components.get_mut(id) {
            instance.set_owner(entity, true)?;
        }
        self.apply_transition(transition);
        Ok(true)
    }

    /// Add `name` to `entity` and write `values` through [`World::set`].
    ///
    /// If the entity already holds the component the values are still
    /// written. Returns whether the component was newly added.
    pub fn add_component_with(
        &mut self,
        entity: Entity,
        name: &str,
        values: &[(&str, f64)],
    ) -> Result<bool, EcsError> {
        let id = self.components.resolve(name)?;
        for (property, _) in values {
            self.property_index(id, property)?;
        }
        let added = self.add_component(entity, name)?;
        for &(property, value) in values {
            self.set(entity, name, property, value)?;
        }
        Ok(added)
    }

    /// Take the component `name` away from `entity`, resetting its storage
    /// slot to defaults.
    ///
    /// Returns `Ok(false)` if the entity did not hold the component.
    pub fn remove_component(&mut self, entity: Entity, name: &str) -> Result<bool, EcsError> {
        self.ensure_alive(entity)?;
        let id = self.components.resolve(name)?;
        if !self.instance(id)?.is_owned_by(entity) {
            return Ok(false);
        }
        let transition = self.archetypes.toggle(entity, id.index())?;
        self.storage.detach(id, entity);
        if let Some(instance) = self.components.get_mut(id) {
            instance.set_owner(entity, false)?;
        }
        self.apply_transition(transition);
        Ok(true)
    }

    /// Whether `entity` holds the component `name`.
    pub fn has_component(&self, entity: Entity, name: &str) -> Result<bool, EcsError> {
        let id = self.components.resolve(name)?;
        Ok(self.instance(id)?.is_owned_by(entity))
    }

    fn property_index(&self, id: ComponentId, property: &str) -> Result<usize, EcsError> {
        let component = self.instance(id)?.component();
        component
            .schema()
            .and_then(|schema| schema.index_of(property))
            .ok_or_else(|| EcsError::UnknownProperty {
                component: component.name().to_owned(),
                property: property.to_owned(),
            })
    }

    fn owned_property(
        &self,
        entity: Entity,
        name: &str,
        property: &str,
    ) -> Result<(ComponentId, usize), EcsError> {
        self.ensure_alive(entity)?;
        let id = self.components.resolve(name)?;
        let index = self.property_index(id, property)?;
        if !self.instance(id)?.is_owned_by(entity) {
            return Err(EcsError::MissingComponent {
                entity,
                component: name.to_owned(),
            });
        }
        Ok((id, index))
    }

    /// Read one property of a component held by `entity`.
    pub fn get(&self, entity: Entity, name: &str, property: &str) -> Result<f64, EcsError> {
        let (id, index) = self.owned_property(entity, name, property)?;
        self.storage
            .read(id, entity, index)
            .ok_or_else(|| EcsError::MissingComponent {
                entity,
                component: name.to_owned(),
            })
    }

    /// Write one property of a component held by `entity` and record the
    /// entity in the component's change set.
    pub fn set(
        &mut self,
        entity: Entity,
        name: &str,
        property: &str,
        value: f64,
    ) -> Result<(), EcsError> {
        let (id, index) = self.owned_property(entity, name, property)?;
        self.storage.write(id, entity, index, value)?;
        if let Some(instance) = self.components.get_mut(id) {
            instance.mark_changed(entity);
        }
        Ok(())
    }

    // -- queries ------------------------------------------------------------

    /// Compile and register `query`. Registering an equal query again returns
    /// the same id.
    pub fn register_query(&mut self, query: Query) -> Result<QueryId, EcsError> {
        self.queries
            .register(query, &self.components, &mut self.archetypes)
    }

    /// The compiled form of query `id`.
    pub fn query(&self, id: QueryId) -> Result<&QueryInstance, EcsError> {
        self.queries
            .get(id)
            .ok_or(EcsError::UnknownQuery { id: id.0 })
    }

    /// Entities currently matching query `id`.
    pub fn query_entities(&mut self, id: QueryId) -> Result<&BTreeSet<Entity>, EcsError> {
        Ok(self.queries.sync(id, &self.archetypes)?.cached())
    }

    /// Entities that started matching query `id` since the last refresh.
    pub fn query_entered(&self, id: QueryId) -> Result<BTreeSet<Entity>, EcsError> {
        self.queries.entered(id, &self.archetypes)
    }

    /// Entities that stopped matching query `id` since the last refresh.
    pub fn query_exited(&self, id: QueryId) -> Result<BTreeSet<Entity>, EcsError> {
        self.queries.exited(id, &self.archetypes)
    }

    /// Matching entities written through [`World::set`] since the last
    /// refresh, for any component named in the query's `all` or `any`.
    pub fn query_changed(&mut self, id: QueryId) -> Result<BTreeSet<Entity>, EcsError> {
        let instance = self.queries.sync(id, &self.archetypes)?;
        let components = &self.components;
        Ok(instance
            .components()
            .values()
            .filter_map(|&cid| components.get(cid))
            .flat_map(|c| c.changed().iter().copied())
            .filter(|e| instance.cached().contains(e))
            .collect())
    }

    /// Components named in the `all` and `any` lists of query `id`.
    pub fn query_components(&self, id: QueryId) -> Result<&BTreeMap<String, ComponentId>, EcsError> {
        Ok(self.query(id)?.components())
    }

    // -- frame boundary -----------------------------------------------------

    /// Frame-boundary maintenance.
    ///
    /// Brings every built query cache up to date, then clears every
    /// archetype's entered/exited sets and dirty flag, every query's dirty
    /// flag and every change set, and finally recycles the indices of
    /// entities destroyed since the previous refresh.
    pub fn refresh(&mut self) {
        let synced = self.queries.refresh(&self.archetypes);
        let touched = self.archetypes.clear_diffs();
        for instance in self.components.iter_mut() {
            instance.clear_changed();
        }
        let recycled = self.entities.recycle_pending();
        tracing::trace!(synced, touched, recycled, "world refreshed");
    }

    /// Remove every archetype that is empty, has no pending diff and is not
    /// the root. Returns how many were removed.
    pub fn purge_empty_archetypes(&mut self) -> usize {
        let purged = self.archetypes.purge_empty();
        for archetype in &purged {
            self.queries.on_archetype_purged(archetype);
        }
        if !purged.is_empty() {
            tracing::debug!(
                purged = purged.len(),
                remaining = self.archetypes.len(),
                "empty archetypes purged"
            );
        }
        purged.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{NumericType, Schema};

    fn position() -> Component {
        Component::with_schema(
            "position",
            Schema::new()
                .with("x", NumericType::F32)
                .with("y", NumericType::F32),
        )
    }

    fn setup_world(capacity: usize) -> World {
        World::new(
            [position(), Component::tag("frozen")],
            WorldConfig::with_capacity(capacity),
        )
        .unwrap()
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = World::new([position()], WorldConfig::with_capacity(0)).unwrap_err();
        assert!(matches!(err, EcsError::InvalidConfig { .. }));
    }

    #[test]
    fn config_from_json_fills_defaults() {
        let config = WorldConfig::from_json(r#"{"capacity": 64}"#).unwrap();
        assert_eq!(config.capacity, 64);
        assert_eq!(config.version, env!("CARGO_PKG_VERSION"));
        assert!(WorldConfig::from_json(r#"{"capacity": 0}"#).is_err());
        assert!(WorldConfig::from_json("not json").is_err());
    }

    #[test]
    fn created_entity_sits_in_root_archetype() {
        let mut world = setup_world(8);
        let e = world.create_entity().unwrap();
        assert!(world.is_alive(e));
        assert!(world.archetype_of(e).unwrap().bitfield().is_empty());
        assert_eq!(world.archetype_count(), 1);
    }

    #[test]
    fn add_and_remove_are_idempotent() {
        let mut world = setup_world(8);
        let e = world.create_entity().unwrap();
        assert!(world.add_component(e, "position").unwrap());
        assert!(!world.add_component(e, "position").unwrap());
        assert!(world.has_component(e, "position").unwrap());
        assert!(world.remove_component(e, "position").unwrap());
        assert!(!world.remove_component(e, "position").unwrap());
        // Back in the root archetype.
        assert!(world.archetype_of(e).unwrap().bitfield().is_empty());
    }

    #[test]
    fn get_and_set_properties() {
        let mut world = setup_world(8);
        let e = world.create_entity().unwrap();
        world.add_component(e, "position").unwrap();
        world.set(e, "position", "x", 3.5).unwrap();
        assert_eq!(world.get(e, "position", "x").unwrap(), 3.5);
        assert_eq!(world.get(e, "position", "y").unwrap(), 0.0);

        assert!(matches!(
            world.get(e, "position", "z"),
            Err(EcsError::UnknownProperty { .. })
        ));
        assert!(matches!(
            world.set(e, "frozen", "x", 1.0),
            Err(EcsError::UnknownProperty { .. })
        ));
        let other = world.create_entity().unwrap();
        assert!(matches!(
            world.get(other, "position", "x"),
            Err(EcsError::MissingComponent { .. })
        ));
    }

    #[test]
    fn unknown_component_names_are_errors() {
        let mut world = setup_world(8);
        let e = world.create_entity().unwrap();
        match world.add_component(e, "velocity") {
            Err(EcsError::UnknownComponent { name, registered }) => {
                assert_eq!(name, "velocity");
                assert_eq!(registered, "frozen, position");
            }
            other => panic!("expected UnknownComponent, got {other:?}"),
        }
    }

    #[test]
    fn destroyed_entity_is_stale() {
        let mut world = setup_world(8);
        let e = world.create_entity().unwrap();
        world.add_component(e, "position").unwrap();
        world.destroy_entity(e).unwrap();
        assert!(!world.is_alive(e));
        assert!(world.archetype_of(e).is_none());
        assert!(matches!(
            world.destroy_entity(e),
            Err(EcsError::StaleEntity { .. })
        ));
        assert!(matches!(
            world.add_component(e, "frozen"),
            Err(EcsError::StaleEntity { .. })
        ));
        assert!(!world.has_component(e, "position").unwrap());
    }

    #[test]
    fn destroyed_index_is_recycled_at_refresh() {
        let mut world = setup_world(1);
        let e = world.create_entity().unwrap();
        world.destroy_entity(e).unwrap();
        assert!(matches!(
            world.create_entity(),
            Err(EcsError::EntityCapacity { capacity: 1 })
        ));
        world.refresh();
        let again = world.create_entity().unwrap();
        assert_eq!(again.index(), e.index());
    }

    #[test]
    fn add_component_with_writes_values() {
        let mut world = setup_world(8);
        let e = world.create_entity().unwrap();
        let added = world
            .add_component_with(e, "position", &[("x", 1.0), ("y", 2.0)])
            .unwrap();
        assert!(added);
        assert_eq!(world.get(e, "position", "y").unwrap(), 2.0);

        // A bad property name fails before anything is added.
        let f = world.create_entity().unwrap();
        assert!(world.add_component_with(f, "position", &[("w", 1.0)]).is_err());
        assert!(!world.has_component(f, "position").unwrap());
    }

    #[test]
    fn late_registration_accepts_only_fitting_tags() {
        let mut world = setup_world(8);
        let err = world.register_component(position()).unwrap_err();
        assert!(matches!(err, EcsError::RegistrationClosed { .. }));

        let id = world.register_component(Component::tag("selected")).unwrap();
        assert_eq!(id.index(), 2);
        let e = world.create_entity().unwrap();
        assert!(world.add_component(e, "selected").unwrap());

        // Two components at construction give one word: 32 bits in total.
        for i in 3..32 {
            world
                .register_component(Component::tag(&format!("tag{i}")))
                .unwrap();
        }
        assert!(matches!(
            world.register_component(Component::tag("overflow")),
            Err(EcsError::RegistrationClosed { .. })
        ));
    }

    #[test]
    fn query_changed_reports_proxy_writes_only() {
        let mut world = setup_world(8);
        let q = world
            .register_query(Query::new().all(["position"]))
            .unwrap();
        let a = world.create_entity().unwrap();
        let b = world.create_entity().unwrap();
        world.add_component(a, "position").unwrap();
        world.add_component(b, "position").unwrap();
        world.set(a, "position", "x", 1.0).unwrap();

        let id = world.component_id("position").unwrap();
        world.storage_mut().write(id, b, 0, 9.0).unwrap();

        assert_eq!(world.query_changed(q).unwrap(), BTreeSet::from([a]));
        world.refresh();
        assert!(world.query_changed(q).unwrap().is_empty());
        assert_eq!(world.get(b, "position", "x").unwrap(), 9.0);
    }

    #[test]
    fn direct_write_to_non_holder_does_not_take_a_capped_slot() {
        let health = Component::with_schema(
            "health",
            Schema::new().with_default("hp", NumericType::U16, 100.0),
        )
        .with_max_entities(2);
        let mut world = World::new([health], WorldConfig::with_capacity(100)).unwrap();
        let e: Vec<Entity> = (0..3).map(|_| world.create_entity().unwrap()).collect();
        let id = world.component_id("health").unwrap();

        assert!(matches!(
            world.storage_mut().write(id, e[2], 0, 5.0),
            Err(EcsError::MissingComponent { .. })
        ));
        world.destroy_entity(e[2]).unwrap();
        world.refresh();

        assert!(world.add_component(e[0], "health").unwrap());
        assert!(world.add_component(e[1], "health").unwrap());
        assert_eq!(world.components().get(id).unwrap().owner_count(), 2);
    }

    #[test]
    fn columns_read_and_write_whole_arrays() {
        let mut world = setup_world(4);
        let q = world
            .register_query(Query::new().all(["position"]).none(["frozen"]))
            .unwrap();
        let e: Vec<Entity> = (0..4).map(|_| world.create_entity().unwrap()).collect();
        for (i, &entity) in e.iter().enumerate() {
            world
                .add_component_with(entity, "position", &[("x", i as f64)])
                .unwrap();
        }
        world.add_component(e[3], "frozen").unwrap();
        world.refresh();

        let moving: Vec<Entity> = world.query_entities(q).unwrap().iter().copied().collect();
        let position = world.query_components(q).unwrap()["position"];
        let slots: Vec<usize> = moving
            .iter()
            .filter_map(|&m| world.storage().storage(position)?.slot(m))
            .collect();
        let mut xs = world.column_mut("position", "x").unwrap();
        for slot in slots {
            let x = xs.get(slot).unwrap();
            xs.set(slot, x * 10.0);
        }

        let xs: Vec<f64> = world
            .column("position", "x")
            .unwrap()
            .iter()
            .map(|(_, x)| x)
            .collect();
        assert_eq!(xs, vec![0.0, 10.0, 20.0, 3.0]);
        // Column writes bypass change tracking.
        assert!(world.query_changed(q).unwrap().is_empty());

        assert!(matches!(
            world.column("position", "z"),
            Err(EcsError::UnknownProperty { .. })
        ));
        assert!(matches!(
            world.column("frozen", "x"),
            Err(EcsError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn purge_removes_empty_archetypes() {
        let mut world = setup_world(8);
        let q = world.register_query(Query::new().all(["frozen"])).unwrap();
        let e = world.create_entity().unwrap();
        world.add_component(e, "frozen").unwrap();
        assert_eq!(world.query_entities(q).unwrap().len(), 1);
        world.remove_component(e, "frozen").unwrap();
        assert_eq!(world.purge_empty_archetypes(), 0, "diff still pending");
        world.refresh();
        assert_eq!(world.purge_empty_archetypes(), 1);
        assert_eq!(world.archetype_count(), 1);
        assert!(world.query(q).unwrap().archetypes().is_empty());

        world.add_component(e, "frozen").unwrap();
        assert_eq!(world.query_entities(q).unwrap().len(), 1);
    }
}
