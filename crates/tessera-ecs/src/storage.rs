//! Packed structure-of-arrays storage for component properties.
//!
//! The [`StorageManager`] allocates exactly one contiguous byte buffer for a
//! world. Components are walked in registration order; every schema property
//! gets a [`PropertyView`]: a typed window of `length` elements starting at
//! the current byte offset. Tags take no space.
//!
//! A component whose `max_entities` is below the world capacity only gets
//! `max_entities` slots per property. Its storage is reached through a
//! [`SparseIndex`], which maps entity indices onto compacted dense slots handed
//! out by a [`Bitpool`]. Dense components address their slots by entity index
//! directly.
//!
//! Every slot holds its property's default value unless it belongs to an
//! entity currently holding the component. Slots are reset when the component
//! is removed.

use std::collections::HashMap;
use std::ops::Range;

use crate::bitpool::Bitpool;
use crate::component::{Component, ComponentId, ComponentRegistry, NumericType};
use crate::entity::Entity;
use crate::EcsError;

// ---------------------------------------------------------------------------
// PropertyView
// ---------------------------------------------------------------------------

/// A typed array of one property, carved out of the shared buffer.
#[derive(Debug, Clone)]
pub struct PropertyView {
    name: String,
    ty: NumericType,
    default: f64,
    /// Byte offset of element 0 in the buffer.
    offset: usize,
    /// Number of elements.
    len: usize,
}

impl PropertyView {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> NumericType {
        self.ty
    }

    pub fn default_value(&self) -> f64 {
        self.default
    }

    /// Byte offset of the first element.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes covered by this view.
    pub fn byte_len(&self) -> usize {
        self.len * self.ty.size()
    }

    #[inline]
    fn range(&self, slot: usize) -> Range<usize> {
        debug_assert!(slot < self.len, "slot {slot} outside view of {}", self.len);
        let start = self.offset + slot * self.ty.size();
        start..start + self.ty.size()
    }

    /// Read element `slot`.
    #[inline]
    pub fn read(&self, buffer: &[u8], slot: usize) -> f64 {
        self.ty.decode(&buffer[self.range(slot)])
    }

    /// Write element `slot`.
    #[inline]
    pub fn write(&self, buffer: &mut [u8], slot: usize, value: f64) {
        let range = self.range(slot);
        self.ty.encode(value, &mut buffer[range]);
    }
}

// ---------------------------------------------------------------------------
// SparseIndex
// ---------------------------------------------------------------------------

/// Entity-to-dense-slot mapping for capped components.
#[derive(Debug, Clone)]
pub struct SparseIndex {
    slots: Bitpool,
    dense: HashMap<Entity, usize>,
}

impl SparseIndex {
    fn new(len: usize) -> Self {
        Self {
            slots: Bitpool::new(len),
            dense: HashMap::new(),
        }
    }

    /// Dense slot of `entity`, if it has one.
    pub fn slot(&self, entity: Entity) -> Option<usize> {
        self.dense.get(&entity).copied()
    }

    /// Existing slot of `entity`, or a freshly acquired one. `None` when all
    /// slots are taken.
    fn insert(&mut self, entity: Entity) -> Option<usize> {
        if let Some(slot) = self.slot(entity) {
            return Some(slot);
        }
        let slot = self.slots.acquire()?;
        self.dense.insert(entity, slot);
        Some(slot)
    }

    fn remove(&mut self, entity: Entity) -> Option<usize> {
        let slot = self.dense.remove(&entity)?;
        self.slots.release(slot);
        Some(slot)
    }

    /// Number of occupied dense slots.
    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Number of dense slots.
    pub fn capacity(&self) -> usize {
        self.slots.size()
    }
}

// ---------------------------------------------------------------------------
// ComponentStorage
// ---------------------------------------------------------------------------

/// The property views of one schema-bearing component.
#[derive(Debug, Clone)]
pub struct ComponentStorage {
    name: String,
    properties: Vec<PropertyView>,
    /// Elements per property view.
    length: usize,
    sparse: Option<SparseIndex>,
}

impl ComponentStorage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[PropertyView] {
        &self.properties
    }

    /// Index and view of the property called `name`.
    pub fn property(&self, name: &str) -> Option<(usize, &PropertyView)> {
        self.properties
            .iter()
            .enumerate()
            .find(|(_, view)| view.name == name)
    }

    /// Slots per property.
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn is_sparse(&self) -> bool {
        self.sparse.is_some()
    }

    pub fn sparse_index(&self) -> Option<&SparseIndex> {
        self.sparse.as_ref()
    }

    /// Slot addressed by `entity`, or `None` for an entity with no slot in a
    /// sparse store.
    pub fn slot(&self, entity: Entity) -> Option<usize> {
        match &self.sparse {
            Some(index) => index.slot(entity),
            None => (entity.index() < self.length).then_some(entity.index()),
        }
    }

    fn capacity_error(&self) -> EcsError {
        EcsError::ComponentCapacity {
            component: self.name.clone(),
            max_entities: self.length,
        }
    }

    /// Slot for `entity`, allocating one in a sparse store.
    fn slot_or_insert(&mut self, entity: Entity) -> Result<usize, EcsError> {
        let slot = match &mut self.sparse {
            Some(index) => index.insert(entity),
            None => (entity.index() < self.length).then_some(entity.index()),
        };
        slot.ok_or_else(|| self.capacity_error())
    }

    fn reset_slot(&self, buffer: &mut [u8], slot: usize) {
        for view in &self.properties {
            view.write(buffer, slot, view.default);
        }
    }
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// Typed read access to every slot of one property.
#[derive(Debug, Clone, Copy)]
pub struct PropertyColumn<'a> {
    view: &'a PropertyView,
    buffer: &'a [u8],
}

impl<'a> PropertyColumn<'a> {
    pub fn view(&self) -> &'a PropertyView {
        self.view
    }

    pub fn len(&self) -> usize {
        self.view.len
    }

    pub fn is_empty(&self) -> bool {
        self.view.len == 0
    }

    pub fn get(&self, slot: usize) -> Option<f64> {
        (slot < self.view.len).then(|| self.view.read(self.buffer, slot))
    }

    /// `(slot, value)` for every slot, in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + 'a {
        let (view, buffer) = (self.view, self.buffer);
        (0..view.len).map(move |slot| (slot, view.read(buffer, slot)))
    }
}

/// Typed write access to every slot of one property. Writes are not
/// change-tracked.
#[derive(Debug)]
pub struct PropertyColumnMut<'a> {
    view: &'a PropertyView,
    buffer: &'a mut [u8],
}

impl PropertyColumnMut<'_> {
    pub fn view(&self) -> &PropertyView {
        self.view
    }

    pub fn len(&self) -> usize {
        self.view.len
    }

    pub fn is_empty(&self) -> bool {
        self.view.len == 0
    }

    pub fn get(&self, slot: usize) -> Option<f64> {
        (slot < self.view.len).then(|| self.view.read(&*self.buffer, slot))
    }

    /// Write `value` into `slot`. Returns `false` when the slot is out of
    /// range.
    pub fn set(&mut self, slot: usize, value: f64) -> bool {
        if slot >= self.view.len {
            return false;
        }
        self.view.write(&mut *self.buffer, slot, value);
        true
    }

    /// Replace every slot with `f(slot, current)`.
    pub fn update<F>(&mut self, mut f: F)
    where
        F: FnMut(usize, f64) -> f64,
    {
        for slot in 0..self.view.len {
            let current = self.view.read(&*self.buffer, slot);
            self.view.write(&mut *self.buffer, slot, f(slot, current));
        }
    }
}

// ---------------------------------------------------------------------------
// StorageManager
// ---------------------------------------------------------------------------

/// Owner of the world's single component buffer.
#[derive(Debug)]
pub struct StorageManager {
    buffer: Vec<u8>,
    capacity: usize,
    /// Indexed by `ComponentId`; `None` for tags.
    stores: Vec<Option<ComponentStorage>>,
}

/// Slots per property for `component` in a world of `capacity` entities.
fn effective_length(component: &Component, capacity: usize) -> usize {
    component
        .max_entities()
        .map_or(capacity, |max| max.min(capacity))
}

impl StorageManager {
    /// Total bytes needed to store `components` for `capacity` entities.
    pub fn required_bytes<'a, I>(components: I, capacity: usize) -> usize
    where
        I: IntoIterator<Item = &'a Component>,
    {
        components
            .into_iter()
            .filter_map(|c| c.schema().map(|s| s.stride() * effective_length(c, capacity)))
            .sum()
    }

    /// Allocate the buffer for every component in `registry` and initialise
    /// each slot to its property default.
    pub fn new(registry: &ComponentRegistry, capacity: usize) -> Self {
        let total = Self::required_bytes(registry.iter().map(|i| i.component()), capacity);
        let mut buffer = vec![0u8; total];
        let mut offset = 0;
        let mut stores = Vec::with_capacity(registry.len());

        for instance in registry.iter() {
            let component = instance.component();
            let Some(schema) = component.schema() else {
                stores.push(None);
                continue;
            };
            let length = effective_length(component, capacity);
            let mut properties = Vec::with_capacity(schema.len());
            for property in schema.properties() {
                let view = PropertyView {
                    name: property.name.clone(),
                    ty: property.ty,
                    default: property.default,
                    offset,
                    len: length,
                };
                offset += view.byte_len();
                properties.push(view);
            }
            let sparse = (length < capacity).then(|| SparseIndex::new(length));
            let storage = ComponentStorage {
                name: component.name().to_owned(),
                properties,
                length,
                sparse,
            };
            for slot in 0..length {
                storage.reset_slot(&mut buffer, slot);
            }
            stores.push(Some(storage));
        }
        debug_assert_eq!(offset, total);

        Self {
            buffer,
            capacity,
            stores,
        }
    }

    /// Record a tag registered after the buffer was allocated.
    pub(crate) fn push_tag(&mut self) {
        self.stores.push(None);
    }

    /// Storage of component `id`, or `None` for tags and unknown ids.
    pub fn storage(&self, id: ComponentId) -> Option<&ComponentStorage> {
        self.stores.get(id.index()).and_then(|s| s.as_ref())
    }

    /// Give `entity` a slot in component `id` and fill it with defaults.
    ///
    /// # Errors
    ///
    /// [`EcsError::ComponentCapacity`] when a sparse store has no free slot.
    pub(crate) fn attach(&mut self, id: ComponentId, entity: Entity) -> Result<(), EcsError> {
        let Some(Some(storage)) = self.stores.get_mut(id.index()) else {
            return Ok(());
        };
        let slot = storage.slot_or_insert(entity)?;
        storage.reset_slot(&mut self.buffer, slot);
        Ok(())
    }

    /// Reset `entity`'s slot in component `id` to defaults and release it.
    pub(crate) fn detach(&mut self, id: ComponentId, entity: Entity) {
        let Some(Some(storage)) = self.stores.get_mut(id.index()) else {
            return;
        };
        let Some(slot) = storage.slot(entity) else {
            return;
        };
        storage.reset_slot(&mut self.buffer, slot);
        if let Some(index) = &mut storage.sparse {
            index.remove(entity);
        }
    }

    /// Read property `property` of component `id` for `entity`.
    ///
    /// `None` for tags, unknown properties, and entities without a slot in a
    /// sparse store.
    pub fn read(&self, id: ComponentId, entity: Entity, property: usize) -> Option<f64> {
        let storage = self.storage(id)?;
        let view = storage.properties.get(property)?;
        let slot = storage.slot(entity)?;
        Some(view.read(&self.buffer, slot))
    }

    /// Write property `property` of component `id` for `entity`.
    ///
    /// Only slots handed out by `attach` are written; an entity with no slot
    /// in a sparse store is refused rather than given one.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownProperty`] for tags and out-of-range properties,
    /// [`EcsError::MissingComponent`] when a sparse store has no slot for
    /// `entity`.
    pub fn write(
        &mut self,
        id: ComponentId,
        entity: Entity,
        property: usize,
        value: f64,
    ) -> Result<(), EcsError> {
        let Some(Some(storage)) = self.stores.get(id.index()) else {
            return Err(EcsError::UnknownProperty {
                component: format!("{id:?}"),
                property: property.to_string(),
            });
        };
        let Some(view) = storage.properties.get(property) else {
            return Err(EcsError::UnknownProperty {
                component: storage.name.clone(),
                property: property.to_string(),
            });
        };
        let slot = storage.slot(entity).ok_or_else(|| EcsError::MissingComponent {
            entity,
            component: storage.name.clone(),
        })?;
        view.write(&mut self.buffer, slot, value);
        Ok(())
    }

    /// Read-only typed view of one property array of component `id`.
    ///
    /// `None` for tags, unknown ids and out-of-range properties.
    pub fn column(&self, id: ComponentId, property: usize) -> Option<PropertyColumn<'_>> {
        let view = self.storage(id)?.properties.get(property)?;
        Some(PropertyColumn {
            view,
            buffer: &self.buffer,
        })
    }

    /// Writable typed view of one property array of component `id`.
    ///
    /// Writes through the view address slots, not entities; use
    /// [`ComponentStorage::slot`] to find an entity's slot.
    pub fn column_mut(&mut self, id: ComponentId, property: usize) -> Option<PropertyColumnMut<'_>> {
        let view = self
            .stores
            .get(id.index())?
            .as_ref()?
            .properties
            .get(property)?;
        Some(PropertyColumnMut {
            view,
            buffer: &mut self.buffer,
        })
    }

    /// The raw buffer.
    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    /// Size of the buffer in bytes.
    pub fn byte_len(&self) -> usize {
        self.buffer.len()
    }

    /// Entity capacity the buffer was sized for.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replace the buffer contents with `source`, byte for byte.
    ///
    /// # Errors
    ///
    /// [`EcsError::BufferSizeMismatch`] unless `source` has exactly the
    /// buffer's length.
    pub fn set_buffer(&mut self, source: &[u8]) -> Result<(), EcsError> {
        if source.len() != self.buffer.len() {
            return Err(EcsError::BufferSizeMismatch {
                expected: self.buffer.len(),
                actual: source.len(),
            });
        }
        self.buffer.copy_from_slice(source);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::Schema;

    fn registry(components: Vec<Component>, capacity: usize) -> ComponentRegistry {
        let mut reg = ComponentRegistry::new(capacity);
        for c in components {
            reg.register(c).unwrap();
        }
        reg
    }

    fn position() -> Component {
        Component::with_schema(
            "position",
            Schema::new()
                .with("x", NumericType::F32)
                .with("y", NumericType::F32),
        )
    }

    fn health() -> Component {
        Component::with_schema(
            "health",
            Schema::new().with_default("hp", NumericType::U16, 100.0),
        )
        .with_max_entities(2)
    }

    #[test]
    fn buffer_size_sums_schema_components() {
        let reg = registry(vec![position(), Component::tag("frozen"), health()], 10);
        let storage = StorageManager::new(&reg, 10);
        // position: 2 * 4 bytes * 10, frozen: 0, health: 2 bytes * 2.
        assert_eq!(storage.byte_len(), 80 + 4);
    }

    #[test]
    fn views_are_laid_out_in_registration_order() {
        let reg = registry(vec![position(), health()], 10);
        let storage = StorageManager::new(&reg, 10);
        let pos = storage.storage(ComponentId(0)).unwrap();
        assert_eq!(pos.properties()[0].offset(), 0);
        assert_eq!(pos.properties()[1].offset(), 40);
        let hp = storage.storage(ComponentId(1)).unwrap();
        assert_eq!(hp.properties()[0].offset(), 80);
        assert!(hp.is_sparse());
        assert!(!pos.is_sparse());
    }

    #[test]
    fn slots_start_at_default_values() {
        let reg = registry(vec![health()], 10);
        let mut storage = StorageManager::new(&reg, 10);
        let e = Entity::from_index(7);
        // No sparse slot yet.
        assert_eq!(storage.read(ComponentId(0), e, 0), None);
        storage.attach(ComponentId(0), e).unwrap();
        assert_eq!(storage.read(ComponentId(0), e, 0), Some(100.0));
    }

    #[test]
    fn detach_resets_to_default() {
        let reg = registry(vec![position()], 4);
        let mut storage = StorageManager::new(&reg, 4);
        let e = Entity::from_index(2);
        storage.attach(ComponentId(0), e).unwrap();
        storage.write(ComponentId(0), e, 0, 1.0).unwrap();
        assert_eq!(storage.read(ComponentId(0), e, 0), Some(1.0));
        storage.detach(ComponentId(0), e);
        assert_eq!(storage.read(ComponentId(0), e, 0), Some(0.0));
    }

    #[test]
    fn sparse_store_caps_slots_and_reuses_them() {
        let reg = registry(vec![health()], 100);
        let mut storage = StorageManager::new(&reg, 100);
        let id = ComponentId(0);
        let (a, b, c) = (
            Entity::from_index(10),
            Entity::from_index(50),
            Entity::from_index(99),
        );
        storage.attach(id, a).unwrap();
        storage.attach(id, b).unwrap();
        let err = storage.attach(id, c).unwrap_err();
        assert!(matches!(
            err,
            EcsError::ComponentCapacity { max_entities: 2, .. }
        ));

        let freed = storage.storage(id).unwrap().slot(a).unwrap();
        storage.detach(id, a);
        storage.attach(id, c).unwrap();
        assert_eq!(storage.storage(id).unwrap().slot(c), Some(freed));
    }

    #[test]
    fn sparse_write_without_slot_is_refused() {
        let reg = registry(vec![health()], 100);
        let mut storage = StorageManager::new(&reg, 100);
        let id = ComponentId(0);
        let e = Entity::from_index(42);
        assert!(matches!(
            storage.write(id, e, 0, 7.0),
            Err(EcsError::MissingComponent { .. })
        ));
        assert!(storage.storage(id).unwrap().sparse_index().unwrap().is_empty());

        storage.attach(id, e).unwrap();
        storage.write(id, e, 0, 7.0).unwrap();
        assert_eq!(storage.read(id, e, 0), Some(7.0));
    }

    #[test]
    fn refused_writes_leave_every_slot_free() {
        let reg = registry(vec![health()], 100);
        let mut storage = StorageManager::new(&reg, 100);
        let id = ComponentId(0);
        for i in 0..10 {
            let _ = storage.write(id, Entity::from_index(i), 0, 1.0);
        }
        storage.attach(id, Entity::from_index(20)).unwrap();
        storage.attach(id, Entity::from_index(21)).unwrap();
    }

    #[test]
    fn columns_expose_whole_property_arrays() {
        let reg = registry(vec![position(), health()], 4);
        let mut storage = StorageManager::new(&reg, 4);
        let pos = ComponentId(0);

        let mut xs = storage.column_mut(pos, 0).unwrap();
        assert_eq!(xs.len(), 4);
        assert!(xs.set(3, 2.5));
        assert!(!xs.set(4, 1.0));
        xs.update(|slot, x| x + slot as f64);

        let xs = storage.column(pos, 0).unwrap();
        let values: Vec<(usize, f64)> = xs.iter().collect();
        assert_eq!(values, vec![(0, 0.0), (1, 1.0), (2, 2.0), (3, 5.5)]);
        assert_eq!(xs.get(4), None);
        assert_eq!(
            storage.read(pos, Entity::from_index(3), 0),
            Some(5.5)
        );

        let hp = storage.column(ComponentId(1), 0).unwrap();
        assert_eq!(hp.len(), 2);
        assert!(hp.iter().all(|(_, v)| v == 100.0));
        assert!(storage.column(pos, 2).is_none());
    }

    #[test]
    fn tag_has_no_storage() {
        let reg = registry(vec![Component::tag("frozen")], 8);
        let mut storage = StorageManager::new(&reg, 8);
        assert_eq!(storage.byte_len(), 0);
        assert!(storage.storage(ComponentId(0)).is_none());
        assert!(storage.attach(ComponentId(0), Entity::from_index(1)).is_ok());
        assert!(matches!(
            storage.write(ComponentId(0), Entity::from_index(1), 0, 1.0),
            Err(EcsError::UnknownProperty { .. })
        ));
    }

    #[test]
    fn set_buffer_requires_exact_length() {
        let reg = registry(vec![position()], 2);
        let mut storage = StorageManager::new(&reg, 2);
        let err = storage.set_buffer(&[0u8; 3]).unwrap_err();
        assert!(matches!(
            err,
            EcsError::BufferSizeMismatch {
                expected: 16,
                actual: 3
            }
        ));

        let mut bytes = storage.buffer().to_vec();
        bytes[0..4].copy_from_slice(&5.0f32.to_le_bytes());
        storage.set_buffer(&bytes).unwrap();
        assert_eq!(storage.read(ComponentId(0), Entity::from_index(0), 0), Some(5.0));
    }
}
