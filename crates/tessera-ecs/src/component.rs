//! Component definitions and their per-world registration.
//!
//! A [`Component`] is an immutable, world-independent template: a unique name,
//! either a [`Schema`] of typed numeric properties or nothing at all (a *tag*),
//! and an optional cap on how many entities may hold it at once.
//!
//! Registering a component in a world produces a [`ComponentInstance`] with a
//! [`ComponentId`]. The id doubles as the component's bit index in every
//! archetype and query [`Bitfield`].

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bitfield::Bitfield;
use crate::entity::Entity;
use crate::EcsError;

// ---------------------------------------------------------------------------
// NumericType
// ---------------------------------------------------------------------------

/// Element type of a schema property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl NumericType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            NumericType::I8 | NumericType::U8 => 1,
            NumericType::I16 | NumericType::U16 => 2,
            NumericType::I32 | NumericType::U32 | NumericType::F32 => 4,
            NumericType::F64 => 8,
        }
    }

    /// Encode `value` little-endian into `out` (exactly `self.size()` bytes).
    ///
    /// Integer targets use Rust's saturating float-to-int conversion.
    pub(crate) fn encode(self, value: f64, out: &mut [u8]) {
        match self {
            NumericType::I8 => out.copy_from_slice(&(value as i8).to_le_bytes()),
            NumericType::U8 => out.copy_from_slice(&(value as u8).to_le_bytes()),
            NumericType::I16 => out.copy_from_slice(&(value as i16).to_le_bytes()),
            NumericType::U16 => out.copy_from_slice(&(value as u16).to_le_bytes()),
            NumericType::I32 => out.copy_from_slice(&(value as i32).to_le_bytes()),
            NumericType::U32 => out.copy_from_slice(&(value as u32).to_le_bytes()),
            NumericType::F32 => out.copy_from_slice(&(value as f32).to_le_bytes()),
            NumericType::F64 => out.copy_from_slice(&value.to_le_bytes()),
        }
    }

    /// Decode a little-endian element from `bytes` (exactly `self.size()` bytes).
    pub(crate) fn decode(self, bytes: &[u8]) -> f64 {
        match self {
            NumericType::I8 => i8::from_le_bytes(le(bytes)) as f64,
            NumericType::U8 => u8::from_le_bytes(le(bytes)) as f64,
            NumericType::I16 => i16::from_le_bytes(le(bytes)) as f64,
            NumericType::U16 => u16::from_le_bytes(le(bytes)) as f64,
            NumericType::I32 => i32::from_le_bytes(le(bytes)) as f64,
            NumericType::U32 => u32::from_le_bytes(le(bytes)) as f64,
            NumericType::F32 => f32::from_le_bytes(le(bytes)) as f64,
            NumericType::F64 => f64::from_le_bytes(le(bytes)),
        }
    }
}

#[inline]
fn le<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// One typed numeric property of a schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: NumericType,
    /// Value written into a slot when storage is created and whenever the
    /// component is removed from the entity owning that slot.
    #[serde(default)]
    pub default: f64,
}

/// Ordered set of typed numeric properties with unique names.
///
/// Serialises as a bare array of [`Property`]; deserialising an array that
/// repeats a name fails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Property>", into = "Vec<Property>")]
pub struct Schema {
    properties: Vec<Property>,
}

impl Schema {
    /// An empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a property with a default of zero.
    pub fn with(self, name: &str, ty: NumericType) -> Self {
        self.with_default(name, ty, 0.0)
    }

    /// Append a property with an explicit default.
    ///
    /// # Panics
    ///
    /// Panics if a property with the same name is already present; use
    /// [`Schema::try_with_default`] for names that come from outside.
    pub fn with_default(self, name: &str, ty: NumericType, default: f64) -> Self {
        match self.try_with_default(name, ty, default) {
            Ok(schema) => schema,
            Err(e) => panic!("{e}"),
        }
    }

    /// Append a property, failing with [`EcsError::InvalidConfig`] if the
    /// name is already taken.
    pub fn try_with_default(
        mut self,
        name: &str,
        ty: NumericType,
        default: f64,
    ) -> Result<Self, EcsError> {
        if self.index_of(name).is_some() {
            return Err(EcsError::InvalidConfig {
                reason: format!("duplicate property {name:?} in schema"),
            });
        }
        self.properties.push(Property {
            name: name.to_owned(),
            ty,
            default,
        });
        Ok(self)
    }

    /// Properties in declaration order.
    pub fn properties(&self) -> &[Property] {
        &self.properties
    }

    /// Position of the property called `name`.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.properties.iter().position(|p| p.name == name)
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.properties.len()
    }

    /// Whether the schema has no properties.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Bytes needed per entity slot across all properties.
    pub fn stride(&self) -> usize {
        self.properties.iter().map(|p| p.ty.size()).sum()
    }
}

impl TryFrom<Vec<Property>> for Schema {
    type Error = EcsError;

    fn try_from(properties: Vec<Property>) -> Result<Self, Self::Error> {
        properties.into_iter().try_fold(Schema::new(), |schema, p| {
            schema.try_with_default(&p.name, p.ty, p.default)
        })
    }
}

impl From<Schema> for Vec<Property> {
    fn from(schema: Schema) -> Self {
        schema.properties
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Storage shape of a component.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentKind {
    /// Presence only; no storage.
    Tag,
    /// Typed numeric properties stored per entity.
    Schema(Schema),
}

/// An immutable component definition, independent of any world.
///
/// Serialises as `{ "name", "schema", "max_entities" }` where a missing or
/// `null` schema marks a tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ComponentDef", into = "ComponentDef")]
pub struct Component {
    name: String,
    kind: ComponentKind,
    max_entities: Option<usize>,
}

/// Wire form of [`Component`].
#[derive(Serialize, Deserialize)]
struct ComponentDef {
    name: String,
    #[serde(default)]
    schema: Option<Schema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max_entities: Option<usize>,
}

impl From<ComponentDef> for Component {
    fn from(def: ComponentDef) -> Self {
        Self {
            name: def.name,
            kind: match def.schema {
                Some(schema) => ComponentKind::Schema(schema),
                None => ComponentKind::Tag,
            },
            max_entities: def.max_entities,
        }
    }
}

impl From<Component> for ComponentDef {
    fn from(component: Component) -> Self {
        let schema = match component.kind {
            ComponentKind::Tag => None,
            ComponentKind::Schema(schema) => Some(schema),
        };
        Self {
            name: component.name,
            schema,
            max_entities: component.max_entities,
        }
    }
}

impl Component {
    /// A presence-only component.
    pub fn tag(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            kind: ComponentKind::Tag,
            max_entities: None,
        }
    }

    /// A component carrying the properties of `schema`.
    pub fn with_schema(name: &str, schema: Schema) -> Self {
        Self {
            name: name.to_owned(),
            kind: ComponentKind::Schema(schema),
            max_entities: None,
        }
    }

    /// Cap the number of entities that may hold this component in one world.
    pub fn with_max_entities(mut self, max_entities: usize) -> Self {
        self.max_entities = Some(max_entities);
        self
    }

    /// Parse a list of component definitions from JSON.
    pub fn catalogue_from_json(json: &str) -> Result<Vec<Component>, EcsError> {
        serde_json::from_str(json).map_err(|e| EcsError::InvalidConfig {
            reason: format!("component catalogue: {e}"),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &ComponentKind {
        &self.kind
    }

    /// The schema, or `None` for a tag.
    pub fn schema(&self) -> Option<&Schema> {
        match &self.kind {
            ComponentKind::Tag => None,
            ComponentKind::Schema(schema) => Some(schema),
        }
    }

    pub fn is_tag(&self) -> bool {
        matches!(self.kind, ComponentKind::Tag)
    }

    pub fn max_entities(&self) -> Option<usize> {
        self.max_entities
    }
}

// ---------------------------------------------------------------------------
// ComponentId
// ---------------------------------------------------------------------------

/// Per-world identifier of a registered component; also its bit index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    /// Bit index of this component in archetype and query bitfields.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInstance
// ---------------------------------------------------------------------------

/// A component bound to one world.
#[derive(Debug, Clone)]
pub struct ComponentInstance {
    id: ComponentId,
    component: Component,
    /// Bit per entity, set while that entity holds the component.
    owners: Bitfield,
    /// Entities written through [`World::set`](crate::world::World::set)
    /// since the last refresh.
    changed: BTreeSet<Entity>,
}

impl ComponentInstance {
    fn new(id: ComponentId, component: Component, capacity: usize) -> Self {
        Self {
            id,
            component,
            owners: Bitfield::new(capacity),
            changed: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    pub fn name(&self) -> &str {
        self.component.name()
    }

    /// Whether `entity` currently holds this component.
    pub fn is_owned_by(&self, entity: Entity) -> bool {
        self.owners.is_set(entity.index()).unwrap_or(false)
    }

    /// Number of entities currently holding this component.
    pub fn owner_count(&self) -> usize {
        self.owners.population_count() as usize
    }

    pub fn owners(&self) -> &Bitfield {
        &self.owners
    }

    pub fn changed(&self) -> &BTreeSet<Entity> {
        &self.changed
    }

    pub(crate) fn set_owner(&mut self, entity: Entity, owned: bool) -> Result<(), EcsError> {
        if !owned {
            self.changed.remove(&entity);
        }
        self.owners.set(entity.index(), owned)
    }

    pub(crate) fn mark_changed(&mut self, entity: Entity) {
        self.changed.insert(entity);
    }

    pub(crate) fn clear_changed(&mut self) {
        self.changed.clear();
    }
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry of the components known to one world, indexed by [`ComponentId`].
#[derive(Debug)]
pub struct ComponentRegistry {
    by_name: HashMap<String, ComponentId>,
    instances: Vec<ComponentInstance>,
    capacity: usize,
}

impl ComponentRegistry {
    /// Create an empty registry for a world of `capacity` entities.
    pub fn new(capacity: usize) -> Self {
        Self {
            by_name: HashMap::new(),
            instances: Vec::new(),
            capacity,
        }
    }

    /// Register `component` under the next free id.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateComponent`] if the name is already taken.
    pub fn register(&mut self, component: Component) -> Result<ComponentId, EcsError> {
        if self.by_name.contains_key(component.name()) {
            return Err(EcsError::DuplicateComponent {
                name: component.name().to_owned(),
            });
        }
        let id = ComponentId(self.instances.len() as u32);
        self.by_name.insert(component.name().to_owned(), id);
        self.instances
            .push(ComponentInstance::new(id, component, self.capacity));
        Ok(id)
    }

    /// Look up a component id by name.
    pub fn lookup(&self, name: &str) -> Option<ComponentId> {
        self.by_name.get(name).copied()
    }

    /// Look up a component id by name, failing with the list of known names.
    pub fn resolve(&self, name: &str) -> Result<ComponentId, EcsError> {
        self.lookup(name).ok_or_else(|| EcsError::UnknownComponent {
            name: name.to_owned(),
            registered: self.registered_names().join(", "),
        })
    }

    pub fn get(&self, id: ComponentId) -> Option<&ComponentInstance> {
        self.instances.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: ComponentId) -> Option<&mut ComponentInstance> {
        self.instances.get_mut(id.index())
    }

    /// Instances in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInstance> {
        self.instances.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut ComponentInstance> {
        self.instances.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Names of all registered components, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
