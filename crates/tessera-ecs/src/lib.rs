//! Tessera ECS -- bitfield archetypes over a packed component buffer.
//!
//! Entities are plain indices into a capacity-bounded table. Components are
//! either tags or schemas of typed numeric properties; all schema data of a
//! world lives in one contiguous byte buffer carved into per-property arrays.
//! Entities with the same component set share an archetype, identified by the
//! value of its component [`Bitfield`](bitfield::Bitfield). Queries compile to
//! AND/OR/NOT bitmasks and keep an incrementally maintained result cache.
//!
//! # Quick Start
//!
//! ```
//! use tessera_ecs::prelude::*;
//!
//! let position = Component::with_schema(
//!     "position",
//!     Schema::new().with("x", NumericType::F32).with("y", NumericType::F32),
//! );
//! let mut world = World::new(
//!     [position, Component::tag("frozen")],
//!     WorldConfig::with_capacity(128),
//! )
//! .unwrap();
//!
//! let moving = world
//!     .register_query(Query::new().all(["position"]).none(["frozen"]))
//!     .unwrap();
//!
//! let e = world.create_entity().unwrap();
//! world.add_component_with(e, "position", &[("x", 1.0)]).unwrap();
//!
//! assert!(world.query_entities(moving).unwrap().contains(&e));
//! assert_eq!(world.get(e, "position", "x").unwrap(), 1.0);
//! world.refresh();
//! ```

#![deny(unsafe_code)]

pub mod archetype;
pub mod bitfield;
pub mod bitpool;
pub mod component;
pub mod entity;
pub mod query;
pub mod query_manager;
pub mod snapshot;
pub mod storage;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
///
/// Idempotent operations (adding a component an entity already holds,
/// removing one it lacks, releasing a free pool slot) never produce an error.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// Every entity index is live or waiting to be recycled.
    #[error("entity capacity of {capacity} exhausted")]
    EntityCapacity { capacity: usize },

    /// The component already has `max_entities` holders.
    #[error("component '{component}' is limited to {max_entities} entities")]
    ComponentCapacity {
        component: String,
        max_entities: usize,
    },

    /// A foreign buffer does not have the live buffer's byte length.
    #[error("buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    /// A snapshot was taken from a world of another capacity.
    #[error("capacity mismatch: world has {expected}, snapshot has {actual}")]
    CapacityMismatch { expected: usize, actual: usize },

    /// A snapshot was taken by another version.
    #[error("version mismatch: world is '{expected}', snapshot is '{actual}'")]
    VersionMismatch { expected: String, actual: String },

    /// A bit index lies outside a bitfield's allocated width.
    #[error("bit {bit} is outside the bitfield width of {width}")]
    BitOutOfRange { bit: usize, width: usize },

    /// A component name was referenced that is not registered.
    #[error("component '{name}' not registered. Registered components: [{registered}]")]
    UnknownComponent { name: String, registered: String },

    /// A component name was registered twice.
    #[error("component '{name}' is already registered")]
    DuplicateComponent { name: String },

    /// A component was registered after registration closed for it.
    #[error("cannot register component '{name}': {reason}")]
    RegistrationClosed { name: String, reason: String },

    /// The component has no property of that name (tags have none).
    #[error("component '{component}' has no property '{property}'")]
    UnknownProperty { component: String, property: String },

    /// The entity does not hold the component.
    #[error("entity {entity} does not have component '{component}'")]
    MissingComponent {
        entity: entity::Entity,
        component: String,
    },

    /// The entity is not alive.
    #[error("entity {entity} does not exist (destroyed or never created)")]
    StaleEntity { entity: entity::Entity },

    /// No query is registered under this id.
    #[error("query {id} is not registered")]
    UnknownQuery { id: u32 },

    /// A config, catalogue or snapshot could not be used.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId};
    pub use crate::bitfield::Bitfield;
    pub use crate::component::{Component, ComponentId, NumericType, Property, Schema};
    pub use crate::entity::Entity;
    pub use crate::query::{Query, QueryId};
    pub use crate::storage::{PropertyColumn, PropertyColumnMut};
    pub use crate::snapshot::WorldSnapshot;
    pub use crate::world::{World, WorldConfig};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
