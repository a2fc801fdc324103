//! Entity identifiers and allocation.
//!
//! An [`Entity`] is a plain index into the world's capacity-bounded entity
//! table. Indices come from a [`Bitpool`] and are recycled, but only at the
//! next frame boundary: a destroyed index is parked until
//! [`EntityAllocator::recycle_pending`] runs, so within one frame an index can
//! never refer to two different entities.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bitfield::Bitfield;
use crate::bitpool::Bitpool;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// An entity handle. Carries no identity beyond its index.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(u32);

impl Entity {
    /// Construct an `Entity` from a raw index.
    #[inline]
    pub fn from_index(index: u32) -> Self {
        Self(index)
    }

    /// The entity's slot in every per-entity table.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Raw `u32` representation.
    #[inline]
    pub fn to_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

/// Allocates and recycles [`Entity`] indices within a fixed capacity.
#[derive(Debug)]
pub struct EntityAllocator {
    /// Free-list of indices (bit set = free).
    pool: Bitpool,
    /// Bit set while the entity is alive.
    alive: Bitfield,
    /// Indices destroyed since the last recycle, not yet back in `pool`.
    pending: Vec<Entity>,
    /// Number of alive entities.
    alive_count: usize,
}

impl EntityAllocator {
    /// Create an allocator for `capacity` entities.
    pub fn new(capacity: usize) -> Self {
        Self {
            pool: Bitpool::new(capacity),
            alive: Bitfield::new(capacity),
            pending: Vec::new(),
            alive_count: 0,
        }
    }

    /// Allocate a fresh entity, or `None` if every index is in use or still
    /// waiting to be recycled.
    pub fn allocate(&mut self) -> Option<Entity> {
        let index = self.pool.acquire()?;
        // The pool and the alive field share the same width.
        let _ = self.alive.set(index, true);
        self.alive_count += 1;
        Some(Entity(index as u32))
    }

    /// Mark `entity` as destroyed. Its index is recycled on the next
    /// [`recycle_pending`](Self::recycle_pending).
    ///
    /// Returns `false` if the entity was not alive.
    pub fn deallocate(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let _ = self.alive.set(entity.index(), false);
        self.alive_count -= 1;
        self.pending.push(entity);
        true
    }

    /// Whether `entity` is currently alive.
    pub fn is_alive(&self, entity: Entity) -> bool {
        entity.index() < self.pool.size() && self.alive.is_set(entity.index()).unwrap_or(false)
    }

    /// Return every index destroyed since the last call to the free pool.
    ///
    /// Returns how many indices were recycled.
    pub fn recycle_pending(&mut self) -> usize {
        let count = self.pending.len();
        for entity in self.pending.drain(..) {
            self.pool.release(entity.index());
        }
        count
    }

    /// Indices destroyed but not yet recycled.
    pub fn pending(&self) -> &[Entity] {
        &self.pending
    }

    /// Number of alive entities.
    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Maximum number of simultaneously allocated indices.
    pub fn capacity(&self) -> usize {
        self.pool.size()
    }

    /// Iterate alive entities in index order.
    pub fn iter_alive(&self) -> impl Iterator<Item = Entity> + '_ {
        self.alive.ones().map(|i| Entity(i as u32))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
