//! Archetypes: groups of entities sharing one exact component signature.
//!
//! The [`ArchetypeManager`] owns every [`Archetype`] of a world and the
//! entity-to-archetype location table. Archetypes are deduplicated by the value
//! of their [`Bitfield`]: two entities that end up with the same component set
//! always share one archetype record.
//!
//! Each archetype records which entities joined (`entered`) and left
//! (`exited`) since the last refresh. The two sets are a net diff: an entity
//! that leaves and comes back before the refresh appears in neither. A
//! separate `touched` set keeps every entity that moved at all, which is what
//! the query cache reconciles against.

use std::collections::{BTreeSet, HashMap};

use crate::bitfield::Bitfield;
use crate::entity::Entity;
use crate::query::QueryId;
use crate::EcsError;

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Identifies an archetype within its world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// The live set of entities sharing one component signature.
#[derive(Debug, Clone)]
pub struct Archetype {
    id: ArchetypeId,
    bitfield: Bitfield,
    entities: BTreeSet<Entity>,
    entered: BTreeSet<Entity>,
    exited: BTreeSet<Entity>,
    touched: BTreeSet<Entity>,
    dirty: bool,
    /// Last known candidacy result per query.
    candidate_cache: HashMap<QueryId, bool>,
}

impl Archetype {
    fn new(id: ArchetypeId, bitfield: Bitfield) -> Self {
        Self {
            id,
            bitfield,
            entities: BTreeSet::new(),
            entered: BTreeSet::new(),
            exited: BTreeSet::new(),
            touched: BTreeSet::new(),
            dirty: false,
            candidate_cache: HashMap::new(),
        }
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The component signature.
    pub fn bitfield(&self) -> &Bitfield {
        &self.bitfield
    }

    pub fn entities(&self) -> &BTreeSet<Entity> {
        &self.entities
    }

    /// Entities that joined since the last refresh and are still here.
    pub fn entered(&self) -> &BTreeSet<Entity> {
        &self.entered
    }

    /// Entities that were here at the last refresh and have since left.
    pub fn exited(&self) -> &BTreeSet<Entity> {
        &self.exited
    }

    /// Every entity that joined or left since the last refresh.
    pub fn touched(&self) -> &BTreeSet<Entity> {
        &self.touched
    }

    /// Whether membership changed since the last refresh.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.entities.contains(&entity)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    fn insert(&mut self, entity: Entity) {
        if !self.entities.insert(entity) {
            return;
        }
        if !self.exited.remove(&entity) {
            self.entered.insert(entity);
        }
        self.touched.insert(entity);
        self.dirty = true;
    }

    fn remove(&mut self, entity: Entity) -> bool {
        if !self.entities.remove(&entity) {
            return false;
        }
        if !self.entered.remove(&entity) {
            self.exited.insert(entity);
        }
        self.touched.insert(entity);
        self.dirty = true;
        true
    }

    fn clear_diff(&mut self) {
        self.entered.clear();
        self.exited.clear();
        self.touched.clear();
        self.dirty = false;
    }

    /// Cached candidacy of this archetype for `query`, if it was ever tested.
    pub fn cached_candidacy(&self, query: QueryId) -> Option<bool> {
        self.candidate_cache.get(&query).copied()
    }

    pub(crate) fn cache_candidacy(&mut self, query: QueryId, matches: bool) {
        self.candidate_cache.insert(query, matches);
    }

    /// Queries this archetype is known to be a candidate for.
    pub fn matching_queries(&self) -> impl Iterator<Item = QueryId> + '_ {
        self.candidate_cache
            .iter()
            .filter(|(_, matches)| **matches)
            .map(|(id, _)| *id)
    }
}

// ---------------------------------------------------------------------------
// Transition
// ---------------------------------------------------------------------------

/// Outcome of moving one entity between archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub entity: Entity,
    /// Previous archetype, `None` for a freshly created entity.
    pub from: Option<ArchetypeId>,
    /// New archetype, `None` for a destroyed entity.
    pub to: Option<ArchetypeId>,
    /// Set when `to` was created by this transition.
    pub created: Option<ArchetypeId>,
}

// ---------------------------------------------------------------------------
// ArchetypeManager
// ---------------------------------------------------------------------------

/// Registry of archetypes keyed by bitfield value, plus entity locations.
#[derive(Debug)]
pub struct ArchetypeManager {
    /// Indexed by `ArchetypeId`; `None` for purged slots.
    archetypes: Vec<Option<Archetype>>,
    /// Purged slots available for reuse.
    free: Vec<ArchetypeId>,
    index: HashMap<Bitfield, ArchetypeId>,
    /// Current archetype of each entity index.
    locations: Vec<Option<ArchetypeId>>,
    /// Width in bits given to every bitfield.
    component_bits: usize,
    /// Archetype of entities holding no component.
    root: ArchetypeId,
}

impl ArchetypeManager {
    /// Create a manager for `component_bits` components and `capacity`
    /// entities. The root (empty) archetype exists from the start.
    pub fn new(component_bits: usize, capacity: usize) -> Self {
        let root = ArchetypeId(0);
        let empty = Bitfield::new(component_bits);
        let mut index = HashMap::new();
        index.insert(empty.clone(), root);
        Self {
            archetypes: vec![Some(Archetype::new(root, empty))],
            free: Vec::new(),
            index,
            locations: vec![None; capacity],
            component_bits,
            root,
        }
    }

    /// Number of bits addressable in every archetype bitfield.
    pub fn bit_width(&self) -> usize {
        Bitfield::new(self.component_bits).width()
    }

    /// Width, in bits, that query masks must be built with.
    pub fn component_bits(&self) -> usize {
        self.component_bits
    }

    pub fn root(&self) -> ArchetypeId {
        self.root
    }

    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index()).and_then(|a| a.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.index()).and_then(|a| a.as_mut())
    }

    /// Archetype registered under exactly `bitfield`.
    pub fn find(&self, bitfield: &Bitfield) -> Option<ArchetypeId> {
        self.index.get(bitfield).copied()
    }

    /// Live archetypes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter().flatten()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Archetype> {
        self.archetypes.iter_mut().flatten()
    }

    /// Number of live archetypes, root included.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Current archetype of `entity`, `None` when unassigned.
    pub fn location(&self, entity: Entity) -> Option<ArchetypeId> {
        self.locations.get(entity.index()).copied().flatten()
    }

    fn get_or_create(&mut self, bitfield: Bitfield) -> (ArchetypeId, bool) {
        if let Some(&id) = self.index.get(&bitfield) {
            return (id, false);
        }
        let id = match self.free.pop() {
            Some(id) => id,
            None => {
                self.archetypes.push(None);
                ArchetypeId(self.archetypes.len() as u32 - 1)
            }
        };
        tracing::debug!(
            archetype = id.0,
            key = %bitfield,
            components = bitfield.population_count(),
            "archetype created"
        );
        self.index.insert(bitfield.clone(), id);
        self.archetypes[id.index()] = Some(Archetype::new(id, bitfield));
        (id, true)
    }

    fn move_entity(
        &mut self,
        entity: Entity,
        to: Option<ArchetypeId>,
        created: Option<ArchetypeId>,
    ) -> Transition {
        let from = self.location(entity);
        if let Some(archetype) = from.and_then(|id| self.get_mut(id)) {
            archetype.remove(entity);
        }
        if let Some(archetype) = to.and_then(|id| self.get_mut(id)) {
            archetype.insert(entity);
        }
        if let Some(slot) = self.locations.get_mut(entity.index()) {
            *slot = to;
        }
        Transition {
            entity,
            from,
            to,
            created,
        }
    }

    /// Place a newly created entity in the root archetype.
    pub(crate) fn insert_root(&mut self, entity: Entity) -> Transition {
        let root = self.root;
        self.move_entity(entity, Some(root), None)
    }

    /// Move `entity` to the archetype whose bitfield differs from its current
    /// one in exactly `bit`, creating that archetype if it was never seen.
    ///
    /// # Errors
    ///
    /// [`EcsError::BitOutOfRange`] when `bit` does not fit the bitfield width.
    /// The entity stays where it was.
    pub(crate) fn toggle(&mut self, entity: Entity, bit: usize) -> Result<Transition, EcsError> {
        let current = self
            .location(entity)
            .and_then(|id| self.get(id))
            .map(|a| a.bitfield.clone())
            .unwrap_or_else(|| Bitfield::new(self.component_bits));
        let next = current.toggled_clone([bit])?;
        let (to, created) = self.get_or_create(next);
        Ok(self.move_entity(entity, Some(to), created.then_some(to)))
    }

    /// Take `entity` out of its archetype and leave it unassigned.
    pub(crate) fn remove_entity(&mut self, entity: Entity) -> Option<Transition> {
        self.location(entity)?;
        Some(self.move_entity(entity, None, None))
    }

    /// Reset the entered/exited/touched sets and dirty flag of every
    /// archetype.
    pub(crate) fn clear_diffs(&mut self) -> usize {
        let mut touched = 0;
        for archetype in self.iter_mut().filter(|a| a.dirty) {
            archetype.clear_diff();
            touched += 1;
        }
        touched
    }

    /// Remove every archetype that is empty, clean and not the root.
    ///
    /// Returns the removed archetypes so their queries can be told.
    pub(crate) fn purge_empty(&mut self) -> Vec<Archetype> {
        let root = self.root;
        let doomed: Vec<ArchetypeId> = self
            .iter()
            .filter(|a| a.id != root && a.is_empty() && !a.dirty)
            .map(|a| a.id)
            .collect();
        let mut purged = Vec::with_capacity(doomed.len());
        for id in doomed {
            if let Some(archetype) = self.archetypes[id.index()].take() {
                self.index.remove(&archetype.bitfield);
                self.free.push(id);
                purged.push(archetype);
            }
        }
        purged
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn e(i: u32) -> Entity {
        Entity::from_index(i)
    }

    #[test]
    fn new_entity_lands_in_root() {
        let mut mgr = ArchetypeManager::new(4, 8);
        let t = mgr.insert_root(e(0));
        assert_eq!(t.from, None);
        assert_eq!(t.to, Some(mgr.root()));
        assert!(mgr.get(mgr.root()).unwrap().contains(e(0)));
        assert!(mgr.get(mgr.root()).unwrap().bitfield().is_empty());
    }

    #[test]
    fn same_component_set_shares_archetype() {
        let mut mgr = ArchetypeManager::new(4, 8);
        mgr.insert_root(e(0));
        mgr.insert_root(e(1));
        let a = mgr.toggle(e(0), 1).unwrap();
        let b = mgr.toggle(e(1), 1).unwrap();
        assert_eq!(a.to, b.to);
        assert!(a.created.is_some());
        assert!(b.created.is_none());
        assert_eq!(mgr.len(), 2);
        assert_eq!(mgr.get(a.to.unwrap()).unwrap().len(), 2);
    }

    #[test]
    fn order_of_adds_does_not_matter() {
        let mut mgr = ArchetypeManager::new(4, 8);
        mgr.insert_root(e(0));
        mgr.insert_root(e(1));
        mgr.toggle(e(0), 0).unwrap();
        mgr.toggle(e(0), 2).unwrap();
        mgr.toggle(e(1), 2).unwrap();
        mgr.toggle(e(1), 0).unwrap();
        assert_eq!(mgr.location(e(0)), mgr.location(e(1)));
    }

    #[test]
    fn transition_records_net_diff() {
        let mut mgr = ArchetypeManager::new(4, 8);
        mgr.insert_root(e(0));
        mgr.clear_diffs();

        let t = mgr.toggle(e(0), 0).unwrap();
        let root = mgr.get(mgr.root()).unwrap();
        assert!(root.exited().contains(&e(0)));
        assert!(root.is_dirty());
        let a = mgr.get(t.to.unwrap()).unwrap();
        assert!(a.entered().contains(&e(0)));

        // Going back cancels both sides of the diff.
        mgr.toggle(e(0), 0).unwrap();
        let root = mgr.get(mgr.root()).unwrap();
        assert!(root.exited().is_empty());
        assert!(root.entered().is_empty());
        assert!(root.touched().contains(&e(0)));
        let a = mgr.get(t.to.unwrap()).unwrap();
        assert!(a.entered().is_empty());
        assert!(a.exited().is_empty());
    }

    #[test]
    fn clear_diffs_resets_dirty_state() {
        let mut mgr = ArchetypeManager::new(4, 8);
        mgr.insert_root(e(0));
        mgr.toggle(e(0), 3).unwrap();
        assert_eq!(mgr.clear_diffs(), 2);
        assert!(mgr.iter().all(|a| !a.is_dirty() && a.touched().is_empty()));
    }

    #[test]
    fn out_of_range_bit_leaves_entity_in_place() {
        let mut mgr = ArchetypeManager::new(4, 8);
        mgr.insert_root(e(0));
        assert!(matches!(
            mgr.toggle(e(0), 40),
            Err(EcsError::BitOutOfRange { bit: 40, .. })
        ));
        assert_eq!(mgr.location(e(0)), Some(mgr.root()));
    }

    #[test]
    fn purge_skips_root_and_dirty_archetypes() {
        let mut mgr = ArchetypeManager::new(4, 8);
        mgr.insert_root(e(0));
        let t = mgr.toggle(e(0), 1).unwrap();
        mgr.remove_entity(e(0));
        // Empty but still dirty: kept until the diff is cleared.
        assert!(mgr.purge_empty().is_empty());
        mgr.clear_diffs();
        let purged = mgr.purge_empty();
        assert_eq!(purged.len(), 1);
        assert_eq!(purged[0].id(), t.to.unwrap());
        assert!(mgr.get(mgr.root()).is_some());
        assert_eq!(mgr.len(), 1);

        // The freed slot is reused for the next new signature.
        mgr.insert_root(e(1));
        let t2 = mgr.toggle(e(1), 2).unwrap();
        assert_eq!(t2.to, t.to);
    }

    #[test]
    fn removed_entity_is_unassigned() {
        let mut mgr = ArchetypeManager::new(4, 8);
        mgr.insert_root(e(3));
        let t = mgr.remove_entity(e(3)).unwrap();
        assert_eq!(t.to, None);
        assert_eq!(mgr.location(e(3)), None);
        assert!(mgr.remove_entity(e(3)).is_none());
    }
}
