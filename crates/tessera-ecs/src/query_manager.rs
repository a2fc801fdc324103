//! Registry of compiled queries and their incrementally maintained results.
//!
//! Each [`QueryInstance`] caches the entity set it matched at its last sync.
//! A sync picks one of two paths:
//!
//! - **Full sweep** on first access, or when the candidate archetype set
//!   changed since the last sync: the cache is rebuilt from the `entities` of
//!   every candidate archetype.
//! - **Incremental** otherwise: only dirty candidate archetypes are visited,
//!   and every entity they touched since the last refresh is re-checked
//!   against its current location.
//!
//! The world calls [`QueryManager::refresh`] before clearing archetype diffs,
//! so no membership change is lost between two syncs.

use std::collections::{BTreeSet, HashMap};

use crate::archetype::{Archetype, ArchetypeId, ArchetypeManager};
use crate::component::ComponentRegistry;
use crate::entity::Entity;
use crate::query::{Query, QueryId, QueryInstance};
use crate::EcsError;

/// Owner of every [`QueryInstance`] of a world.
#[derive(Debug, Default)]
pub struct QueryManager {
    instances: Vec<QueryInstance>,
    by_query: HashMap<Query, QueryId>,
}

impl QueryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: QueryId) -> Option<&QueryInstance> {
        self.instances.get(id.index())
    }

    fn instance(&self, id: QueryId) -> Result<&QueryInstance, EcsError> {
        self.get(id).ok_or(EcsError::UnknownQuery { id: id.0 })
    }

    fn instance_mut(&mut self, id: QueryId) -> Result<&mut QueryInstance, EcsError> {
        self.instances
            .get_mut(id.index())
            .ok_or(EcsError::UnknownQuery { id: id.0 })
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueryInstance> {
        self.instances.iter()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Compile `query` and test it against every existing archetype.
    ///
    /// A query equal to one already registered returns the existing id.
    pub(crate) fn register(
        &mut self,
        query: Query,
        registry: &ComponentRegistry,
        archetypes: &mut ArchetypeManager,
    ) -> Result<QueryId, EcsError> {
        if let Some(&id) = self.by_query.get(&query) {
            return Ok(id);
        }
        let id = QueryId(self.instances.len() as u32);
        let mut instance =
            QueryInstance::compile(id, query.clone(), registry, archetypes.component_bits())?;

        for archetype in archetypes.iter_mut() {
            let matches = instance.check_candidacy(archetype.bitfield());
            archetype.cache_candidacy(id, matches);
            if matches {
                instance.archetypes.insert(archetype.id());
            }
        }
        tracing::debug!(
            query = id.0,
            candidates = instance.archetypes.len(),
            "query registered"
        );

        self.instances.push(instance);
        self.by_query.insert(query, id);
        Ok(id)
    }

    /// Test a newly created archetype against every query.
    pub(crate) fn on_archetype_created(&mut self, archetype: &mut Archetype) {
        for instance in &mut self.instances {
            let matches = instance.check_candidacy(archetype.bitfield());
            archetype.cache_candidacy(instance.id(), matches);
            if matches {
                instance.archetypes.insert(archetype.id());
                instance.candidates_changed = true;
                instance.dirty = true;
            }
        }
    }

    /// Mark the queries matching `archetype` dirty after its membership
    /// changed.
    pub(crate) fn on_membership_changed(&mut self, archetype: &Archetype) {
        for id in archetype.matching_queries() {
            if let Some(instance) = self.instances.get_mut(id.index()) {
                instance.dirty = true;
            }
        }
    }

    /// Drop a purged archetype from the candidate sets holding it.
    pub(crate) fn on_archetype_purged(&mut self, archetype: &Archetype) {
        for id in archetype.matching_queries() {
            if let Some(instance) = self.instances.get_mut(id.index()) {
                if instance.archetypes.remove(&archetype.id()) {
                    instance.candidates_changed = true;
                    instance.dirty = true;
                }
            }
        }
    }

    /// From-scratch union of the entities of every candidate archetype.
    pub fn full_sweep(
        &self,
        id: QueryId,
        archetypes: &ArchetypeManager,
    ) -> Result<BTreeSet<Entity>, EcsError> {
        let instance = self.instance(id)?;
        Ok(sweep(&instance.archetypes, archetypes))
    }

    /// Bring the cache of query `id` up to date and return it.
    pub(crate) fn sync(
        &mut self,
        id: QueryId,
        archetypes: &ArchetypeManager,
    ) -> Result<&QueryInstance, EcsError> {
        let instance = self.instance_mut(id)?;
        sync_instance(instance, archetypes);
        Ok(instance)
    }

    /// Entities that started matching query `id` since the last refresh.
    pub fn entered(
        &self,
        id: QueryId,
        archetypes: &ArchetypeManager,
    ) -> Result<BTreeSet<Entity>, EcsError> {
        let instance = self.instance(id)?;
        Ok(net_diff(instance, archetypes, Archetype::entered, Archetype::exited))
    }

    /// Entities that stopped matching query `id` since the last refresh.
    pub fn exited(
        &self,
        id: QueryId,
        archetypes: &ArchetypeManager,
    ) -> Result<BTreeSet<Entity>, EcsError> {
        let instance = self.instance(id)?;
        Ok(net_diff(instance, archetypes, Archetype::exited, Archetype::entered))
    }

    /// Frame-boundary pass: sync every built cache that is dirty, then clear
    /// every dirty flag. Must run before the archetype diffs are cleared.
    pub(crate) fn refresh(&mut self, archetypes: &ArchetypeManager) -> usize {
        let mut synced = 0;
        for instance in &mut self.instances {
            if instance.cache_ready && instance.dirty {
                sync_instance(instance, archetypes);
                synced += 1;
            }
            instance.dirty = false;
        }
        synced
    }
}

fn sweep(candidates: &BTreeSet<ArchetypeId>, archetypes: &ArchetypeManager) -> BTreeSet<Entity> {
    candidates
        .iter()
        .filter_map(|&id| archetypes.get(id))
        .flat_map(|a| a.entities().iter().copied())
        .collect()
}

fn sync_instance(instance: &mut QueryInstance, archetypes: &ArchetypeManager) {
    if !instance.cache_ready || instance.candidates_changed {
        instance.cache = sweep(&instance.archetypes, archetypes);
        instance.cache_ready = true;
        instance.candidates_changed = false;
    } else if instance.dirty {
        let QueryInstance {
            archetypes: candidates,
            cache,
            ..
        } = &mut *instance;
        for archetype in candidates.iter().filter_map(|&id| archetypes.get(id)) {
            if !archetype.is_dirty() {
                continue;
            }
            for &entity in archetype.touched() {
                let member = archetypes
                    .location(entity)
                    .is_some_and(|at| candidates.contains(&at));
                if member {
                    cache.insert(entity);
                } else {
                    cache.remove(&entity);
                }
            }
        }
    }
    instance.dirty = false;
}

/// `(∪ include) \ (∪ exclude)` over the candidate archetypes of `instance`.
fn net_diff(
    instance: &QueryInstance,
    archetypes: &ArchetypeManager,
    include: fn(&Archetype) -> &BTreeSet<Entity>,
    exclude: fn(&Archetype) -> &BTreeSet<Entity>,
) -> BTreeSet<Entity> {
    let candidates: Vec<&Archetype> = instance
        .archetypes
        .iter()
        .filter_map(|&id| archetypes.get(id))
        .collect();
    let excluded: BTreeSet<Entity> = candidates
        .iter()
        .flat_map(|a| exclude(a).iter().copied())
        .collect();
    candidates
        .iter()
        .flat_map(|a| include(a).iter().copied())
        .filter(|e| !excluded.contains(e))
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
