//! Declarative component queries.
//!
//! A [`Query`] names components in three lists: every entity must hold all of
//! `all`, at least one of `any` (when `any` is non-empty), and none of `none`.
//! Registering a query in a world compiles it into a [`QueryInstance`] whose
//! [`QueryMask`] holds the three lists as AND/OR/NOT bitfields of the world's
//! width. Archetypes are matched against the mask one word at a time.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::archetype::ArchetypeId;
use crate::bitfield::Bitfield;
use crate::component::{ComponentId, ComponentRegistry};
use crate::entity::Entity;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Query
// ---------------------------------------------------------------------------

/// A world-independent all/any/none component filter, by component name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub all: Vec<String>,
    pub any: Vec<String>,
    pub none: Vec<String>,
}

fn names<I, S>(names: I) -> impl Iterator<Item = String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names.into_iter().map(|s| s.as_ref().to_owned())
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require every component in `components`.
    pub fn all<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.all.extend(names(components));
        self
    }

    /// Require at least one component in `components`.
    pub fn any<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.any.extend(names(components));
        self
    }

    /// Exclude every component in `components`.
    pub fn none<I, S>(mut self, components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.none.extend(names(components));
        self
    }
}

// ---------------------------------------------------------------------------
// QueryId
// ---------------------------------------------------------------------------

/// Per-world handle of a registered query.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryId(pub(crate) u32);

impl QueryId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// QueryMask
// ---------------------------------------------------------------------------

/// Compiled AND/OR/NOT bitmasks of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryMask {
    pub and: Bitfield,
    pub or: Bitfield,
    pub not: Bitfield,
}

impl QueryMask {
    /// Whether an archetype with signature `target` satisfies the mask.
    ///
    /// Every word must pass three tests: it holds all AND bits, it holds at
    /// least one OR bit (skipped when the OR word is zero), and it holds no
    /// NOT bit. Stops at the first failing word.
    pub fn matches(&self, target: &Bitfield) -> bool {
        let and = self.and.words();
        let or = self.or.words();
        let not = self.not.words();
        target.words().iter().enumerate().all(|(i, &word)| {
            let and_word = and.get(i).copied().unwrap_or(0);
            let or_word = or.get(i).copied().unwrap_or(0);
            let not_word = not.get(i).copied().unwrap_or(0);
            (or_word == 0 || word & or_word != 0)
                && word & and_word == and_word
                && word & not_word == 0
        })
    }
}

// ---------------------------------------------------------------------------
// QueryInstance
// ---------------------------------------------------------------------------

/// A query compiled for one world, with its candidate archetypes and cached
/// result.
#[derive(Debug, Clone)]
pub struct QueryInstance {
    id: QueryId,
    query: Query,
    mask: QueryMask,
    /// Union of the `all` and `any` components, by name.
    components: BTreeMap<String, ComponentId>,
    pub(crate) archetypes: BTreeSet<ArchetypeId>,
    pub(crate) dirty: bool,
    /// The candidate set changed since the cache was last built.
    pub(crate) candidates_changed: bool,
    pub(crate) cache: BTreeSet<Entity>,
    pub(crate) cache_ready: bool,
}

impl QueryInstance {
    /// Compile `query` against the components of one world.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponent`] for any name not in `registry`.
    pub(crate) fn compile(
        id: QueryId,
        query: Query,
        registry: &ComponentRegistry,
        component_bits: usize,
    ) -> Result<Self, EcsError> {
        let resolve = |list: &[String]| -> Result<Vec<ComponentId>, EcsError> {
            list.iter().map(|name| registry.resolve(name)).collect()
        };
        let all = resolve(&query.all)?;
        let any = resolve(&query.any)?;
        let none = resolve(&query.none)?;

        let bits = |ids: &[ComponentId]| {
            Bitfield::from_keys(component_bits, ids.iter().map(|c| c.index()))
        };
        let mask = QueryMask {
            and: bits(&all)?,
            or: bits(&any)?,
            not: bits(&none)?,
        };

        let components = query
            .all
            .iter()
            .zip(&all)
            .chain(query.any.iter().zip(&any))
            .map(|(name, &cid)| (name.clone(), cid))
            .collect();

        Ok(Self {
            id,
            query,
            mask,
            components,
            archetypes: BTreeSet::new(),
            dirty: true,
            candidates_changed: true,
            cache: BTreeSet::new(),
            cache_ready: false,
        })
    }

    pub fn id(&self) -> QueryId {
        self.id
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn mask(&self) -> &QueryMask {
        &self.mask
    }

    /// Whether an archetype with signature `target` is a candidate.
    pub fn check_candidacy(&self, target: &Bitfield) -> bool {
        self.mask.matches(target)
    }

    /// Components named in `all` or `any`.
    pub fn components(&self) -> &BTreeMap<String, ComponentId> {
        &self.components
    }

    /// Archetypes found to match at the last candidacy pass.
    pub fn archetypes(&self) -> &BTreeSet<ArchetypeId> {
        &self.archetypes
    }

    /// Whether the cached result may be out of date.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The cached entity set as of the last sync.
    pub fn cached(&self) -> &BTreeSet<Entity> {
        &self.cache
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
