// src/graph/name.rs

//! Package names and per-traversal scratch state

use super::{NameId, PackageId};
use crate::arena::Arena;
use crate::atom::Atom;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Stamp identifying one traversal over the graph
///
/// Scratch data tagged with an older stamp reads as empty, so starting a new
/// traversal never has to walk every node to reset it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u32);

impl Generation {
    pub(crate) fn next(self) -> Self {
        Self(self.0.wrapping_add(1).max(1))
    }
}

/// Classification a traversal assigns to a name or package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeState {
    /// Selected through a concrete provider
    Present,
    /// Required but nothing selected provides it
    Missing,
    /// Only provided through a versionless provides entry
    VirtualOnly,
    /// Pulled in through an install-if rule
    InstallIf,
}

impl NodeState {
    fn bit(self) -> u8 {
        match self {
            NodeState::Present => 1,
            NodeState::Missing => 2,
            NodeState::VirtualOnly => 4,
            NodeState::InstallIf => 8,
        }
    }
}

/// Small set of [`NodeState`] values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateSet(u8);

impl StateSet {
    pub const EMPTY: Self = Self(0);

    pub fn of(states: &[NodeState]) -> Self {
        Self(states.iter().fold(0, |acc, s| acc | s.bit()))
    }

    pub fn contains(self, state: NodeState) -> bool {
        self.0 & state.bit() != 0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, state: NodeState) {
        self.0 |= state.bit();
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Transient traversal data carried by names and packages
#[derive(Debug, Clone, Copy, Default)]
pub struct Scratch {
    generation: Generation,
    states: StateSet,
    refs: u32,
}

impl Scratch {
    /// Scratch for `generation`, resetting it first if it is stale
    pub fn at(&mut self, generation: Generation) -> &mut Self {
        if self.generation != generation {
            *self = Self {
                generation,
                ..Self::default()
            };
        }
        self
    }

    /// States recorded during `generation`
    pub fn states(&self, generation: Generation) -> StateSet {
        if self.generation == generation {
            self.states
        } else {
            StateSet::EMPTY
        }
    }

    /// Reference count recorded during `generation`
    pub fn refs(&self, generation: Generation) -> u32 {
        if self.generation == generation { self.refs } else { 0 }
    }

    pub fn insert(&mut self, state: NodeState) {
        self.states.insert(state);
    }

    pub fn set_refs(&mut self, refs: u32) {
        self.refs = refs;
    }
}

/// A package satisfying a name, with the version it provides it at
///
/// A `None` version denotes a virtual (versionless) provide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub pkg: PackageId,
    pub version: Option<Atom>,
}

/// Canonical record for one package name
#[derive(Debug)]
pub struct Name {
    pub name: String,
    /// Providers in insertion order, including packages of this exact name
    pub providers: Vec<Provider>,
    /// Names of packages that depend on this name
    pub rdepends: Vec<NameId>,
    /// Names of packages whose install-if references this name
    pub rinstall_if: Vec<NameId>,
    /// Some package depends on this name without a conflict
    pub is_dependency: bool,
    pub(crate) scratch: Scratch,
}

impl Name {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            providers: Vec::new(),
            rdepends: Vec::new(),
            rinstall_if: Vec::new(),
            is_dependency: false,
            scratch: Scratch::default(),
        }
    }

    /// Traversal states of this name during `generation`
    pub fn states(&self, generation: Generation) -> StateSet {
        self.scratch.states(generation)
    }
}

/// Display ordering for names: case-insensitive first, then case-sensitive
pub fn cmp_display(a: &str, b: &str) -> Ordering {
    a.bytes()
        .map(|c| c.to_ascii_lowercase())
        .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
        .then_with(|| a.cmp(b))
}

/// Hash-indexed identity table for names
#[derive(Default)]
pub struct NameTable {
    names: Arena<Name>,
    index: HashMap<String, NameId>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find a name without allocating
    pub fn lookup(&self, name: &str) -> Option<NameId> {
        self.index.get(name).copied()
    }

    /// Find a name, creating it on first use
    pub fn lookup_or_create(&mut self, name: &str) -> NameId {
        if let Some(id) = self.index.get(name) {
            return *id;
        }
        let id = self.names.alloc(Name::new(name));
        self.index.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, id: NameId) -> &Name {
        &self.names[id]
    }

    pub fn get_mut(&mut self, id: NameId) -> &mut Name {
        &mut self.names[id]
    }

    pub fn iter(&self) -> impl Iterator<Item = (NameId, &Name)> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
