// src/atom.rs

//! Interned byte strings
//!
//! Versions, architectures and repository tags repeat heavily across an index.
//! The pool hands out one shared allocation per distinct content so equal
//! atoms can be compared by pointer.

use std::collections::HashSet;
use std::rc::Rc;

/// Interned string; equal content always shares one allocation within a pool
pub type Atom = Rc<str>;

/// Hash-indexed set of atoms
#[derive(Debug, Default)]
pub struct AtomPool {
    atoms: HashSet<Rc<str>>,
}

impl AtomPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the canonical atom for `value`, creating it on first use
    pub fn intern(&mut self, value: &str) -> Atom {
        if let Some(atom) = self.atoms.get(value) {
            return Rc::clone(atom);
        }
        let atom: Atom = Rc::from(value);
        self.atoms.insert(Rc::clone(&atom));
        atom
    }

    /// Look up an atom without creating it
    pub fn get(&self, value: &str) -> Option<Atom> {
        self.atoms.get(value).cloned()
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}
