// src/arena.rs

//! Append-only arena for long-lived graph records
//!
//! Records are never freed individually. Handles are plain indices, so they stay
//! valid until the arena itself is dropped. The arena is not synchronized and
//! belongs to exactly one database.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Number of records per page
const PAGE_SIZE: usize = 256;

/// Opaque handle to a record stored in an [`Arena<T>`]
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    fn new(index: usize) -> Self {
        Self {
            index: index as u32,
            _marker: PhantomData,
        }
    }

    /// Position of the record in allocation order
    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Id<T> {}

impl<T> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index.cmp(&other.index)
    }
}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Page-chained bump allocator
///
/// Pages are allocated with a fixed capacity and never reallocated, so growing
/// the arena never moves existing records.
pub struct Arena<T> {
    pages: Vec<Vec<T>>,
    len: usize,
}

impl<T> Arena<T> {
    /// Create an empty arena
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            len: 0,
        }
    }

    /// Store a record and return its handle
    pub fn alloc(&mut self, value: T) -> Id<T> {
        if self.pages.last().is_none_or(|page| page.len() == PAGE_SIZE) {
            self.pages.push(Vec::with_capacity(PAGE_SIZE));
        }
        if let Some(page) = self.pages.last_mut() {
            page.push(value);
        }
        let id = Id::new(self.len);
        self.len += 1;
        id
    }

    /// Borrow a record
    ///
    /// Panics if the handle came from another arena.
    pub fn get(&self, id: Id<T>) -> &T {
        &self.pages[id.index() / PAGE_SIZE][id.index() % PAGE_SIZE]
    }

    /// Mutably borrow a record
    pub fn get_mut(&mut self, id: Id<T>) -> &mut T {
        &mut self.pages[id.index() / PAGE_SIZE][id.index() % PAGE_SIZE]
    }

    /// Number of records allocated so far
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterate over handles and records in allocation order
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.pages
            .iter()
            .flatten()
            .enumerate()
            .map(|(i, value)| (Id::new(i), value))
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::ops::Index<Id<T>> for Arena<T> {
    type Output = T;

    fn index(&self, id: Id<T>) -> &T {
        self.get(id)
    }
}

impl<T> std::ops::IndexMut<Id<T>> for Arena<T> {
    fn index_mut(&mut self, id: Id<T>) -> &mut T {
        self.get_mut(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alloc_returns_stable_handles() {
        let mut arena = Arena::new();
        let a = arena.alloc("a".to_string());
        let b = arena.alloc("b".to_string());

        assert_ne!(a, b);
        assert_eq!(arena[a], "a");
        assert_eq!(arena[b], "b");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_alloc_across_pages() {
        let mut arena = Arena::new();
        let ids: Vec<_> = (0..PAGE_SIZE * 2 + 3).map(|i| arena.alloc(i)).collect();

        for (i, id) in ids.iter().enumerate() {
            assert_eq!(arena[*id], i);
        }
        assert_eq!(arena.iter().count(), PAGE_SIZE * 2 + 3);
        assert_eq!(arena.iter().last().map(|(id, _)| id), ids.last().copied());
    }

    #[test]
    fn test_get_mut() {
        let mut arena = Arena::new();
        assert!(arena.is_empty());
        let id = arena.alloc(1u32);
        arena[id] += 41;
        assert_eq!(arena[id], 42);
        assert!(!arena.is_empty());
    }
}
