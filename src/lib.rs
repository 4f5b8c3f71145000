// src/lib.rs

//! pkgcore
//!
//! Commit engine and unsatisfiable-world diagnostics for a binary package
//! manager.
//!
//! # Architecture
//!
//! - Package graph: names, packages and dependencies in arenas, addressed by
//!   typed ids, with generation-stamped scratch state for traversals
//! - Changesets: ordered per-name transitions produced by a solver
//! - Commit engine: applies a changeset through pluggable collaborators
//!   (installer, hooks, triggers, persistence, prompt)
//! - Diagnostics: explains why a world could not be solved
//! - Database-first: world, installed set and history in SQLite

pub mod arena;
pub mod atom;
pub mod changeset;
pub mod commit;
pub mod db;
pub mod diagnose;
mod error;
pub mod graph;
pub mod output;
pub mod repository;
pub mod version;

pub use changeset::{Change, ChangeKind, Changeset};
pub use commit::{CommitEngine, CommitOptions};
pub use diagnose::{Report, diagnose};
pub use error::{AbortReason, Error, Result};
pub use graph::{Dependency, PackageDb, PackageId, PackageTemplate};
pub use output::Output;
