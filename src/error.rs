// src/error.rs

use std::fmt;
use thiserror::Error;

/// Why a commit stopped before touching any package state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// A world dependency names a repository tag with no repositories behind it
    BrokenWorld(usize),
    /// The interactive prompt was declined
    Declined,
    /// A pre-commit hook failed
    PreCommitHook(String),
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::BrokenWorld(n) => {
                write!(f, "{} world dependencies reference missing repository tags", n)
            }
            AbortReason::Declined => write!(f, "declined by user"),
            AbortReason::PreCommitHook(hook) => write!(f, "pre-commit hook {} failed", hook),
        }
    }
}

/// Core error types for pkgcore
#[derive(Error, Debug)]
pub enum Error {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON index or plan errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Database initialization error
    #[error("Failed to initialize database: {0}")]
    InitError(String),

    /// Database not found
    #[error("Database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Malformed dependency expression
    #[error("Invalid dependency: {0}")]
    InvalidDependency(String),

    /// Malformed version string
    #[error("Invalid version: {0}")]
    InvalidVersion(String),

    /// A change or changeset violates its invariants
    #[error("Invalid changeset: {0}")]
    InvalidChangeset(String),

    /// Lookup of a package that is not in the graph
    #[error("Unknown package: {0}")]
    UnknownPackage(String),

    /// Commit stopped before mutation
    #[error("Commit aborted: {0}")]
    CommitAborted(AbortReason),

    /// Installer collaborator reported a failure
    #[error("Install failed: {0}")]
    InstallFailed(String),

    /// Hook or trigger script failure
    #[error("Script failed: {0}")]
    ScriptFailed(String),
}

/// Result type alias using pkgcore's Error type
pub type Result<T> = std::result::Result<T, Error>;
