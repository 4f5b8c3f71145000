// src/db/schema.rs

//! Database schema definitions and migrations
//!
//! This module defines the SQLite schema for the persisted configuration and
//! provides a migration system to evolve the schema over time.

use crate::error::{Error, Result};
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the schema version tracking table
fn init_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;
    Ok(())
}

/// Get the current schema version from the database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    init_schema_version(conn)?;

    let version = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Apply all pending migrations to bring the database up to date
pub fn migrate(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;
    debug!("Current schema version: {}", current_version);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema is up to date");
        return Ok(());
    }

    for version in (current_version + 1)..=SCHEMA_VERSION {
        info!("Applying migration to version {}", version);
        apply_migration(conn, version)?;
        set_schema_version(conn, version)?;
    }

    info!(
        "Schema migration complete. Now at version {}",
        SCHEMA_VERSION
    );
    Ok(())
}

/// Apply a specific migration version
fn apply_migration(conn: &Connection, version: i32) -> Result<()> {
    match version {
        1 => migrate_v1(conn),
        2 => migrate_v2(conn),
        _ => Err(Error::InitError(format!(
            "Unknown migration version: {}",
            version
        ))),
    }
}

/// Initial schema - Version 1
///
/// - world: the persisted target world, one dependency expression per row
/// - installed: installed packages with their pinning tag and flags
fn migrate_v1(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 1");

    conn.execute_batch(
        "
        -- World: ordered dependency expressions
        CREATE TABLE world (
            position INTEGER PRIMARY KEY,
            spec TEXT NOT NULL
        );

        -- Installed packages
        CREATE TABLE installed (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            version TEXT NOT NULL,
            architecture TEXT NOT NULL,
            checksum TEXT NOT NULL,
            repository_tag TEXT,
            broken_files INTEGER NOT NULL DEFAULT 0,
            broken_script INTEGER NOT NULL DEFAULT 0,
            triggers TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX idx_installed_name ON installed(name);
        ",
    )?;

    info!("Schema version 1 applied successfully");
    Ok(())
}

/// Version 2 - commit history
fn migrate_v2(conn: &Connection) -> Result<()> {
    debug!("Creating schema version 2");

    conn.execute_batch(
        "
        -- Commits: one row per persisted commit
        CREATE TABLE commits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            committed_at TEXT NOT NULL,
            world TEXT NOT NULL,
            packages INTEGER NOT NULL,
            installed_bytes INTEGER NOT NULL
        );

        CREATE INDEX idx_commits_committed_at ON commits(committed_at);
        ",
    )?;

    info!("Schema version 2 applied successfully");
    Ok(())
}
