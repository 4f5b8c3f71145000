// src/db/models.rs

//! Data models for persisted configuration
//!
//! This module defines Rust structs that correspond to database tables
//! and provides methods for creating, reading and replacing records.

use crate::error::Result;
use rusqlite::{Connection, Row, params};

/// One dependency expression of the persisted world
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldEntry {
    pub position: i64,
    pub spec: String,
}

impl WorldEntry {
    /// Replace the whole world with `specs`, keeping their order
    pub fn replace_all(conn: &Connection, specs: &[String]) -> Result<()> {
        conn.execute("DELETE FROM world", [])?;
        let mut stmt = conn.prepare("INSERT INTO world (position, spec) VALUES (?1, ?2)")?;
        for (position, spec) in specs.iter().enumerate() {
            stmt.execute(params![position as i64, spec])?;
        }
        Ok(())
    }

    /// List the world in order
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare("SELECT position, spec FROM world ORDER BY position")?;

        let entries = stmt
            .query_map([], |row| {
                Ok(Self {
                    position: row.get(0)?,
                    spec: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}

/// An installed package as persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledRecord {
    pub id: Option<i64>,
    pub name: String,
    pub version: String,
    pub architecture: String,
    pub checksum: String,
    /// Pinning tag (`@name`), absent for the default tag
    pub repository_tag: Option<String>,
    pub broken_files: bool,
    pub broken_script: bool,
    pub triggers: Vec<String>,
}

impl InstalledRecord {
    pub fn new(name: String, version: String, architecture: String, checksum: String) -> Self {
        Self {
            id: None,
            name,
            version,
            architecture,
            checksum,
            repository_tag: None,
            broken_files: false,
            broken_script: false,
            triggers: Vec::new(),
        }
    }

    /// Insert this record into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        let triggers = serde_json::to_string(&self.triggers)?;
        conn.execute(
            "INSERT INTO installed (name, version, architecture, checksum, repository_tag,
                                    broken_files, broken_script, triggers)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                &self.name,
                &self.version,
                &self.architecture,
                &self.checksum,
                &self.repository_tag,
                self.broken_files,
                self.broken_script,
                triggers,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// List all installed records
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, version, architecture, checksum, repository_tag,
                    broken_files, broken_script, triggers
             FROM installed ORDER BY name",
        )?;

        let records = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    pub fn delete_all(conn: &Connection) -> Result<()> {
        conn.execute("DELETE FROM installed", [])?;
        Ok(())
    }

    /// Convert a database row to an InstalledRecord
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let triggers_json: String = row.get(8)?;
        let triggers = serde_json::from_str(&triggers_json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Self {
            id: Some(row.get(0)?),
            name: row.get(1)?,
            version: row.get(2)?,
            architecture: row.get(3)?,
            checksum: row.get(4)?,
            repository_tag: row.get(5)?,
            broken_files: row.get(6)?,
            broken_script: row.get(7)?,
            triggers,
        })
    }
}

/// One persisted commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub id: Option<i64>,
    /// RFC 3339 timestamp
    pub committed_at: String,
    /// World after the commit, space separated
    pub world: String,
    pub packages: i64,
    pub installed_bytes: i64,
}

impl CommitRecord {
    pub fn new(committed_at: String, world: String, packages: i64, installed_bytes: i64) -> Self {
        Self {
            id: None,
            committed_at,
            world,
            packages,
            installed_bytes,
        }
    }

    /// Insert this commit into the database
    pub fn insert(&mut self, conn: &Connection) -> Result<i64> {
        conn.execute(
            "INSERT INTO commits (committed_at, world, packages, installed_bytes)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                &self.committed_at,
                &self.world,
                self.packages,
                self.installed_bytes,
            ],
        )?;

        let id = conn.last_insert_rowid();
        self.id = Some(id);
        Ok(id)
    }

    /// List commits, newest first
    pub fn list_all(conn: &Connection) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT id, committed_at, world, packages, installed_bytes
             FROM commits ORDER BY id DESC",
        )?;

        let commits = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(commits)
    }

    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: Some(row.get(0)?),
            committed_at: row.get(1)?,
            world: row.get(2)?,
            packages: row.get(3)?,
            installed_bytes: row.get(4)?,
        })
    }
}
