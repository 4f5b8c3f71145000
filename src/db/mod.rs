// src/db/mod.rs

//! Database layer for pkgcore
//!
//! This module handles all SQLite operations including:
//! - Database initialization and schema migration
//! - Connection management
//! - Persisting the world and installed set after a commit
//! - Loading them back into a [`PackageDb`]

pub mod models;
pub mod schema;

use crate::commit::ConfigStore;
use crate::error::{Error, Result};
use crate::graph::repository::DEFAULT_TAG;
use crate::graph::{Dependency, InstalledPackage, PackageDb, PackageTemplate};
use models::{CommitRecord, InstalledRecord, WorldEntry};
use rusqlite::{Connection, Transaction};
use std::path::Path;
use tracing::{debug, info, warn};

/// Initialize a new pkgcore database at the specified path
///
/// Creates the database file and sets up the schema.
/// This is idempotent - calling it on an existing database is safe.
pub fn init(db_path: &str) -> Result<()> {
    debug!("Initializing database at: {}", db_path);

    // Create parent directories if they don't exist
    if let Some(parent) = Path::new(db_path).parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::InitError(format!("Failed to create database directory: {}", e)))?;
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;

    schema::migrate(&conn)?;

    info!("Database initialized successfully");
    Ok(())
}

/// Open an existing pkgcore database
pub fn open(db_path: &str) -> Result<Connection> {
    if !Path::new(db_path).exists() {
        return Err(Error::DatabaseNotFound(db_path.to_string()));
    }

    let conn = Connection::open(db_path)?;

    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
        ",
    )?;
    schema::migrate(&conn)?;

    Ok(conn)
}

/// Run `f` inside a transaction, committing only if it succeeds
pub fn transaction<T, F>(conn: &mut Connection, f: F) -> Result<T>
where
    F: FnOnce(&Transaction) -> Result<T>,
{
    let tx = conn.transaction()?;
    let value = f(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Load the persisted world, creating names and tags as needed
pub fn load_world(conn: &Connection, db: &mut PackageDb) -> Result<Vec<Dependency>> {
    let world = WorldEntry::list_all(conn)?
        .iter()
        .map(|entry| db.parse_dependency(&entry.spec))
        .collect::<Result<Vec<_>>>()?;
    db.world = world.clone();
    Ok(world)
}

/// Attach the persisted installed set to the packages in `db`
///
/// Installed packages no index offers are added as packages of their own.
pub fn load_installed(conn: &Connection, db: &mut PackageDb) -> Result<usize> {
    let records = InstalledRecord::list_all(conn)?;
    for record in &records {
        let tag = match &record.repository_tag {
            Some(tag) => db
                .get_tag_id(tag)
                .ok_or_else(|| Error::InitError(format!("too many repository tags: {}", tag)))?,
            None => DEFAULT_TAG,
        };

        let pkg = match db.find_package(&record.name, &record.version) {
            Some(pkg) => pkg,
            None => {
                debug!("{}-{} is installed but not indexed", record.name, record.version);
                let mut tmpl =
                    PackageTemplate::new(&record.name, &record.version).arch(&record.architecture);
                tmpl.installed = Some(InstalledPackage::new(tag));
                db.add_package(tmpl)?
            }
        };
        if db.package(pkg).checksum() != record.checksum {
            warn!(
                "{}-{}: installed checksum differs from the indexed build",
                record.name, record.version
            );
        }

        let ipkg = db.install_package(pkg, tag);
        ipkg.broken_files = record.broken_files;
        ipkg.broken_script = record.broken_script;
        ipkg.triggers = record.triggers.clone();
    }
    Ok(records.len())
}

/// Commit history, newest first
pub fn history(conn: &Connection) -> Result<Vec<CommitRecord>> {
    CommitRecord::list_all(conn)
}

/// [`ConfigStore`] writing world, installed set and a history row to SQLite
///
/// A simulating store accepts every write and stores nothing.
pub struct SqliteConfigStore {
    conn: Connection,
    simulate: bool,
}

impl SqliteConfigStore {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn,
            simulate: false,
        }
    }

    pub fn simulate(mut self, simulate: bool) -> Self {
        self.simulate = simulate;
        self
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl ConfigStore for SqliteConfigStore {
    fn write_config(&mut self, db: &PackageDb) -> Result<()> {
        if self.simulate {
            debug!("Simulating, configuration not written");
            return Ok(());
        }
        let specs: Vec<String> = db.world.iter().map(|d| db.dep_spec(d)).collect();
        let installed = db.installed_packages();

        transaction(&mut self.conn, |tx| {
            WorldEntry::replace_all(tx, &specs)?;

            InstalledRecord::delete_all(tx)?;
            for &pkg in &installed {
                let package = db.package(pkg);
                let Some(ipkg) = package.ipkg.as_ref() else {
                    continue;
                };
                let mut record = InstalledRecord::new(
                    db.pkg_name(pkg).to_string(),
                    package.version.to_string(),
                    package.arch.to_string(),
                    package.checksum(),
                );
                record.repository_tag = (ipkg.repository_tag != DEFAULT_TAG)
                    .then(|| db.repo_tags.get(ipkg.repository_tag).map(|t| t.tag.clone()))
                    .flatten();
                record.broken_files = ipkg.broken_files;
                record.broken_script = ipkg.broken_script;
                record.triggers = ipkg.triggers.clone();
                record.insert(tx)?;
            }

            CommitRecord::new(
                chrono::Utc::now().to_rfc3339(),
                specs.join(" "),
                installed.len() as i64,
                db.installed.bytes as i64,
            )
            .insert(tx)?;
            Ok(())
        })?;

        info!(
            "Wrote world ({} entries) and {} installed packages",
            specs.len(),
            installed.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_init_creates_database() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();

        // Remove the temp file so init can create it
        drop(temp_file);

        let result = init(&db_path);
        assert!(result.is_ok());
        assert!(Path::new(&db_path).exists());
    }

    #[test]
    fn test_open_existing_database() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();

        init(db_path).unwrap();

        let conn = open(db_path).unwrap();
        assert_eq!(schema::get_schema_version(&conn).unwrap(), schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_open_nonexistent_database() {
        let result = open("/nonexistent/path/db.sqlite");
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), Error::DatabaseNotFound(_)));
    }

    #[test]
    fn test_config_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap();
        init(db_path).unwrap();

        let mut db = PackageDb::new();
        db.add_repository("https://mirror.example.org/edge", Some("edge"))
            .unwrap();
        let pkg = db
            .add_package(PackageTemplate::new("curl", "8.9.0").sizes(2048, 1024).installed())
            .unwrap();
        let edge = db.get_tag_id("edge").unwrap();
        let ipkg = db.install_package(pkg, edge);
        ipkg.triggers = vec!["/usr/share/ca-certificates/*".to_string()];
        db.world = db.parse_dependencies("curl@edge busybox>=1.36").unwrap();

        let mut store = SqliteConfigStore::new(open(db_path).unwrap());
        store.write_config(&db).unwrap();
        store.write_config(&db).unwrap();
        assert_eq!(history(store.connection()).unwrap().len(), 2);

        let conn = open(db_path).unwrap();
        let mut fresh = PackageDb::new();
        let world = load_world(&conn, &mut fresh).unwrap();
        let specs: Vec<String> = world.iter().map(|d| fresh.dep_spec(d)).collect();
        assert_eq!(specs, vec!["curl@edge", "busybox>=1.36"]);

        assert_eq!(load_installed(&conn, &mut fresh).unwrap(), 1);
        let curl = fresh.find_package("curl", "8.9.0").unwrap();
        let edge = fresh.get_tag_id("edge").unwrap();
        let ipkg = fresh.package(curl).ipkg.as_ref().unwrap();
        assert_eq!(ipkg.repository_tag, edge);
        assert_eq!(ipkg.triggers, vec!["/usr/share/ca-certificates/*".to_string()]);
        assert_eq!(fresh.installed.packages, 1);
    }

    #[test]
    fn test_simulating_store_writes_nothing() {
        let conn = Connection::open_in_memory().unwrap();
        schema::migrate(&conn).unwrap();
        let mut db = PackageDb::new();
        db.world = db.parse_dependencies("busybox").unwrap();

        let mut store = SqliteConfigStore::new(conn).simulate(true);
        store.write_config(&db).unwrap();
        assert!(WorldEntry::list_all(store.connection()).unwrap().is_empty());
        assert!(history(store.connection()).unwrap().is_empty());
    }

    #[test]
    fn test_failed_transaction_rolls_back() {
        let mut conn = Connection::open_in_memory().unwrap();
        schema::migrate(&conn).unwrap();

        let result: Result<()> = transaction(&mut conn, |tx| {
            WorldEntry::replace_all(tx, &["busybox".to_string()])?;
            Err(Error::InitError("stop".to_string()))
        });
        assert!(result.is_err());
        assert!(WorldEntry::list_all(&conn).unwrap().is_empty());
    }
}
