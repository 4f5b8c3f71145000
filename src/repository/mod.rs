// src/repository/mod.rs

//! Repository indexes and solver plans
//!
//! This module provides functionality for:
//! - Loading a JSON repository index into a [`PackageDb`]
//! - Loading a precomputed solver plan (target world plus ordered changes)
//! - [`PlanSolver`], a [`Solver`] that replays such a plan

use crate::changeset::{Change, Changeset};
use crate::commit::{Solution, Solver};
use crate::error::{Error, Result};
use crate::graph::repository::{CACHE_REPOSITORY, DEFAULT_TAG};
use crate::graph::{Dependency, InstalledPackage, PackageDb, PackageTemplate, TagId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Name under which an index refers to the local package cache
pub const CACHE_NAME: &str = "cache";

/// A repository declared by an index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryMetadata {
    pub url: String,
    /// Pinning tag, with or without the leading `@`
    #[serde(default)]
    pub tag: Option<String>,
}

/// Installed state of a package, as recorded in an index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstalledMetadata {
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub broken_files: bool,
    #[serde(default)]
    pub broken_script: bool,
    /// Directory globs the package's trigger watches
    #[serde(default)]
    pub triggers: Vec<String>,
}

/// Package metadata in repository index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub installed_size: u64,
    #[serde(default)]
    pub size: u64,
    /// URLs of the repositories offering this build; `cache` for the local cache
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub layer: u8,
    #[serde(default)]
    pub provider_priority: u16,
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub install_if: Vec<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub installed: Option<InstalledMetadata>,
}

/// Repository index format (simple JSON document)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryIndex {
    /// Installable architectures; the host architecture when empty
    #[serde(default)]
    pub arches: Vec<String>,
    #[serde(default)]
    pub no_network: bool,
    #[serde(default)]
    pub repositories: Vec<RepositoryMetadata>,
    #[serde(default)]
    pub packages: Vec<PackageMetadata>,
}

impl RepositoryIndex {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading repository index {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Register repositories and packages with `db`
    pub fn load_into(&self, db: &mut PackageDb) -> Result<()> {
        if !self.arches.is_empty() {
            let arches: Vec<&str> = self.arches.iter().map(String::as_str).collect();
            db.set_arches(&arches);
        }
        db.no_network |= self.no_network;

        for repo in &self.repositories {
            db.add_repository(&repo.url, repo.tag.as_deref())?;
        }

        for meta in &self.packages {
            let tmpl = self.template(db, meta)?;
            db.add_package(tmpl)?;
        }
        info!(
            "Loaded {} packages from {} repositories",
            self.packages.len(),
            self.repositories.len()
        );
        Ok(())
    }

    fn template(&self, db: &mut PackageDb, meta: &PackageMetadata) -> Result<PackageTemplate> {
        let mut tmpl = PackageTemplate::new(&meta.name, &meta.version)
            .sizes(meta.installed_size, meta.size)
            .depends(&as_strs(&meta.depends))
            .provides(&as_strs(&meta.provides))
            .install_if(&as_strs(&meta.install_if))
            .files(&as_strs(&meta.files))
            .provider_priority(meta.provider_priority);
        if let Some(arch) = &meta.architecture {
            tmpl = tmpl.arch(arch);
        }
        tmpl.layer = meta.layer;
        tmpl.cached_file = meta.cached;

        for url in &meta.repositories {
            let slot = if url == CACHE_NAME {
                CACHE_REPOSITORY
            } else {
                db.repos
                    .iter()
                    .skip(1)
                    .position(|r| r.url == *url)
                    .map(|slot| slot + 1)
                    .ok_or_else(|| {
                        Error::InitError(format!(
                            "{}-{}: unknown repository {}",
                            meta.name, meta.version, url
                        ))
                    })?
            };
            tmpl = tmpl.repo(slot);
        }

        if let Some(installed) = &meta.installed {
            let tag = tag_id(db, installed.tag.as_deref())?;
            tmpl.installed = Some(InstalledPackage {
                broken_files: installed.broken_files,
                broken_script: installed.broken_script,
                triggers: installed.triggers.clone(),
                ..InstalledPackage::new(tag)
            });
        }
        Ok(tmpl)
    }
}

fn as_strs(items: &[String]) -> Vec<&str> {
    items.iter().map(String::as_str).collect()
}

fn tag_id(db: &mut PackageDb, tag: Option<&str>) -> Result<TagId> {
    match tag {
        Some(tag) => db
            .get_tag_id(tag)
            .ok_or_else(|| Error::InitError(format!("too many repository tags: {}", tag))),
        None => Ok(DEFAULT_TAG),
    }
}

/// One planned per-name transition
///
/// The installed package of `name`, if any, is the old side. `version`
/// selects the new side; without it the name is removed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedChange {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub reinstall: bool,
    /// Target pinning tag; defaults to the tag the old package was pinned to
    #[serde(default)]
    pub tag: Option<String>,
}

/// A solver decision computed ahead of time
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SolverPlan {
    /// Target world as dependency expressions
    #[serde(default)]
    pub world: Vec<String>,
    #[serde(default)]
    pub changes: Vec<PlannedChange>,
    /// False when the plan records a failed solve; `changes` is then the
    /// partial selection
    #[serde(default = "default_true")]
    pub satisfiable: bool,
}

fn default_true() -> bool {
    true
}

impl SolverPlan {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Reading solver plan {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn world(&self, db: &mut PackageDb) -> Result<Vec<Dependency>> {
        self.world.iter().map(|spec| db.parse_dependency(spec)).collect()
    }

    /// Resolve the planned changes against the packages in `db`
    pub fn changeset(&self, db: &mut PackageDb) -> Result<Changeset> {
        let mut changeset = Changeset::new();
        for planned in &self.changes {
            let change = resolve_change(db, planned)?;
            changeset.push(db, change)?;
        }
        Ok(changeset)
    }
}

fn resolve_change(db: &mut PackageDb, planned: &PlannedChange) -> Result<Change> {
    let old = db
        .lookup_name(&planned.name)
        .and_then(|name| db.installed_package(name));
    let new = match &planned.version {
        Some(version) => Some(db.find_package(&planned.name, version).ok_or_else(|| {
            Error::UnknownPackage(format!("{}-{}", planned.name, version))
        })?),
        None => None,
    };
    if old.is_none() && new.is_none() {
        return Err(Error::InvalidChangeset(format!(
            "{} is neither installed nor selected",
            planned.name
        )));
    }

    let old_tag = old
        .and_then(|pkg| db.package(pkg).ipkg.as_ref())
        .map_or(DEFAULT_TAG, |ipkg| ipkg.repository_tag);
    let new_tag = match &planned.tag {
        Some(tag) => tag_id(db, Some(tag))?,
        None => old_tag,
    };

    Ok(Change {
        old_pkg: old,
        new_pkg: new,
        old_repository_tag: old_tag,
        new_repository_tag: new_tag,
        reinstall: planned.reinstall,
    })
}

/// Solver that replays a [`SolverPlan`] instead of searching
#[derive(Debug, Clone)]
pub struct PlanSolver {
    plan: SolverPlan,
}

impl PlanSolver {
    pub fn new(plan: SolverPlan) -> Self {
        Self { plan }
    }
}

impl Solver for PlanSolver {
    fn solve(&mut self, db: &mut PackageDb, world: &[Dependency]) -> Result<Solution> {
        debug!("Replaying plan with {} changes for {} world entries", self.plan.changes.len(), world.len());
        let changeset = self.plan.changeset(db)?;
        if self.plan.satisfiable {
            Ok(Solution::Complete(changeset))
        } else {
            Ok(Solution::Unsatisfiable(changeset))
        }
    }
}
