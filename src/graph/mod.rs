// src/graph/mod.rs

//! Package graph model
//!
//! The [`PackageDb`] owns every name, package and path record for the
//! lifetime of the database. Records are addressed through stable arena
//! handles ([`NameId`], [`PackageId`]); nothing is freed individually.
//!
//! Cross-links are established when a package is added:
//! - each name lists its providers (the package itself plus its provides)
//! - `rdepends` on every depended-on name points back at the package's name
//! - `rinstall_if` on every install-if name points back at the package's name

pub mod dependency;
pub mod name;
pub mod package;
pub mod paths;
pub mod repository;

pub use dependency::{DepMatch, Dependency};
pub use name::{Generation, Name, NodeState, Provider, StateSet};
pub use package::{InstalledPackage, Package, PackageTemplate};
pub use repository::{Repository, RepositoryTag, TagId};

use crate::arena::{Arena, Id};
use crate::atom::{Atom, AtomPool};
use crate::error::{Error, Result};
use crate::version;
use name::NameTable;
use package::DIGEST_LEN;
use paths::PathTable;
use repository::{
    CACHE_REPOSITORY, DEFAULT_TAG, LAYER_ROOT, MAX_REPOSITORIES, MAX_TAGS, bit,
};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

pub type NameId = Id<Name>;
pub type PackageId = Id<Package>;

/// Aggregate numbers describing the installed set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstalledStats {
    pub bytes: u64,
    pub packages: u32,
    pub dirs: u32,
    pub files: u32,
}

/// In-memory package database
pub struct PackageDb {
    pub(crate) atoms: AtomPool,
    names: NameTable,
    packages: Arena<Package>,
    digests: HashMap<[u8; DIGEST_LEN], PackageId>,
    pub paths: PathTable,
    /// Configured repositories; slot 0 is the local archive cache
    pub repos: Vec<Repository>,
    /// Pinning tags; slot 0 is the default tag
    pub repo_tags: Vec<RepositoryTag>,
    /// Repositories usable in this run
    pub available_repos: u32,
    /// Repositories that need no download
    pub local_repos: u32,
    pub active_layers: u32,
    arches: Vec<Atom>,
    noarch: Atom,
    /// Repositories other than local ones are not reachable
    pub no_network: bool,
    /// The persisted target world
    pub world: Vec<Dependency>,
    pub installed: InstalledStats,
    /// Directory permission/ownership updates that failed while applying changes
    pub num_dir_update_errors: u32,
    generation: Generation,
}

impl Default for PackageDb {
    fn default() -> Self {
        Self::new()
    }
}

impl PackageDb {
    pub fn new() -> Self {
        let mut atoms = AtomPool::new();
        let noarch = atoms.intern("noarch");
        let host = atoms.intern(std::env::consts::ARCH);
        Self {
            atoms,
            names: NameTable::new(),
            packages: Arena::new(),
            digests: HashMap::new(),
            paths: PathTable::new(),
            repos: vec![Repository {
                url: "cache".to_string(),
                tag: DEFAULT_TAG,
            }],
            repo_tags: vec![RepositoryTag::default_tag()],
            available_repos: bit(CACHE_REPOSITORY),
            local_repos: bit(CACHE_REPOSITORY),
            active_layers: bit(LAYER_ROOT as usize),
            arches: vec![host],
            noarch,
            no_network: false,
            world: Vec::new(),
            installed: InstalledStats::default(),
            num_dir_update_errors: 0,
            generation: Generation::default(),
        }
    }

    // Names

    /// Find a name without allocating
    pub fn lookup_name(&self, name: &str) -> Option<NameId> {
        self.names.lookup(name)
    }

    /// Find a name, creating it on first use
    pub fn lookup_or_create_name(&mut self, name: &str) -> NameId {
        self.names.lookup_or_create(name)
    }

    pub fn name(&self, id: NameId) -> &Name {
        self.names.get(id)
    }

    pub(crate) fn name_mut(&mut self, id: NameId) -> &mut Name {
        self.names.get_mut(id)
    }

    pub fn names(&self) -> impl Iterator<Item = (NameId, &Name)> {
        self.names.iter()
    }

    // Packages

    pub fn package(&self, id: PackageId) -> &Package {
        &self.packages[id]
    }

    pub fn package_mut(&mut self, id: PackageId) -> &mut Package {
        &mut self.packages[id]
    }

    pub fn packages(&self) -> impl Iterator<Item = (PackageId, &Package)> {
        self.packages.iter()
    }

    pub fn num_packages(&self) -> usize {
        self.packages.len()
    }

    /// Name of a package as a string
    pub fn pkg_name(&self, id: PackageId) -> &str {
        &self.names.get(self.packages[id].name).name
    }

    /// `name-version`, as used in reports
    pub fn pkg_display(&self, id: PackageId) -> String {
        format!("{}-{}", self.pkg_name(id), self.packages[id].version)
    }

    /// Display order: name first, then ascending version
    pub fn cmp_pkg_display(&self, a: PackageId, b: PackageId) -> Ordering {
        name::cmp_display(self.pkg_name(a), self.pkg_name(b))
            .then_with(|| self.pkg_version_compare(a, b))
    }

    pub fn pkg_version_compare(&self, a: PackageId, b: PackageId) -> Ordering {
        let (a, b) = (&self.packages[a].version, &self.packages[b].version);
        if std::rc::Rc::ptr_eq(a, b) {
            return Ordering::Equal;
        }
        version::compare(a, b)
    }

    /// Can the package be fetched from some usable repository?
    pub fn pkg_available(&self, id: PackageId) -> bool {
        self.packages[id].repos & self.available_repos != 0
    }

    /// Package of exactly this name and version
    pub fn find_package(&self, name: &str, version: &str) -> Option<PackageId> {
        let name = self.names.lookup(name)?;
        self.names
            .get(name)
            .providers
            .iter()
            .map(|p| p.pkg)
            .find(|p| self.packages[*p].name == name && &*self.packages[*p].version == version)
    }

    /// Installed package owning `name`, if any
    pub fn installed_package(&self, name: NameId) -> Option<PackageId> {
        self.names
            .get(name)
            .providers
            .iter()
            .map(|p| p.pkg)
            .find(|p| self.packages[*p].name == name && self.packages[*p].is_installed())
    }

    pub fn installed_packages(&self) -> Vec<PackageId> {
        self.packages
            .iter()
            .filter(|(_, pkg)| pkg.is_installed())
            .map(|(id, _)| id)
            .collect()
    }

    /// Add a package built from `tmpl`
    ///
    /// Packages are identified by a digest of their defining fields. Adding
    /// the same build again only merges its repository mask and, if the
    /// existing record is not installed yet, its installed state.
    pub fn add_package(&mut self, tmpl: PackageTemplate) -> Result<PackageId> {
        if tmpl.name.is_empty() || tmpl.version.is_empty() {
            return Err(Error::InvalidDependency(format!(
                "package without name or version: '{}-{}'",
                tmpl.name, tmpl.version
            )));
        }
        if !version::validate(&tmpl.version) {
            return Err(Error::InvalidVersion(format!("{}-{}", tmpl.name, tmpl.version)));
        }
        let digest = package_digest(&tmpl);

        if let Some(&existing) = self.digests.get(&digest) {
            self.packages[existing].repos |= tmpl.repos;
            if let Some(ipkg) = tmpl.installed {
                if !self.packages[existing].is_installed() {
                    self.attach_installed(existing, ipkg);
                }
            }
            return Ok(existing);
        }

        let name = self.lookup_or_create_name(&tmpl.name);
        let depends = self.parse_all(&tmpl.depends);
        let provides = self.parse_all(&tmpl.provides);
        let install_if = self.parse_all(&tmpl.install_if);
        let version = self.atoms.intern(&tmpl.version);
        let arch = self.atoms.intern(&tmpl.arch);

        let broken = depends
            .iter()
            .chain(&provides)
            .chain(&install_if)
            .any(|d| d.broken);
        let uninstallable = broken || !version::validate(&version) || !self.arch_compatible(&arch);

        let id = self.packages.alloc(Package {
            name,
            version: version.clone(),
            arch,
            installed_size: tmpl.installed_size,
            size: tmpl.size,
            repos: tmpl.repos,
            layer: tmpl.layer,
            provider_priority: tmpl.provider_priority,
            cached_file: tmpl.cached_file,
            uninstallable,
            depends,
            provides,
            install_if,
            files: tmpl.files,
            digest,
            ipkg: None,
            mark: Generation::default(),
            visit: Generation::default(),
            scratch: Default::default(),
        });
        self.digests.insert(digest, id);
        self.link_package(id, version);

        if let Some(ipkg) = tmpl.installed {
            self.attach_installed(id, ipkg);
        }
        debug!("Added package {}", self.pkg_display(id));
        Ok(id)
    }

    /// Parse a package's dependency list; malformed entries become broken
    /// dependencies so the package is kept but marked uninstallable
    fn parse_all(&mut self, specs: &[String]) -> Vec<Dependency> {
        let mut deps = Vec::with_capacity(specs.len());
        for spec in specs {
            match self.parse_dependency(spec) {
                Ok(dep) => deps.push(dep),
                Err(e) => {
                    warn!("Malformed dependency {:?}: {}", spec, e);
                    deps.push(self.broken_dependency(spec));
                }
            }
        }
        deps
    }

    fn broken_dependency(&mut self, spec: &str) -> Dependency {
        let body = spec.strip_prefix('!').unwrap_or(spec);
        let end = body.find(['@', '<', '>', '=', '~']).unwrap_or(body.len());
        let name = if end == 0 { spec } else { &body[..end] };
        Dependency {
            broken: true,
            ..Dependency::any(self.lookup_or_create_name(name))
        }
    }

    /// Register providers and reverse links for a freshly allocated package
    fn link_package(&mut self, id: PackageId, version: Atom) {
        let pkg = &self.packages[id];
        let name = pkg.name;
        let provides: Vec<_> = pkg
            .provides
            .iter()
            .map(|d| (d.name, d.version.clone()))
            .collect();
        let depends: Vec<_> = pkg.depends.iter().map(|d| (d.name, d.is_conflict())).collect();
        let install_if: Vec<_> = pkg.install_if.iter().map(|d| d.name).collect();

        self.names.get_mut(name).providers.push(Provider {
            pkg: id,
            version: Some(version),
        });
        for (pname, pversion) in provides {
            self.names.get_mut(pname).providers.push(Provider {
                pkg: id,
                version: pversion,
            });
        }
        for (dname, conflict) in depends {
            let target = self.names.get_mut(dname);
            target.is_dependency |= !conflict;
            if !target.rdepends.contains(&name) {
                target.rdepends.push(name);
            }
        }
        for iname in install_if {
            let target = self.names.get_mut(iname);
            if !target.rinstall_if.contains(&name) {
                target.rinstall_if.push(name);
            }
        }
    }

    // Installed state

    /// Mark `pkg` installed under `tag`, taking ownership of its files
    pub fn install_package(&mut self, pkg: PackageId, tag: TagId) -> &mut InstalledPackage {
        if !self.packages[pkg].is_installed() {
            self.attach_installed(pkg, InstalledPackage::new(tag));
        }
        let ipkg = self.packages[pkg].ipkg.get_or_insert_with(|| InstalledPackage::new(tag));
        ipkg.repository_tag = tag;
        ipkg
    }

    fn attach_installed(&mut self, pkg: PackageId, mut ipkg: InstalledPackage) {
        let paths: Vec<String> = self.packages[pkg].files.clone();
        let mut dirs = BTreeSet::new();
        for path in &paths {
            let file = self.paths.get_file(path);
            let record = self.paths.file_mut(file);
            match record.owner.replace(pkg) {
                Some(prev) if prev != pkg => {
                    debug!("{} takes over {}", self.pkg_display(pkg), path);
                    if let Some(prev_ipkg) = self.packages[prev].ipkg.as_mut() {
                        prev_ipkg.files.retain(|f| *f != file);
                    }
                }
                Some(_) => {}
                None => self.installed.files += 1,
            }
            dirs.insert(self.paths.file(file).dir);
            if !ipkg.files.contains(&file) {
                ipkg.files.push(file);
            }
        }
        for dir in dirs {
            let dir = self.paths.dir_mut(dir);
            dir.refs += 1;
            if dir.refs == 1 {
                self.installed.dirs += 1;
            }
        }

        let package = &mut self.packages[pkg];
        self.installed.bytes += package.installed_size;
        self.installed.packages += 1;
        package.ipkg = Some(ipkg);
    }

    /// Drop the installed state of `pkg`, releasing the files it owns
    pub fn uninstall_package(&mut self, pkg: PackageId) -> Option<InstalledPackage> {
        let ipkg = self.packages[pkg].ipkg.take()?;
        let mut dirs = BTreeSet::new();
        for &file in &ipkg.files {
            let record = self.paths.file_mut(file);
            if record.owner == Some(pkg) {
                record.owner = None;
                self.installed.files = self.installed.files.saturating_sub(1);
            }
            dirs.insert(record.dir);
        }
        for dir in dirs {
            let dir = self.paths.dir_mut(dir);
            dir.refs = dir.refs.saturating_sub(1);
            if dir.refs == 0 {
                self.installed.dirs = self.installed.dirs.saturating_sub(1);
            }
        }
        let size = self.packages[pkg].installed_size;
        self.installed.bytes = self.installed.bytes.saturating_sub(size);
        self.installed.packages = self.installed.packages.saturating_sub(1);
        Some(ipkg)
    }

    // Repositories, tags and architectures

    /// Look up a pinning tag, creating it on first use
    ///
    /// Accepts `@tag` or `tag`. Returns `None` when the tag table is full.
    pub fn get_tag_id(&mut self, tag: &str) -> Option<TagId> {
        if tag.is_empty() {
            return Some(DEFAULT_TAG);
        }
        if let Some(pos) = self.repo_tags.iter().skip(1).position(|t| t.matches(tag)) {
            return Some(pos + 1);
        }
        if self.repo_tags.len() >= MAX_TAGS {
            return None;
        }
        self.repo_tags.push(RepositoryTag::named(tag));
        Some(self.repo_tags.len() - 1)
    }

    /// Register a repository, optionally under a pinning tag
    ///
    /// Returns the repository slot. Adding a known URL again only widens the
    /// tag's allowed repositories.
    pub fn add_repository(&mut self, url: &str, tag: Option<&str>) -> Result<usize> {
        let tag_id = match tag {
            Some(tag) => self
                .get_tag_id(tag)
                .ok_or_else(|| Error::InitError(format!("too many repository tags: {}", tag)))?,
            None => DEFAULT_TAG,
        };

        if let Some(slot) = self.repos.iter().skip(1).position(|r| r.url == url) {
            let slot = slot + 1;
            self.repo_tags[tag_id].allowed_repos |= bit(slot) & self.available_repos;
            return Ok(slot);
        }
        if self.repos.len() >= MAX_REPOSITORIES {
            return Err(Error::InitError(format!("too many repositories: {}", url)));
        }

        let slot = self.repos.len();
        let repo = Repository {
            url: url.to_string(),
            tag: tag_id,
        };
        if repo.is_local() {
            self.local_repos |= bit(slot);
            self.available_repos |= bit(slot);
        } else if !self.no_network {
            self.available_repos |= bit(slot);
        } else {
            warn!("Repository {} is not reachable without network", url);
        }
        self.repos.push(repo);
        self.repo_tags[tag_id].allowed_repos |= bit(slot);
        debug!("Added repository {} as slot {}", url, slot);
        Ok(slot)
    }

    /// Repositories allowed by any tag in `pinning_mask`
    pub fn pinning_mask_repos(&self, pinning_mask: u32) -> u32 {
        self.repo_tags
            .iter()
            .enumerate()
            .filter(|(i, _)| pinning_mask & bit(*i) != 0)
            .fold(0, |mask, (_, tag)| mask | tag.allowed_repos)
    }

    /// Add an architecture this system can install
    pub fn add_arch(&mut self, arch: &str) {
        let atom = self.atoms.intern(arch.trim());
        if !self.arches.iter().any(|a| std::rc::Rc::ptr_eq(a, &atom)) {
            self.arches.push(atom);
        }
    }

    /// Replace the list of installable architectures
    pub fn set_arches(&mut self, arches: &[&str]) {
        self.arches.clear();
        for arch in arches {
            self.add_arch(arch);
        }
    }

    pub fn arch_compatible(&self, arch: &str) -> bool {
        &*self.noarch == arch || self.arches.iter().any(|a| &**a == arch)
    }

    // Traversal bookkeeping

    /// Start a new traversal; every scratch field becomes stale
    pub fn next_generation(&mut self) -> Generation {
        self.generation = self.generation.next();
        self.generation
    }

    pub(crate) fn mark_package(&mut self, pkg: PackageId, generation: Generation) {
        self.packages[pkg].mark = generation;
    }
}

/// Identity digest over the fields that define a build
fn package_digest(tmpl: &PackageTemplate) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    let mut field = |label: &str, value: &str| {
        hasher.update(label.as_bytes());
        hasher.update(b":");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    };
    field("P", &tmpl.name);
    field("V", &tmpl.version);
    field("A", &tmpl.arch);
    field("I", &tmpl.installed_size.to_string());
    field("S", &tmpl.size.to_string());
    field("D", &tmpl.depends.join(" "));
    field("p", &tmpl.provides.join(" "));
    field("i", &tmpl.install_if.join(" "));
    field("k", &tmpl.provider_priority.to_string());
    field("F", &tmpl.files.join(" "));
    hasher.finalize().into()
}
