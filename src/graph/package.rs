// src/graph/package.rs

//! Concrete packages and their installed state

use super::dependency::Dependency;
use super::name::{Generation, Scratch, StateSet};
use super::paths::FileId;
use super::repository::{DEFAULT_TAG, LAYER_ROOT, TagId};
use super::NameId;
use crate::atom::Atom;

/// Length of the identity digest (SHA-256)
pub const DIGEST_LEN: usize = 32;

/// Number of digest bytes used for checksum pins (`name><checksum`)
const CHECKSUM_LEN: usize = 20;

/// State of a package that is currently installed
#[derive(Debug, Clone, Default)]
pub struct InstalledPackage {
    /// Pinning tag the package was installed under
    pub repository_tag: TagId,
    /// Some files failed to extract or were modified on disk
    pub broken_files: bool,
    /// The last install script run failed
    pub broken_script: bool,
    /// Directory globs this package's trigger watches
    pub triggers: Vec<String>,
    /// Paths that fired the trigger and have not been processed yet
    pub pending_triggers: Vec<String>,
    /// Files owned by this package
    pub files: Vec<FileId>,
}

impl InstalledPackage {
    pub fn new(repository_tag: TagId) -> Self {
        Self {
            repository_tag,
            ..Self::default()
        }
    }
}

/// A concrete installable package build
///
/// Name and version never change after construction. Everything marked
/// `pub(crate)` below is scratch data owned by graph traversals.
#[derive(Debug)]
pub struct Package {
    pub name: NameId,
    pub version: Atom,
    pub arch: Atom,
    pub installed_size: u64,
    pub size: u64,
    /// Bit mask of repositories offering this build
    pub repos: u32,
    pub layer: u8,
    pub provider_priority: u16,
    /// The archive is present in the local cache
    pub cached_file: bool,
    /// Broken metadata or incompatible architecture
    pub uninstallable: bool,
    pub depends: Vec<Dependency>,
    pub provides: Vec<Dependency>,
    pub install_if: Vec<Dependency>,
    /// Paths shipped by the package
    pub files: Vec<String>,
    pub digest: [u8; DIGEST_LEN],
    pub ipkg: Option<InstalledPackage>,
    pub(crate) mark: Generation,
    pub(crate) visit: Generation,
    pub(crate) scratch: Scratch,
}

impl Package {
    /// Is the package marked as selected in traversal `generation`?
    pub fn is_marked(&self, generation: Generation) -> bool {
        self.mark == generation
    }

    /// Traversal states of this package during `generation`
    pub fn states(&self, generation: Generation) -> StateSet {
        self.scratch.states(generation)
    }

    pub fn is_installed(&self) -> bool {
        self.ipkg.is_some()
    }

    /// Hex checksum used to pin this exact build
    pub fn checksum(&self) -> String {
        self.digest[..CHECKSUM_LEN]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Record a claim of this package on `generation`'s visit
    ///
    /// Returns true when the package was already visited in this generation.
    pub(crate) fn claim_visit(&mut self, generation: Generation) -> bool {
        if self.visit == generation {
            return true;
        }
        self.visit = generation;
        false
    }
}

/// Everything needed to add a package to the graph
///
/// Dependencies are given in their textual form and resolved against the
/// database's name table when the package is added.
#[derive(Debug, Clone)]
pub struct PackageTemplate {
    pub name: String,
    pub version: String,
    pub arch: String,
    pub installed_size: u64,
    pub size: u64,
    pub repos: u32,
    pub layer: u8,
    pub provider_priority: u16,
    pub cached_file: bool,
    pub depends: Vec<String>,
    pub provides: Vec<String>,
    pub install_if: Vec<String>,
    pub files: Vec<String>,
    /// Installed state to attach, when loading the installed database
    pub installed: Option<InstalledPackage>,
}

impl PackageTemplate {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            arch: "noarch".to_string(),
            installed_size: 0,
            size: 0,
            repos: 0,
            layer: LAYER_ROOT,
            provider_priority: 0,
            cached_file: false,
            depends: Vec::new(),
            provides: Vec::new(),
            install_if: Vec::new(),
            files: Vec::new(),
            installed: None,
        }
    }

    pub fn arch(mut self, arch: &str) -> Self {
        self.arch = arch.to_string();
        self
    }

    pub fn sizes(mut self, installed_size: u64, size: u64) -> Self {
        self.installed_size = installed_size;
        self.size = size;
        self
    }

    /// Offer the package from repository slot `repo`
    pub fn repo(mut self, repo: usize) -> Self {
        self.repos |= 1 << repo;
        self
    }

    pub fn depends(mut self, deps: &[&str]) -> Self {
        self.depends.extend(deps.iter().map(|d| d.to_string()));
        self
    }

    pub fn provides(mut self, provides: &[&str]) -> Self {
        self.provides.extend(provides.iter().map(|d| d.to_string()));
        self
    }

    pub fn install_if(mut self, deps: &[&str]) -> Self {
        self.install_if.extend(deps.iter().map(|d| d.to_string()));
        self
    }

    pub fn files(mut self, files: &[&str]) -> Self {
        self.files.extend(files.iter().map(|f| f.to_string()));
        self
    }

    pub fn provider_priority(mut self, priority: u16) -> Self {
        self.provider_priority = priority;
        self
    }

    /// Mark the package as installed under the default tag
    pub fn installed(mut self) -> Self {
        self.installed = Some(InstalledPackage::new(DEFAULT_TAG));
        self
    }
}
