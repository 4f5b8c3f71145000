// src/diagnose.rs

//! Explains why a world could not be satisfied
//!
//! Runs after the solver gave up. Packages the partial changeset selected are
//! marked, a discovery walk from the world classifies every name and package
//! it reaches, and an analysis pass turns what is missing, masked or
//! conflicting into a [`Report`].
//!
//! Discovery is an explicit work stack rather than recursion. Cycles in the
//! depends/provides graph are expected and terminate because a package is
//! never expanded twice for the same state within one generation.

use crate::changeset::Changeset;
use crate::graph::repository::{CACHE_REPOSITORY, DEFAULT_PINNING_MASK, bit};
use crate::graph::{
    DepMatch, Dependency, Generation, NameId, NodeState, Package, PackageDb, PackageId, StateSet,
};
use crate::output::Output;
use tracing::debug;

/// One labelled list inside a report entry, e.g. `required by: world[foo]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub label: &'static str,
    pub items: Vec<String>,
}

/// Everything reported about one name or package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub subject: String,
    pub groups: Vec<Group>,
}

impl ReportEntry {
    fn new(subject: String) -> Self {
        Self {
            subject,
            groups: Vec::new(),
        }
    }

    pub fn group(&self, label: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.label == label)
    }

    fn push(&mut self, label: &'static str, items: Vec<String>) {
        self.groups.push(Group { label, items });
    }

    fn push_nonempty(&mut self, label: &'static str, items: Vec<String>) {
        if !items.is_empty() {
            self.push(label, items);
        }
    }
}

/// Structured diagnostic for an unsatisfiable world
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub entries: Vec<ReportEntry>,
}

impl Report {
    /// Did any constraint get explained?
    pub fn is_explained(&self) -> bool {
        self.entries.iter().any(|e| !e.groups.is_empty())
    }

    pub fn entry(&self, subject: &str) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| e.subject == subject)
    }

    /// Print the report to standard error
    pub fn render(&self, out: &mut Output) {
        out.error("unable to select packages:");
        let mut indent = out.indent(true);
        for entry in self.entries.iter().filter(|e| !e.groups.is_empty()) {
            indent.line(&format!("  {}:", entry.subject));
            for group in &entry.groups {
                indent.group(0, &format!("    {}", group.label));
                for item in &group.items {
                    indent.item(item);
                }
                indent.end();
            }
        }
        if !self.is_explained() {
            indent.line("  Huh? Error reporter did not find the broken constraints.");
        }
    }
}

/// Does `pkg` provide `name` as itself or at a concrete version?
fn is_name_concrete(pkg: &Package, name: NameId) -> bool {
    pkg.name == name
        || pkg
            .provides
            .iter()
            .any(|d| d.name == name && d.version.is_some())
}

enum Task {
    Name(NameId, NodeState),
    Provider(NameId, usize, NodeState),
    Depends(PackageId),
    ReverseInstallIf(NameId),
    InstallIfCandidate(NameId, usize),
}

struct Discovery<'d> {
    db: &'d mut PackageDb,
    generation: Generation,
    stack: Vec<Task>,
}

impl Discovery<'_> {
    fn push_all(&mut self, tasks: Vec<Task>) {
        // Reversed so the first task runs first
        self.stack.extend(tasks.into_iter().rev());
    }

    fn run(&mut self) {
        while let Some(task) = self.stack.pop() {
            match task {
                Task::Name(name, state) => {
                    let count = self.db.name(name).providers.len();
                    self.push_all((0..count).map(|i| Task::Provider(name, i, state)).collect());
                }
                Task::Provider(name, index, state) => self.provider(name, index, state),
                Task::Depends(pkg) => {
                    let tasks = self
                        .db
                        .package(pkg)
                        .depends
                        .iter()
                        .filter(|d| !d.is_conflict())
                        .map(|d| Task::Name(d.name, NodeState::Present))
                        .collect();
                    self.push_all(tasks);
                }
                Task::ReverseInstallIf(name) => {
                    let mut tasks = Vec::new();
                    for &name0 in &self.db.name(name).rinstall_if {
                        let count = self.db.name(name0).providers.len();
                        tasks.extend((0..count).map(|i| Task::InstallIfCandidate(name0, i)));
                    }
                    self.push_all(tasks);
                }
                Task::InstallIfCandidate(name, index) => self.install_if_candidate(name, index),
            }
        }
    }

    fn provider(&mut self, name: NameId, index: usize, state: NodeState) {
        let generation = self.generation;
        let pkg = self.db.name(name).providers[index].pkg;
        let package = self.db.package(pkg);
        if !package.is_marked(generation) {
            return;
        }

        let mut state = state;
        if matches!(state, NodeState::Present | NodeState::InstallIf)
            && package.provider_priority == 0
            && !is_name_concrete(package, name)
        {
            state = NodeState::VirtualOnly;
        }
        if package.states(generation).contains(state) {
            return;
        }

        let pkg_name = package.name;
        let provides: Vec<(NameId, bool)> = package
            .provides
            .iter()
            .map(|d| (d.name, d.version.is_some()))
            .collect();

        self.db.package_mut(pkg).scratch.at(generation).insert(state);
        self.db.name_mut(pkg_name).scratch.at(generation).insert(state);
        for &(provided, versioned) in &provides {
            let provided_state = if state == NodeState::InstallIf && !versioned {
                NodeState::VirtualOnly
            } else {
                state
            };
            self.db
                .name_mut(provided)
                .scratch
                .at(generation)
                .insert(provided_state);
        }

        let mut tasks = vec![Task::Depends(pkg)];
        if matches!(state, NodeState::Present | NodeState::InstallIf) {
            tasks.push(Task::ReverseInstallIf(pkg_name));
            tasks.extend(provides.iter().map(|&(n, _)| Task::ReverseInstallIf(n)));
        }
        self.push_all(tasks);
    }

    fn install_if_candidate(&mut self, name: NameId, index: usize) {
        let generation = self.generation;
        let pkg = self.db.name(name).providers[index].pkg;
        let package = self.db.package(pkg);
        if !package.is_marked(generation) || package.install_if.is_empty() {
            return;
        }

        let selected = StateSet::of(&[NodeState::Present, NodeState::InstallIf]);
        let triggered = package.install_if.iter().all(|d| {
            d.is_conflict() != self.db.name(d.name).states(generation).intersects(selected)
        });
        if !triggered {
            return;
        }

        let mut tasks = vec![Task::Name(package.name, NodeState::InstallIf)];
        tasks.extend(
            package
                .provides
                .iter()
                .map(|d| Task::Name(d.name, NodeState::InstallIf)),
        );
        self.push_all(tasks);
    }
}

/// Mark the changeset's packages and classify everything the world reaches
///
/// Returns the generation the marks and states were recorded under.
pub(crate) fn discover(db: &mut PackageDb, changeset: &Changeset, world: &[Dependency]) -> Generation {
    let generation = db.next_generation();
    for pkg in changeset.iter().filter_map(|c| c.new_pkg) {
        db.mark_package(pkg, generation);
    }

    let mut discovery = Discovery {
        db,
        generation,
        stack: Vec::new(),
    };
    discovery.push_all(
        world
            .iter()
            .filter(|d| !d.is_conflict())
            .map(|d| Task::Name(d.name, NodeState::Present))
            .collect(),
    );
    discovery.run();
    generation
}

struct Analysis<'d> {
    db: &'d mut PackageDb,
    generation: Generation,
    world: &'d [Dependency],
    entries: Vec<ReportEntry>,
}

impl Analysis<'_> {
    fn analyze_deps(&mut self, deps: &[Dependency]) {
        let reported = StateSet::of(&[NodeState::InstallIf, NodeState::Present, NodeState::Missing]);
        for dep in deps.iter().filter(|d| !d.is_conflict()) {
            if self.db.name(dep.name).states(self.generation).intersects(reported) {
                continue;
            }
            self.db
                .name_mut(dep.name)
                .scratch
                .at(self.generation)
                .insert(NodeState::Missing);
            self.analyze_missing_name(dep.name);
        }
    }

    fn provided_by(&mut self, name: NameId) -> Vec<String> {
        let generation = self.generation;
        let all: Vec<PackageId> = self.db.name(name).providers.iter().map(|p| p.pkg).collect();
        let marked: Vec<PackageId> = all
            .iter()
            .copied()
            .filter(|p| self.db.package(*p).is_marked(generation))
            .collect();
        let providers = if marked.is_empty() { all } else { marked };

        for &pkg in &providers {
            let name0 = self.db.package(pkg).name;
            let scratch = self.db.name_mut(name0).scratch.at(generation);
            let refs = scratch.refs(generation);
            scratch.set_refs(refs + 1);
        }

        let mut items = Vec::new();
        for &pkg in &providers {
            let name0 = self.db.package(pkg).name;
            let refs = self.db.name(name0).scratch.refs(generation);
            let total = self.db.name(name0).providers.len();
            if refs as usize == total {
                items.push(self.db.name(name0).name.clone());
                self.db.name_mut(name0).scratch.at(generation).set_refs(0);
            } else if refs > 0 {
                items.push(self.db.pkg_display(pkg));
                self.db.name_mut(name0).scratch.at(generation).set_refs(refs - 1);
            }
        }
        items
    }

    fn analyze_missing_name(&mut self, name: NameId) {
        let label = self.db.name(name).name.clone();
        let mut entry = if self.db.name(name).providers.is_empty() {
            ReportEntry::new(format!("{} (no such package)", label))
        } else {
            let mut entry = ReportEntry::new(format!("{} (virtual)", label));
            entry.push(
                "note:",
                "please select one of the 'provided by' packages explicitly"
                    .split_whitespace()
                    .map(str::to_string)
                    .collect(),
            );
            entry.push("provided by:", self.provided_by(name));
            entry
        };

        let mut required = Vec::new();
        for dep in self.world.iter().filter(|d| d.name == name && !d.is_conflict()) {
            required.push(format!("world[{}]", self.db.dep_display(dep)));
        }

        // One package per reverse-depending name keeps the list short
        let visit = self.db.next_generation();
        let rdepends = self.db.name(name).rdepends.clone();
        for name0 in rdepends {
            let providers: Vec<PackageId> =
                self.db.name(name0).providers.iter().map(|p| p.pkg).collect();
            for pkg in providers {
                if !self.db.package(pkg).is_marked(self.generation) {
                    continue;
                }
                if self.db.package_mut(pkg).claim_visit(visit) {
                    continue;
                }
                let package = self.db.package(pkg);
                if let Some(dep) = package
                    .depends
                    .iter()
                    .find(|d| d.name == name && !d.is_conflict())
                {
                    required.push(format!(
                        "{}[{}]",
                        self.db.pkg_display(pkg),
                        self.db.dep_display(dep)
                    ));
                }
                break;
            }
        }
        entry.push("required by:", required);
        self.entries.push(entry);
    }

    fn broken_deps(&self, deps: &[Dependency]) -> Vec<String> {
        deps.iter()
            .filter(|d| d.broken)
            .map(|d| self.db.dep_display(d))
            .collect()
    }

    fn pinning_errors(&self, pkg: PackageId, tag: usize) -> Vec<String> {
        let db = &*self.db;
        let package = db.package(pkg);
        if package.is_installed() {
            return Vec::new();
        }
        if package.repos & db.available_repos == 0 {
            return vec!["--no-network".to_string()];
        }
        if bit(package.layer as usize) & db.active_layers == 0 {
            return vec!["layer".to_string()];
        }
        if package.repos == bit(CACHE_REPOSITORY) && !package.cached_file {
            return vec!["cache".to_string()];
        }
        if package.repos & db.pinning_mask_repos(DEFAULT_PINNING_MASK | bit(tag)) != 0 {
            return Vec::new();
        }
        db.repo_tags
            .iter()
            .filter(|t| package.repos & t.allowed_repos != 0)
            .map(|t| t.tag.clone())
            .collect()
    }

    fn conflicts(&self, pkg: PackageId) -> Vec<String> {
        let db = &*self.db;
        let package = db.package(pkg);
        let marked = |p: PackageId| db.package(p).is_marked(self.generation);

        let mut items: Vec<String> = db
            .name(package.name)
            .providers
            .iter()
            .filter(|p| p.pkg != pkg && marked(p.pkg))
            .map(|p| db.pkg_display(p.pkg))
            .collect();

        for provide in &package.provides {
            let mut own = true;
            for p in &db.name(provide.name).providers {
                if !marked(p.pkg) {
                    continue;
                }
                if provide.version.is_none() && p.version.is_none() {
                    continue;
                }
                if own && p.pkg == pkg && p.version == provide.version {
                    own = false;
                    continue;
                }
                items.push(format!("{}[{}]", db.pkg_display(p.pkg), db.dep_display(provide)));
            }
        }
        items
    }

    /// World and reverse dependencies that relate to `pkg` as `relation`
    fn matching_deps(&mut self, pkg: PackageId, relation: DepMatch) -> Vec<String> {
        let mut world: Vec<&Dependency> = self
            .world
            .iter()
            .filter(|d| self.db.dep_analyze(None, d, Some(pkg)) == relation)
            .collect();
        world.sort_by_key(|d| d.op.bits());
        let mut items: Vec<String> = world
            .iter()
            .map(|d| format!("world[{}]", self.db.dep_display(d)))
            .collect();

        let visit = self.db.next_generation();
        let package = self.db.package(pkg);
        let mut rdepends = self.db.name(package.name).rdepends.clone();
        for provide in &package.provides {
            rdepends.extend(self.db.name(provide.name).rdepends.iter().copied());
        }

        let mut matched: Vec<(PackageId, Dependency)> = Vec::new();
        for name0 in rdepends {
            let providers: Vec<PackageId> =
                self.db.name(name0).providers.iter().map(|p| p.pkg).collect();
            for pkg0 in providers {
                if !self.db.package(pkg0).is_marked(self.generation) {
                    continue;
                }
                if self.db.package_mut(pkg0).claim_visit(visit) {
                    continue;
                }
                let db = &*self.db;
                matched.extend(
                    db.package(pkg0)
                        .depends
                        .iter()
                        .filter(|d| db.dep_analyze(Some(pkg0), d, Some(pkg)) == relation)
                        .map(|d| (pkg0, d.clone())),
                );
            }
        }
        matched.sort_by(|(a, da), (b, db_)| {
            self.db
                .cmp_pkg_display(*a, *b)
                .then_with(|| da.op.bits().cmp(&db_.op.bits()))
        });
        items.extend(matched.iter().map(|(pkg0, dep)| {
            format!("{}[{}]", self.db.pkg_display(*pkg0), self.db.dep_display(dep))
        }));
        items
    }

    fn analyze_package(&mut self, pkg: PackageId, tag: usize) {
        let mut entry = ReportEntry::new(self.db.pkg_display(pkg));
        let package = self.db.package(pkg);

        if package.uninstallable {
            entry.push("error:", vec!["uninstallable".to_string()]);
            if !self.db.arch_compatible(&package.arch) {
                entry.push("arch:", vec![package.arch.to_string()]);
            }
            entry.push_nonempty("depends:", self.broken_deps(&package.depends));
            entry.push_nonempty("provides:", self.broken_deps(&package.provides));
            entry.push_nonempty("install_if:", self.broken_deps(&package.install_if));
        }

        entry.push_nonempty("masked in:", self.pinning_errors(pkg, tag));
        entry.push_nonempty("conflicts:", self.conflicts(pkg));
        let breaks = self.matching_deps(pkg, DepMatch::Conflicts);
        entry.push_nonempty("breaks:", breaks);
        if !entry.groups.is_empty() {
            let satisfies = self.matching_deps(pkg, DepMatch::Satisfies);
            entry.push_nonempty("satisfies:", satisfies);
        }
        self.entries.push(entry);
    }
}

/// Explain why `world` could not be reached from `changeset`
///
/// `changeset` is whatever partial selection the solver produced; only its
/// new packages matter. Never fails, even on cyclic graphs or empty input.
pub fn diagnose(db: &mut PackageDb, changeset: &Changeset, world: &[Dependency]) -> Report {
    let generation = discover(db, changeset, world);
    debug!("Diagnosing {} changes against {} world dependencies", changeset.len(), world.len());

    let mut analysis = Analysis {
        db,
        generation,
        world,
        entries: Vec::new(),
    };
    analysis.analyze_deps(world);
    for change in changeset {
        let Some(pkg) = change.new_pkg else {
            continue;
        };
        analysis.analyze_package(pkg, change.new_repository_tag);
        let depends = analysis.db.package(pkg).depends.clone();
        analysis.analyze_deps(&depends);
    }

    let report = Report {
        entries: analysis.entries,
    };
    if !report.is_explained() {
        debug!("No broken constraint found");
    }
    report
}
