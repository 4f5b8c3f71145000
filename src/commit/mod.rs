// src/commit/mod.rs

//! Commit engine
//!
//! Applies a solver-produced [`Changeset`] to the package database:
//!
//! 1. check that every world dependency's pinning tag has repositories
//! 2. total up the work, optionally list it and ask for confirmation
//! 3. run pre-commit hooks
//! 4. apply changes in solver order through the [`Installer`]
//! 5. run pending triggers
//! 6. persist the world through the [`ConfigStore`]
//! 7. run post-commit hooks and print the summary line
//!
//! Steps 1-3 can abort the commit before anything is mutated. Later
//! failures are counted and reported, never rolled back.
//!
//! The engine is not reentrant: callers must hold the database's exclusive
//! lock for the whole run, and the `&mut PackageDb` borrow enforces a single
//! commit at a time in-process.

mod confirm;
pub mod hooks;
pub mod installer;
pub mod progress;
pub mod summary;

pub use confirm::StdinPrompt;
pub use hooks::{HookKind, ProcessRunner};
pub use installer::StateInstaller;
pub use progress::{LogProgress, Progress, ProgressSink};

use crate::changeset::{Changeset, Totals, classify};
use crate::diagnose;
use crate::error::{AbortReason, Error, Result};
use crate::graph::{Dependency, PackageDb, PackageId};
use crate::output::Output;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Performs the actual package installation and removal
pub trait Installer {
    /// Replace `old` by `new`; either side may be absent
    ///
    /// `progress` receives the number of bytes of `new` installed so far.
    fn install(
        &mut self,
        db: &mut PackageDb,
        old: Option<PackageId>,
        new: Option<PackageId>,
        progress: &mut dyn FnMut(u64),
    ) -> Result<()>;
}

/// Runs a package's trigger script for the paths that fired it
pub trait TriggerRunner {
    fn run_trigger(&mut self, db: &PackageDb, pkg: PackageId, paths: &[String]) -> Result<()>;
}

/// Executes one commit hook file
pub trait HookRunner {
    fn run_hook(&mut self, hook: &Path, kind: HookKind) -> Result<()>;
}

/// Persists the database configuration (world and installed state)
pub trait ConfigStore {
    fn write_config(&mut self, db: &PackageDb) -> Result<()>;
}

/// Asks the user a yes/no question
pub trait Prompt {
    fn confirm(&mut self, question: &str) -> bool;
}

/// What a solver produced for a world
#[derive(Debug)]
pub enum Solution {
    /// The changeset reaches the world
    Complete(Changeset),
    /// No valid changeset exists; the partial one explains the attempt
    Unsatisfiable(Changeset),
}

/// Computes the changeset that takes the installed set to `world`
pub trait Solver {
    fn solve(&mut self, db: &mut PackageDb, world: &[Dependency]) -> Result<Solution>;
}

/// Knobs for one commit
#[derive(Debug, Clone)]
pub struct CommitOptions {
    /// Report what would happen without installing anything
    pub simulate: bool,
    /// List changes and ask before applying them
    pub interactive: bool,
    /// Skip hooks and scripts entirely
    pub no_scripts: bool,
    /// Report commit hooks instead of running them
    pub no_commit_hooks: bool,
    /// Commit even when world dependencies reference unknown tags
    pub force_broken_world: bool,
    /// The package manager is replacing itself; the summary line is left
    /// to the restarted process
    pub performing_self_upgrade: bool,
    pub verbosity: i32,
    /// Filesystem root packages are installed into
    pub root: PathBuf,
    /// Hook directory, relative to `root`
    pub hooks_dir: PathBuf,
    /// Trigger script directory, relative to `root`
    pub scripts_dir: PathBuf,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            simulate: false,
            interactive: false,
            no_scripts: false,
            no_commit_hooks: false,
            force_broken_world: false,
            performing_self_upgrade: false,
            verbosity: 1,
            root: PathBuf::from("/"),
            hooks_dir: PathBuf::from(hooks::COMMIT_HOOKS_DIR),
            scripts_dir: PathBuf::from(hooks::SCRIPTS_DIR),
        }
    }
}

/// The external collaborators a commit talks to
pub struct Collaborators<'a> {
    pub installer: &'a mut dyn Installer,
    pub triggers: &'a mut dyn TriggerRunner,
    pub hooks: &'a mut dyn HookRunner,
    pub config: &'a mut dyn ConfigStore,
    pub prompt: &'a mut dyn Prompt,
    pub progress: &'a mut dyn ProgressSink,
}

/// Applies changesets to a [`PackageDb`]
pub struct CommitEngine<'a> {
    options: CommitOptions,
    io: Collaborators<'a>,
}

impl<'a> CommitEngine<'a> {
    pub fn new(options: CommitOptions, io: Collaborators<'a>) -> Self {
        Self { options, io }
    }

    pub fn options(&self) -> &CommitOptions {
        &self.options
    }

    /// Count world dependencies pinned to tags without any repository
    fn check_world(&self, db: &PackageDb, world: &[Dependency], out: &mut Output) -> usize {
        if self.options.force_broken_world {
            return 0;
        }
        let mut bad = 0;
        for dep in world {
            let tag = dep.repository_tag;
            if tag == 0 || db.repo_tags.get(tag).is_some_and(|t| t.allowed_repos != 0) {
                continue;
            }
            let tag_name = db.repo_tags.get(tag).map_or("", |t| t.tag.as_str());
            out.warning(&format!(
                "The repository tag for world dependency '{}{}' does not exist",
                db.name(dep.name).name,
                tag_name
            ));
            bad += 1;
        }
        bad
    }

    /// Apply `changeset` and make `world` the persisted world
    ///
    /// Returns the number of errors (0 on full success). Aborts before any
    /// mutation return [`Error::CommitAborted`].
    pub fn commit_changeset(
        &mut self,
        db: &mut PackageDb,
        changeset: &Changeset,
        world: &[Dependency],
        out: &mut Output,
    ) -> Result<u32> {
        let bad = self.check_world(db, world, out);
        if bad > 0 {
            out.error(
                "Not committing changes due to missing repository tags. \
                 Use --force-broken-world to override.",
            );
            return Err(Error::CommitAborted(AbortReason::BrokenWorld(bad)));
        }

        let mut errors = 0;
        let mut totals = Totals::default();

        if !changeset.is_empty() {
            totals = changeset.totals(db);
            info!(
                "Committing {} changes ({} package operations)",
                totals.stats.changes, totals.stats.packages
            );

            if (self.options.verbosity > 1 || self.options.interactive) && !self.options.simulate {
                let shown = summary::show_changes(db, changeset, &totals, &self.options, out);
                if shown > 0
                    && self.options.interactive
                    && !self.io.prompt.confirm("Do you want to continue [Y/n]? ")
                {
                    info!("Commit declined");
                    return Err(Error::CommitAborted(AbortReason::Declined));
                }
            }

            if let Err(hook) =
                hooks::run_commit_hooks(&self.options, self.io.hooks, HookKind::PreCommit, out)
            {
                return Err(Error::CommitAborted(AbortReason::PreCommitHook(hook)));
            }

            errors += self.apply_changes(db, changeset, &totals, out);
            errors += db.num_dir_update_errors;
            errors += self.run_triggers(db, changeset);
        }

        db.world = world.to_vec();
        if let Err(e) = self.io.config.write_config(db) {
            warn!("Failed to write configuration: {}", e);
            out.error(&format!("Failed to write configuration: {}", e));
            errors += 1;
        }

        if let Err(hook) =
            hooks::run_commit_hooks(&self.options, self.io.hooks, HookKind::PostCommit, out)
        {
            warn!("post-commit hook {} failed", hook);
        }

        if !self.options.performing_self_upgrade {
            out.msg(&summary::summary_line(db, &totals, errors, &self.options));
        }
        info!("Commit finished with {} errors", errors);
        Ok(errors)
    }

    fn apply_changes(
        &mut self,
        db: &mut PackageDb,
        changeset: &Changeset,
        totals: &Totals,
        out: &mut Output,
    ) -> u32 {
        let simulate = self.options.simulate;
        let installer = &mut *self.io.installer;
        let mut progress = Progress::new(&mut *self.io.progress, totals.stats);
        let width = progress.counter_width();
        let mut errors = 0;

        for change in changeset {
            let mut failed = change
                .old_pkg
                .and_then(|old| db.package(old).ipkg.as_ref())
                .is_some_and(|ipkg| ipkg.broken_files || ipkg.broken_script);

            if let Some(kind) = classify(db, change) {
                out.msg(&summary::change_line(
                    db,
                    change,
                    kind,
                    progress.done.changes,
                    totals.stats.changes,
                    width,
                ));
                progress.report(0);

                let available = change.new_pkg.is_some_and(|p| db.pkg_available(p));
                let needs_install =
                    change.old_pkg != change.new_pkg || (change.reinstall && available);
                let mut install_failed = false;
                if !simulate && needs_install {
                    if let Err(e) = installer.install(
                        db,
                        change.old_pkg,
                        change.new_pkg,
                        &mut |bytes| progress.report(bytes),
                    ) {
                        warn!("Failed to apply change: {}", e);
                        install_failed = true;
                    }
                }
                if let (false, Some(new)) = (install_failed, change.new_pkg) {
                    if let Some(ipkg) = db.package_mut(new).ipkg.as_mut() {
                        ipkg.repository_tag = change.new_repository_tag;
                    }
                }
                failed |= install_failed;
            }

            if failed {
                debug!("Change for {:?} counted as failed", change.pkg().map(|p| db.pkg_display(p)));
                errors += 1;
            }
            progress.done.count(db, change);
        }
        progress.finish();
        errors
    }

    fn run_triggers(&mut self, db: &mut PackageDb, changeset: &Changeset) -> u32 {
        if self.options.no_scripts || self.options.simulate {
            debug!("Scripts disabled, pending triggers left queued");
            return 0;
        }
        let mut errors = 0;
        for pkg in changeset.iter().filter_map(|c| c.new_pkg) {
            let pending = match db.package(pkg).ipkg.as_ref() {
                Some(ipkg) if !ipkg.pending_triggers.is_empty() => ipkg.pending_triggers.clone(),
                _ => continue,
            };
            if let Err(e) = self.io.triggers.run_trigger(db, pkg, &pending) {
                warn!("Trigger of {} failed: {}", db.pkg_display(pkg), e);
                errors += 1;
            }
            if let Some(ipkg) = db.package_mut(pkg).ipkg.as_mut() {
                ipkg.pending_triggers.clear();
            }
        }
        errors
    }

    /// Solve `world` and commit the result, or explain why it cannot be solved
    ///
    /// An unsatisfiable world prints the diagnostic report and counts as one
    /// error; nothing is committed.
    pub fn commit_world(
        &mut self,
        db: &mut PackageDb,
        solver: &mut dyn Solver,
        world: &[Dependency],
        out: &mut Output,
    ) -> Result<u32> {
        let bad = self.check_world(db, world, out);
        if bad > 0 {
            out.error(
                "Not committing changes due to missing repository tags. \
                 Use --force-broken-world to override.",
            );
            return Err(Error::CommitAborted(AbortReason::BrokenWorld(bad)));
        }

        match solver.solve(db, world)? {
            Solution::Complete(changeset) => self.commit_changeset(db, &changeset, world, out),
            Solution::Unsatisfiable(partial) => {
                let report = diagnose::diagnose(db, &partial, world);
                report.render(out);
                Ok(1)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{Change, Stats};
    use crate::graph::PackageTemplate;
    use std::cell::RefCell;

    #[derive(Default)]
    pub(crate) struct Fakes {
        pub installs: Vec<(Option<PackageId>, Option<PackageId>)>,
        pub fail_install: Option<PackageId>,
        pub triggers: Vec<(PackageId, Vec<String>)>,
        pub hooks: Vec<HookKind>,
        pub fail_pre_hook: bool,
        pub writes: usize,
        pub fail_write: bool,
        pub answer: bool,
        pub questions: usize,
        pub progress: Vec<(u64, u64)>,
    }

    struct Fake<'f>(&'f RefCell<Fakes>);

    impl Installer for Fake<'_> {
        fn install(
            &mut self,
            db: &mut PackageDb,
            old: Option<PackageId>,
            new: Option<PackageId>,
            progress: &mut dyn FnMut(u64),
        ) -> Result<()> {
            self.0.borrow_mut().installs.push((old, new));
            if new.is_some() && self.0.borrow().fail_install == new {
                return Err(Error::InstallFailed("boom".to_string()));
            }
            StateInstaller::new().install(db, old, new, progress)
        }
    }

    impl TriggerRunner for Fake<'_> {
        fn run_trigger(&mut self, _db: &PackageDb, pkg: PackageId, paths: &[String]) -> Result<()> {
            self.0.borrow_mut().triggers.push((pkg, paths.to_vec()));
            Ok(())
        }
    }

    impl HookRunner for Fake<'_> {
        fn run_hook(&mut self, _hook: &Path, kind: HookKind) -> Result<()> {
            let mut fakes = self.0.borrow_mut();
            fakes.hooks.push(kind);
            if kind == HookKind::PreCommit && fakes.fail_pre_hook {
                return Err(Error::ScriptFailed("pre".to_string()));
            }
            Ok(())
        }
    }

    impl ConfigStore for Fake<'_> {
        fn write_config(&mut self, _db: &PackageDb) -> Result<()> {
            let mut fakes = self.0.borrow_mut();
            fakes.writes += 1;
            if fakes.fail_write {
                return Err(Error::InitError("disk full".to_string()));
            }
            Ok(())
        }
    }

    impl Prompt for Fake<'_> {
        fn confirm(&mut self, _question: &str) -> bool {
            let mut fakes = self.0.borrow_mut();
            fakes.questions += 1;
            fakes.answer
        }
    }

    impl ProgressSink for Fake<'_> {
        fn update(&mut self, done: u64, total: u64) {
            self.0.borrow_mut().progress.push((done, total));
        }
    }

    fn commit(
        fakes: &RefCell<Fakes>,
        options: CommitOptions,
        db: &mut PackageDb,
        changeset: &Changeset,
        world: &[Dependency],
        out: &mut Output,
    ) -> Result<u32> {
        let (mut a, mut b, mut c, mut d, mut e, mut f) = (
            Fake(fakes),
            Fake(fakes),
            Fake(fakes),
            Fake(fakes),
            Fake(fakes),
            Fake(fakes),
        );
        let io = Collaborators {
            installer: &mut a,
            triggers: &mut b,
            hooks: &mut c,
            config: &mut d,
            prompt: &mut e,
            progress: &mut f,
        };
        CommitEngine::new(options, io).commit_changeset(db, changeset, world, out)
    }

    fn hooked_options() -> (tempfile::TempDir, CommitOptions) {
        let root = tempfile::TempDir::new().unwrap();
        let options = CommitOptions {
            root: root.path().to_path_buf(),
            ..CommitOptions::default()
        };
        let dir = root.path().join(&options.hooks_dir);
        std::fs::create_dir_all(&dir).unwrap();
        let hook = dir.join("10-log");
        std::fs::write(&hook, "#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&hook, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        (root, options)
    }

    #[test]
    fn test_install_and_purge_end_to_end() {
        let mut db = PackageDb::new();
        let old = db
            .add_package(PackageTemplate::new("old", "2.0").sizes(1024, 512).installed())
            .unwrap();
        let new = db
            .add_package(PackageTemplate::new("pkg", "1.0").sizes(4096, 2048))
            .unwrap();
        let changeset =
            Changeset::from_changes(&db, [Change::install(new), Change::purge(old)]).unwrap();
        let world = db.parse_dependencies("pkg").unwrap();
        let fakes = RefCell::new(Fakes::default());
        let mut out = Output::capture(1);

        let errors = commit(&fakes, CommitOptions::default(), &mut db, &changeset, &world, &mut out)
            .unwrap();

        assert_eq!(errors, 0);
        let fakes = fakes.into_inner();
        assert_eq!(fakes.installs, vec![(None, Some(new)), (Some(old), None)]);
        assert_eq!(fakes.writes, 1);
        assert_eq!(db.world, world);
        assert_eq!(
            out.captured(),
            "(1/2) Installing pkg (1.0)\n(2/2) Purging old (2.0)\nOK: 0 MiB in 1 packages\n"
        );
        let dones: Vec<u64> = fakes.progress.iter().map(|(d, _)| *d).collect();
        assert!(dones.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(fakes.progress.last(), Some(&(4098, 4098)));
    }

    #[test]
    fn test_applied_work_matches_precomputed_totals() {
        let mut db = PackageDb::new();
        let a1 = db
            .add_package(PackageTemplate::new("a", "1.0").sizes(100, 10).installed())
            .unwrap();
        let a2 = db.add_package(PackageTemplate::new("a", "2.0").sizes(300, 30)).unwrap();
        let gone = db
            .add_package(PackageTemplate::new("gone", "1.0").sizes(50, 5).installed())
            .unwrap();
        let fresh = db.add_package(PackageTemplate::new("fresh", "1.0").sizes(7, 1)).unwrap();
        let changeset = Changeset::from_changes(
            &db,
            [Change::replace(a1, a2), Change::purge(gone), Change::install(fresh)],
        )
        .unwrap();
        let totals = changeset.totals(&db);
        assert_eq!(
            totals.stats,
            Stats {
                bytes: 307,
                packages: 4,
                changes: 3
            }
        );
        let fakes = RefCell::new(Fakes::default());
        let mut out = Output::capture(0);

        let errors = commit(&fakes, CommitOptions::default(), &mut db, &changeset, &[], &mut out)
            .unwrap();

        assert_eq!(errors, 0);
        let weight = totals.stats.weight();
        let progress = &fakes.borrow().progress;
        assert!(progress.iter().all(|(_, total)| *total == weight));
        assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
        assert_eq!(progress.last(), Some(&(weight, weight)));
    }

    #[test]
    fn test_simulate_never_installs() {
        let mut db = PackageDb::new();
        let new = db
            .add_package(PackageTemplate::new("pkg", "1.0").sizes(3 * 1024 * 1024, 1))
            .unwrap();
        let changeset = Changeset::from_changes(&db, [Change::install(new)]).unwrap();
        let fakes = RefCell::new(Fakes::default());
        let mut out = Output::capture(1);
        let options = CommitOptions {
            simulate: true,
            ..CommitOptions::default()
        };

        let errors = commit(&fakes, options, &mut db, &changeset, &[], &mut out).unwrap();

        assert_eq!(errors, 0);
        assert!(fakes.borrow().installs.is_empty());
        assert_eq!(fakes.borrow().writes, 1);
        assert!(!db.package(new).is_installed());
        assert_eq!(
            out.captured(),
            "(1/1) Installing pkg (1.0)\nOK: 3 MiB in 1 packages\n"
        );
    }

    #[test]
    fn test_broken_world_aborts_before_mutation() {
        let mut db = PackageDb::new();
        let new = db.add_package(PackageTemplate::new("pkg", "1.0")).unwrap();
        let changeset = Changeset::from_changes(&db, [Change::install(new)]).unwrap();
        let world = db.parse_dependencies("pkg@nowhere").unwrap();
        let fakes = RefCell::new(Fakes::default());
        let mut out = Output::capture(1);

        let result = commit(&fakes, CommitOptions::default(), &mut db, &changeset, &world, &mut out);

        assert!(matches!(
            result,
            Err(Error::CommitAborted(AbortReason::BrokenWorld(1)))
        ));
        assert!(fakes.borrow().installs.is_empty());
        assert_eq!(fakes.borrow().writes, 0);
        assert!(out.captured().contains("'pkg@nowhere' does not exist"));

        let options = CommitOptions {
            force_broken_world: true,
            ..CommitOptions::default()
        };
        let errors = commit(&fakes, options, &mut db, &changeset, &world, &mut out).unwrap();
        assert_eq!(errors, 0);
        assert_eq!(fakes.borrow().installs.len(), 1);
    }

    #[test]
    fn test_declined_prompt_aborts() {
        let mut db = PackageDb::new();
        let old = db.add_package(PackageTemplate::new("old", "1.0").installed()).unwrap();
        let changeset = Changeset::from_changes(&db, [Change::purge(old)]).unwrap();
        let fakes = RefCell::new(Fakes::default());
        let mut out = Output::capture(1);
        let options = CommitOptions {
            interactive: true,
            ..CommitOptions::default()
        };

        let result = commit(&fakes, options.clone(), &mut db, &changeset, &[], &mut out);
        assert!(matches!(
            result,
            Err(Error::CommitAborted(AbortReason::Declined))
        ));
        assert!(db.package(old).is_installed());
        assert!(out.captured().starts_with("The following packages will be REMOVED:\n  old\n"));

        fakes.borrow_mut().answer = true;
        let errors = commit(&fakes, options, &mut db, &changeset, &[], &mut out).unwrap();
        assert_eq!(errors, 0);
        assert_eq!(fakes.borrow().questions, 2);
        assert!(!db.package(old).is_installed());
    }

    #[test]
    fn test_pre_commit_hook_failure_aborts() {
        let (_root, options) = hooked_options();
        let mut db = PackageDb::new();
        let new = db.add_package(PackageTemplate::new("pkg", "1.0")).unwrap();
        let changeset = Changeset::from_changes(&db, [Change::install(new)]).unwrap();
        let fakes = RefCell::new(Fakes {
            fail_pre_hook: true,
            ..Fakes::default()
        });
        let mut out = Output::capture(1);

        let result = commit(&fakes, options, &mut db, &changeset, &[], &mut out);

        assert!(matches!(
            result,
            Err(Error::CommitAborted(AbortReason::PreCommitHook(_)))
        ));
        assert!(fakes.borrow().installs.is_empty());
        assert_eq!(fakes.borrow().hooks, vec![HookKind::PreCommit]);
    }

    #[test]
    fn test_hooks_bracket_the_commit() {
        let (_root, options) = hooked_options();
        let mut db = PackageDb::new();
        let new = db.add_package(PackageTemplate::new("pkg", "1.0")).unwrap();
        let changeset = Changeset::from_changes(&db, [Change::install(new)]).unwrap();
        let fakes = RefCell::new(Fakes::default());
        let mut out = Output::capture(1);

        commit(&fakes, options, &mut db, &changeset, &[], &mut out).unwrap();
        assert_eq!(
            fakes.borrow().hooks,
            vec![HookKind::PreCommit, HookKind::PostCommit]
        );
    }

    #[test]
    fn test_failures_are_counted_not_fatal() {
        let mut db = PackageDb::new();
        let broken = db.add_package(PackageTemplate::new("a", "1.0").installed()).unwrap();
        db.package_mut(broken).ipkg.as_mut().unwrap().broken_script = true;
        let fixed = db.add_package(PackageTemplate::new("a", "1.1")).unwrap();
        let bad = db.add_package(PackageTemplate::new("b", "1.0")).unwrap();
        let good = db.add_package(PackageTemplate::new("c", "1.0")).unwrap();
        db.num_dir_update_errors = 1;
        let changeset = Changeset::from_changes(
            &db,
            [
                Change::replace(broken, fixed),
                Change::install(bad),
                Change::install(good),
            ],
        )
        .unwrap();
        let fakes = RefCell::new(Fakes {
            fail_install: Some(bad),
            fail_write: true,
            ..Fakes::default()
        });
        let mut out = Output::capture(1);

        let errors = commit(&fakes, CommitOptions::default(), &mut db, &changeset, &[], &mut out)
            .unwrap();

        // broken old package, failed install, directory error, config write
        assert_eq!(errors, 4);
        assert_eq!(fakes.borrow().installs.len(), 3);
        assert!(db.package(fixed).is_installed());
        assert!(db.package(good).is_installed());
        assert!(out.captured().ends_with("4 errors; 0 MiB in 2 packages\n"));
    }

    #[test]
    fn test_pin_is_updated_only_on_success() {
        let mut db = PackageDb::new();
        db.add_repository("https://mirror.example.org/edge", Some("edge"))
            .unwrap();
        let edge = db.get_tag_id("edge").unwrap();
        let pkg = db.add_package(PackageTemplate::new("a", "1.0").installed()).unwrap();
        let other = db.add_package(PackageTemplate::new("b", "1.0")).unwrap();
        let changeset = Changeset::from_changes(
            &db,
            [
                Change::repin(pkg, 0, edge),
                Change::install(other).with_tags(0, edge),
            ],
        )
        .unwrap();
        let fakes = RefCell::new(Fakes {
            fail_install: Some(other),
            ..Fakes::default()
        });
        let mut out = Output::capture(1);

        let errors = commit(&fakes, CommitOptions::default(), &mut db, &changeset, &[], &mut out)
            .unwrap();

        assert_eq!(errors, 1);
        assert_eq!(db.package(pkg).ipkg.as_ref().unwrap().repository_tag, edge);
        assert!(fakes.borrow().installs.iter().all(|(_, n)| *n == Some(other)));
        assert!(out.captured().starts_with("(1/2) Updating pinning a@edge (1.0)\n"));
    }

    #[test]
    fn test_unavailable_reinstall_is_skipped() {
        let mut db = PackageDb::new();
        let pkg = db.add_package(PackageTemplate::new("a", "1.0").installed()).unwrap();
        let changeset = Changeset::from_changes(&db, [Change::reinstall(pkg)]).unwrap();
        let fakes = RefCell::new(Fakes::default());
        let mut out = Output::capture(1);

        let errors = commit(&fakes, CommitOptions::default(), &mut db, &changeset, &[], &mut out)
            .unwrap();

        assert_eq!(errors, 0);
        assert!(fakes.borrow().installs.is_empty());
        assert!(out
            .captured()
            .starts_with("(1/1) [unavailable, skipped] Reinstalling a (1.0)\n"));
    }

    #[test]
    fn test_triggers_run_once_and_clear() {
        let mut db = PackageDb::new();
        let pkg = db.add_package(PackageTemplate::new("man-db", "2.12").installed()).unwrap();
        db.package_mut(pkg).ipkg.as_mut().unwrap().pending_triggers =
            vec!["usr/share/man".to_string()];
        let changeset = Changeset::from_changes(&db, [Change::reinstall(pkg)]).unwrap();
        let fakes = RefCell::new(Fakes::default());
        let mut out = Output::capture(0);

        commit(&fakes, CommitOptions::default(), &mut db, &changeset, &[], &mut out).unwrap();
        commit(&fakes, CommitOptions::default(), &mut db, &changeset, &[], &mut out).unwrap();

        assert_eq!(
            fakes.borrow().triggers,
            vec![(pkg, vec!["usr/share/man".to_string()])]
        );
        assert!(db.package(pkg).ipkg.as_ref().unwrap().pending_triggers.is_empty());
    }

    #[test]
    fn test_triggers_skipped_without_scripts() {
        for options in [
            CommitOptions {
                no_scripts: true,
                ..CommitOptions::default()
            },
            CommitOptions {
                simulate: true,
                ..CommitOptions::default()
            },
        ] {
            let mut db = PackageDb::new();
            let pkg = db.add_package(PackageTemplate::new("man-db", "2.12").installed()).unwrap();
            db.package_mut(pkg).ipkg.as_mut().unwrap().pending_triggers =
                vec!["usr/share/man".to_string()];
            let changeset = Changeset::from_changes(&db, [Change::reinstall(pkg)]).unwrap();
            let fakes = RefCell::new(Fakes::default());
            let mut out = Output::capture(0);

            let errors = commit(&fakes, options, &mut db, &changeset, &[], &mut out).unwrap();

            assert_eq!(errors, 0);
            assert!(fakes.borrow().triggers.is_empty());
        }
    }

    #[test]
    fn test_empty_changeset_still_persists_world() {
        let mut db = PackageDb::new();
        let world = db.parse_dependencies("busybox").unwrap();
        let fakes = RefCell::new(Fakes::default());
        let mut out = Output::capture(1);

        let errors = commit(&fakes, CommitOptions::default(), &mut db, &Changeset::new(), &world, &mut out)
            .unwrap();

        assert_eq!(errors, 0);
        assert_eq!(fakes.borrow().writes, 1);
        assert_eq!(db.world, world);
        assert_eq!(out.captured(), "OK: 0 MiB in 0 packages\n");
    }

    #[test]
    fn test_self_upgrade_suppresses_summary() {
        let mut db = PackageDb::new();
        let options = CommitOptions {
            performing_self_upgrade: true,
            ..CommitOptions::default()
        };
        let fakes = RefCell::new(Fakes::default());
        let mut out = Output::capture(1);
        commit(&fakes, options, &mut db, &Changeset::new(), &[], &mut out).unwrap();
        assert_eq!(out.captured(), "");
    }
}
