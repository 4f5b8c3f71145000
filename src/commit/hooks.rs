// src/commit/hooks.rs

//! Commit hooks and script execution
//!
//! Hooks are the executable files in `<root>/etc/pkgcore/commit_hooks.d`,
//! run in name order with a single argument, `pre-commit` or `post-commit`.
//! Dot-files are ignored.

use super::{CommitOptions, HookRunner, TriggerRunner};
use crate::error::{Error, Result};
use crate::graph::{PackageDb, PackageId};
use crate::output::Output;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

/// Hook directory, relative to the filesystem root
pub const COMMIT_HOOKS_DIR: &str = "etc/pkgcore/commit_hooks.d";

/// Directory holding installed package scripts, relative to the root
pub const SCRIPTS_DIR: &str = "lib/pkgcore/scripts";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    PreCommit,
    PostCommit,
}

impl HookKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::PreCommit => "pre-commit",
            HookKind::PostCommit => "post-commit",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(unix)]
fn is_executable(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &std::fs::Metadata) -> bool {
    true
}

/// Executable hook file names in `dir`, sorted
///
/// A missing directory has no hooks.
pub fn list_hooks(dir: &Path) -> Result<Vec<String>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut hooks = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() || !is_executable(&meta) {
            debug!("Ignoring non-executable hook entry {}", name);
            continue;
        }
        hooks.push(name);
    }
    hooks.sort();
    Ok(hooks)
}

/// Run every commit hook of `kind`
///
/// Returns the relative path of the first failing hook. Only a failing
/// pre-commit hook stops the remaining hooks.
pub fn run_commit_hooks(
    options: &CommitOptions,
    runner: &mut dyn HookRunner,
    kind: HookKind,
    out: &mut Output,
) -> std::result::Result<(), String> {
    if options.no_scripts || options.simulate {
        return Ok(());
    }

    let dir = options.root.join(&options.hooks_dir);
    let hooks = match list_hooks(&dir) {
        Ok(hooks) => hooks,
        Err(e) => {
            warn!("Cannot read hook directory {}: {}", dir.display(), e);
            return Ok(());
        }
    };

    let mut failed = None;
    for hook in hooks {
        let relative = options.hooks_dir.join(&hook);
        if options.no_commit_hooks {
            out.msg(&format!("Skipping: {} {}", relative.display(), kind));
            continue;
        }
        out.detail(&format!("Executing: {} {}", relative.display(), kind));
        debug!("Executing {} hook {}", kind, relative.display());

        if let Err(e) = runner.run_hook(&dir.join(&hook), kind) {
            warn!("{} hook {} failed: {}", kind, relative.display(), e);
            if failed.is_none() {
                failed = Some(relative.display().to_string());
            }
            if kind == HookKind::PreCommit {
                break;
            }
        }
    }
    match failed {
        Some(hook) => Err(hook),
        None => Ok(()),
    }
}

/// Runs hooks and trigger scripts as child processes
///
/// Children run with the filesystem root as working directory and inherit
/// stdio. There is no timeout; a hanging script blocks the commit.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    root: PathBuf,
    scripts_dir: PathBuf,
}

impl ProcessRunner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scripts_dir: PathBuf::from(SCRIPTS_DIR),
        }
    }

    pub fn with_scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scripts_dir = dir.into();
        self
    }

    fn run(&self, program: &Path, args: &[&str]) -> Result<()> {
        let status = Command::new(program)
            .args(args)
            .current_dir(&self.root)
            .status()
            .map_err(|e| Error::ScriptFailed(format!("{}: {}", program.display(), e)))?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::ScriptFailed(format!(
                "{}: exited with {}",
                program.display(),
                status
            )))
        }
    }

    /// Location of the trigger script of an installed package
    pub fn trigger_script(&self, db: &PackageDb, pkg: PackageId) -> PathBuf {
        let package = db.package(pkg);
        self.root.join(&self.scripts_dir).join(format!(
            "{}-{}.trigger",
            db.pkg_name(pkg),
            package.version
        ))
    }
}

impl HookRunner for ProcessRunner {
    fn run_hook(&mut self, hook: &Path, kind: HookKind) -> Result<()> {
        self.run(hook, &[kind.as_str()])
    }
}

impl TriggerRunner for ProcessRunner {
    fn run_trigger(&mut self, db: &PackageDb, pkg: PackageId, paths: &[String]) -> Result<()> {
        let script = self.trigger_script(db, pkg);
        if !script.exists() {
            debug!("{} has no trigger script", db.pkg_display(pkg));
            return Ok(());
        }
        info!("Running trigger of {}", db.pkg_display(pkg));
        let args: Vec<&str> = paths.iter().map(String::as_str).collect();
        self.run(&script, &args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Vec<(PathBuf, HookKind)>,
        fail: Option<String>,
    }

    impl HookRunner for RecordingRunner {
        fn run_hook(&mut self, hook: &Path, kind: HookKind) -> Result<()> {
            self.calls.push((hook.to_path_buf(), kind));
            match &self.fail {
                Some(name) if hook.ends_with(name) => Err(Error::ScriptFailed(name.clone())),
                _ => Ok(()),
            }
        }
    }

    fn write_hook(dir: &Path, name: &str, executable: bool) {
        let path = dir.join(name);
        fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = if executable { 0o755 } else { 0o644 };
            fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
        }
        #[cfg(not(unix))]
        let _ = executable;
    }

    fn setup() -> (TempDir, CommitOptions) {
        let root = TempDir::new().unwrap();
        let options = CommitOptions {
            root: root.path().to_path_buf(),
            ..CommitOptions::default()
        };
        fs::create_dir_all(root.path().join(&options.hooks_dir)).unwrap();
        (root, options)
    }

    #[test]
    fn test_dot_files_are_skipped() {
        let (_root, options) = setup();
        let dir = options.root.join(&options.hooks_dir);
        write_hook(&dir, ".hidden", true);
        write_hook(&dir, "01-check", true);

        let mut runner = RecordingRunner::default();
        let mut out = Output::capture(1);
        run_commit_hooks(&options, &mut runner, HookKind::PreCommit, &mut out).unwrap();

        assert_eq!(runner.calls.len(), 1);
        assert!(runner.calls[0].0.ends_with("01-check"));
        assert_eq!(runner.calls[0].1, HookKind::PreCommit);
    }

    #[test]
    fn test_hooks_run_in_name_order() {
        let (_root, options) = setup();
        let dir = options.root.join(&options.hooks_dir);
        write_hook(&dir, "20-second", true);
        write_hook(&dir, "10-first", true);

        assert_eq!(list_hooks(&dir).unwrap(), vec!["10-first", "20-second"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_entries_are_ignored() {
        let (_root, options) = setup();
        let dir = options.root.join(&options.hooks_dir);
        write_hook(&dir, "README", false);
        write_hook(&dir, "50-run", true);

        assert_eq!(list_hooks(&dir).unwrap(), vec!["50-run"]);
    }

    #[test]
    fn test_missing_directory_has_no_hooks() {
        let root = TempDir::new().unwrap();
        assert!(list_hooks(&root.path().join("nope")).unwrap().is_empty());
    }

    #[test]
    fn test_simulate_and_no_scripts_skip_everything() {
        let (_root, mut options) = setup();
        write_hook(&options.root.join(&options.hooks_dir), "01-check", true);
        let mut runner = RecordingRunner::default();
        let mut out = Output::capture(1);

        options.simulate = true;
        run_commit_hooks(&options, &mut runner, HookKind::PostCommit, &mut out).unwrap();
        options.simulate = false;
        options.no_scripts = true;
        run_commit_hooks(&options, &mut runner, HookKind::PostCommit, &mut out).unwrap();

        assert!(runner.calls.is_empty());
        assert_eq!(out.captured(), "");
    }

    #[test]
    fn test_no_commit_hooks_only_reports() {
        let (_root, mut options) = setup();
        write_hook(&options.root.join(&options.hooks_dir), "01-check", true);
        options.no_commit_hooks = true;
        let mut runner = RecordingRunner::default();
        let mut out = Output::capture(1);

        run_commit_hooks(&options, &mut runner, HookKind::PreCommit, &mut out).unwrap();

        assert!(runner.calls.is_empty());
        assert_eq!(
            out.captured(),
            "Skipping: etc/pkgcore/commit_hooks.d/01-check pre-commit\n"
        );
    }

    #[test]
    fn test_failing_pre_commit_hook_stops_the_rest() {
        let (_root, options) = setup();
        let dir = options.root.join(&options.hooks_dir);
        write_hook(&dir, "01-fail", true);
        write_hook(&dir, "02-never", true);
        let mut runner = RecordingRunner {
            fail: Some("01-fail".to_string()),
            ..RecordingRunner::default()
        };
        let mut out = Output::capture(1);

        let failed = run_commit_hooks(&options, &mut runner, HookKind::PreCommit, &mut out);
        assert_eq!(failed, Err("etc/pkgcore/commit_hooks.d/01-fail".to_string()));
        assert_eq!(runner.calls.len(), 1);

        let failed = run_commit_hooks(&options, &mut runner, HookKind::PostCommit, &mut out);
        assert!(failed.is_err());
        assert_eq!(runner.calls.len(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_process_runner_reports_exit_status() {
        let root = TempDir::new().unwrap();
        let ok = root.path().join("ok");
        let bad = root.path().join("bad");
        fs::write(&ok, "#!/bin/sh\n[ \"$1\" = pre-commit ]\n").unwrap();
        fs::write(&bad, "#!/bin/sh\nexit 3\n").unwrap();
        for path in [&ok, &bad] {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
        }

        let mut runner = ProcessRunner::new(root.path());
        assert!(runner.run_hook(&ok, HookKind::PreCommit).is_ok());
        assert!(runner.run_hook(&ok, HookKind::PostCommit).is_err());
        assert!(matches!(
            runner.run_hook(&bad, HookKind::PreCommit),
            Err(Error::ScriptFailed(_))
        ));
    }
}
