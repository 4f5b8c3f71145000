// src/commit/installer.rs

//! Reference installer operating on the in-memory installed state

use super::Installer;
use crate::error::Result;
use crate::graph::paths::split_path;
use crate::graph::repository::DEFAULT_TAG;
use crate::graph::{PackageDb, PackageId};
use globset::Glob;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Installer that updates installed records without touching the filesystem
///
/// Removing a package releases its files; installing one takes ownership of
/// its files and queues triggers of installed packages watching the
/// directories it touched.
#[derive(Debug, Default)]
pub struct StateInstaller;

impl StateInstaller {
    pub fn new() -> Self {
        Self
    }
}

impl Installer for StateInstaller {
    fn install(
        &mut self,
        db: &mut PackageDb,
        old: Option<PackageId>,
        new: Option<PackageId>,
        progress: &mut dyn FnMut(u64),
    ) -> Result<()> {
        let mut touched = BTreeSet::new();
        let tag = old
            .and_then(|o| db.package(o).ipkg.as_ref())
            .map(|ipkg| ipkg.repository_tag)
            .unwrap_or(DEFAULT_TAG);

        if let Some(old) = old {
            touched.extend(package_dirs(db, old));
            if db.uninstall_package(old).is_some() {
                debug!("Removed {}", db.pkg_display(old));
            }
        }

        if let Some(new) = new {
            touched.extend(package_dirs(db, new));
            db.install_package(new, tag);
            progress(db.package(new).installed_size);
            debug!("Installed {}", db.pkg_display(new));
        }

        queue_triggers(db, &touched);
        Ok(())
    }
}

fn package_dirs(db: &PackageDb, pkg: PackageId) -> Vec<String> {
    db.package(pkg)
        .files
        .iter()
        .map(|path| split_path(path).0.to_string())
        .collect()
}

/// Append `dirs` to the pending triggers of every installed package watching them
pub fn queue_triggers(db: &mut PackageDb, dirs: &BTreeSet<String>) {
    if dirs.is_empty() {
        return;
    }
    for pkg in db.installed_packages() {
        let Some(ipkg) = db.package_mut(pkg).ipkg.as_mut() else {
            continue;
        };
        for pattern in ipkg.triggers.clone() {
            let matcher = match Glob::new(pattern.trim_start_matches('/')) {
                Ok(glob) => glob.compile_matcher(),
                Err(e) => {
                    warn!("Ignoring invalid trigger pattern {}: {}", pattern, e);
                    continue;
                }
            };
            for dir in dirs {
                if matcher.is_match(dir) && !ipkg.pending_triggers.contains(dir) {
                    ipkg.pending_triggers.push(dir.clone());
                }
            }
        }
    }
}
