// src/changeset.rs

//! Changesets: the ordered per-name transitions a commit applies
//!
//! A [`Changeset`] is produced by the solver and consumed by the commit
//! engine. It borrows package handles from the [`PackageDb`] and never owns
//! graph records.

use crate::error::{Error, Result};
use crate::graph::name::cmp_display;
use crate::graph::repository::DEFAULT_TAG;
use crate::graph::{NameId, PackageDb, PackageId, TagId};
use std::cmp::Ordering;
use std::collections::HashSet;

/// Transition of one name from `old_pkg` to `new_pkg`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub old_pkg: Option<PackageId>,
    pub new_pkg: Option<PackageId>,
    pub old_repository_tag: TagId,
    pub new_repository_tag: TagId,
    pub reinstall: bool,
}

impl Change {
    pub fn install(pkg: PackageId) -> Self {
        Self {
            old_pkg: None,
            new_pkg: Some(pkg),
            old_repository_tag: DEFAULT_TAG,
            new_repository_tag: DEFAULT_TAG,
            reinstall: false,
        }
    }

    pub fn purge(pkg: PackageId) -> Self {
        Self {
            old_pkg: Some(pkg),
            new_pkg: None,
            ..Self::install(pkg)
        }
    }

    /// Replace `old` by `new`; covers upgrades, downgrades and rebuilds
    pub fn replace(old: PackageId, new: PackageId) -> Self {
        Self {
            old_pkg: Some(old),
            ..Self::install(new)
        }
    }

    pub fn reinstall(pkg: PackageId) -> Self {
        Self {
            reinstall: true,
            ..Self::replace(pkg, pkg)
        }
    }

    /// Keep `pkg` but move it to another pinning tag
    pub fn repin(pkg: PackageId, old_tag: TagId, new_tag: TagId) -> Self {
        Self {
            old_repository_tag: old_tag,
            new_repository_tag: new_tag,
            ..Self::replace(pkg, pkg)
        }
    }

    pub fn with_tags(mut self, old_tag: TagId, new_tag: TagId) -> Self {
        self.old_repository_tag = old_tag;
        self.new_repository_tag = new_tag;
        self
    }

    /// The package whose name identifies this change
    pub fn pkg(&self) -> Option<PackageId> {
        self.new_pkg.or(self.old_pkg)
    }

    pub fn name(&self, db: &PackageDb) -> Option<NameId> {
        self.pkg().map(|p| db.package(p).name)
    }

    /// Nothing to do: same package, same pin, no reinstall
    pub fn is_noop(&self) -> bool {
        self.old_pkg == self.new_pkg
            && !self.reinstall
            && self.old_repository_tag == self.new_repository_tag
    }

    pub fn is_removal(&self) -> bool {
        self.new_pkg.is_none()
    }

    pub fn is_new(&self) -> bool {
        self.old_pkg.is_none()
    }

    pub fn is_downgrade(&self, db: &PackageDb) -> bool {
        match (self.old_pkg, self.new_pkg) {
            (Some(old), Some(new)) => db.pkg_version_compare(new, old) == Ordering::Less,
            _ => false,
        }
    }

    /// Newer version, or a different build of the same version
    pub fn is_upgrade(&self, db: &PackageDb) -> bool {
        match (self.old_pkg, self.new_pkg) {
            (Some(old), Some(new)) => {
                old != new && db.pkg_version_compare(new, old) != Ordering::Less
            }
            _ => false,
        }
    }
}

/// What applying a change does, as shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Install,
    Purge,
    Reinstall { available: bool },
    Repin,
    Downgrade,
    Replace,
    Upgrade,
}

impl ChangeKind {
    pub fn message(self) -> &'static str {
        match self {
            ChangeKind::Install => "Installing",
            ChangeKind::Purge => "Purging",
            ChangeKind::Reinstall { available: true } => "Reinstalling",
            ChangeKind::Reinstall { available: false } => "[unavailable, skipped] Reinstalling",
            ChangeKind::Repin => "Updating pinning",
            ChangeKind::Downgrade => "Downgrading",
            ChangeKind::Replace => "Replacing",
            ChangeKind::Upgrade => "Upgrading",
        }
    }

    /// Kinds that show both the old and the new version
    pub fn shows_transition(self) -> bool {
        matches!(
            self,
            ChangeKind::Downgrade | ChangeKind::Replace | ChangeKind::Upgrade
        )
    }
}

/// Classify a change; `None` means there is nothing to report or apply
pub fn classify(db: &PackageDb, change: &Change) -> Option<ChangeKind> {
    match (change.old_pkg, change.new_pkg) {
        (None, None) => None,
        (None, Some(_)) => Some(ChangeKind::Install),
        (Some(_), None) => Some(ChangeKind::Purge),
        (Some(old), Some(new)) if old == new => {
            if change.reinstall {
                Some(ChangeKind::Reinstall {
                    available: db.pkg_available(new),
                })
            } else if change.old_repository_tag != change.new_repository_tag {
                Some(ChangeKind::Repin)
            } else {
                None
            }
        }
        (Some(old), Some(new)) => Some(match db.pkg_version_compare(new, old) {
            Ordering::Less => ChangeKind::Downgrade,
            Ordering::Equal => ChangeKind::Replace,
            Ordering::Greater => ChangeKind::Upgrade,
        }),
    }
}

/// Work counters: installed bytes, package operations, changes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub bytes: u64,
    pub packages: u64,
    pub changes: u64,
}

impl Stats {
    /// Account for one change
    pub fn count(&mut self, db: &PackageDb, change: &Change) {
        if change.new_pkg != change.old_pkg || change.reinstall {
            if let Some(new) = change.new_pkg {
                self.bytes += db.package(new).installed_size;
                self.packages += 1;
            }
            if change.old_pkg.is_some() {
                self.packages += 1;
            }
            self.changes += 1;
        } else if change.new_repository_tag != change.old_repository_tag {
            self.packages += 1;
            self.changes += 1;
        }
    }

    /// The progress measure: bytes plus package operations
    pub fn weight(&self) -> u64 {
        self.bytes + self.packages
    }
}

/// Everything the aggregate pass computes before anything is applied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub stats: Stats,
    /// Installed size after minus installed size before
    pub size_diff: i64,
    /// Installed package count after minus before
    pub pkg_diff: i64,
    /// Bytes to fetch from repositories that are not local
    pub download_size: u64,
    pub packages_gained: u64,
    pub packages_lost: u64,
}

/// Ordered changes, at most one per name
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    changes: Vec<Change>,
    names: HashSet<NameId>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_changes(db: &PackageDb, changes: impl IntoIterator<Item = Change>) -> Result<Self> {
        let mut changeset = Self::new();
        for change in changes {
            changeset.push(db, change)?;
        }
        Ok(changeset)
    }

    /// Append a change, rejecting empty changes and duplicate names
    pub fn push(&mut self, db: &PackageDb, change: Change) -> Result<()> {
        let name = change
            .name(db)
            .ok_or_else(|| Error::InvalidChangeset("change without old or new package".to_string()))?;
        if !self.names.insert(name) {
            return Err(Error::InvalidChangeset(format!(
                "more than one change for '{}'",
                db.name(name).name
            )));
        }
        self.changes.push(change);
        Ok(())
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Change> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Fold every change into the pre-apply totals
    pub fn totals(&self, db: &PackageDb) -> Totals {
        let mut totals = Totals::default();
        for change in &self.changes {
            totals.stats.count(db, change);
            if let Some(new) = change.new_pkg {
                let pkg = db.package(new);
                totals.size_diff += pkg.installed_size as i64;
                totals.pkg_diff += 1;
                if change.new_pkg != change.old_pkg {
                    totals.packages_gained += 1;
                    if pkg.repos & db.local_repos == 0 {
                        totals.download_size += pkg.size;
                    }
                }
            }
            if let Some(old) = change.old_pkg {
                totals.size_diff -= db.package(old).installed_size as i64;
                totals.pkg_diff -= 1;
                totals.packages_lost += 1;
            }
        }
        totals
    }

    /// Changes in display order: case-insensitive by name, then case-sensitive
    ///
    /// The sort is stable, so changes with equal names keep solver order.
    pub fn sorted_for_display(&self, db: &PackageDb) -> Vec<&Change> {
        let mut sorted: Vec<&Change> = self.changes.iter().collect();
        let key = |c: &Change| c.old_pkg.or(c.new_pkg).map(|p| db.pkg_name(p).to_string());
        sorted.sort_by(|a, b| match (key(a), key(b)) {
            (Some(a), Some(b)) => cmp_display(&a, &b),
            _ => Ordering::Equal,
        });
        sorted
    }
}

impl<'a> IntoIterator for &'a Changeset {
    type Item = &'a Change;
    type IntoIter = std::slice::Iter<'a, Change>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PackageTemplate;

    fn pkg(db: &mut PackageDb, name: &str, version: &str, size: u64) -> PackageId {
        db.add_package(PackageTemplate::new(name, version).sizes(size, size / 2).repo(1))
            .unwrap()
    }

    #[test]
    fn test_classify_every_kind() {
        let mut db = PackageDb::new();
        let repo = db.add_repository("https://mirror.example.org/main", None).unwrap();
        assert_eq!(repo, 1);
        let a1 = pkg(&mut db, "a", "1.0", 10);
        let a2 = pkg(&mut db, "a", "2.0", 10);
        let a2b = db
            .add_package(PackageTemplate::new("a", "2.0").sizes(11, 5).repo(1))
            .unwrap();
        let gone = db.add_package(PackageTemplate::new("gone", "1.0")).unwrap();

        let kind = |c: Change| classify(&db, &c);
        assert_eq!(kind(Change::install(a1)), Some(ChangeKind::Install));
        assert_eq!(kind(Change::purge(a1)), Some(ChangeKind::Purge));
        assert_eq!(kind(Change::replace(a1, a2)), Some(ChangeKind::Upgrade));
        assert_eq!(kind(Change::replace(a2, a1)), Some(ChangeKind::Downgrade));
        assert_eq!(kind(Change::replace(a2, a2b)), Some(ChangeKind::Replace));
        assert_eq!(kind(Change::repin(a1, 0, 1)), Some(ChangeKind::Repin));
        assert_eq!(
            kind(Change::reinstall(a1)),
            Some(ChangeKind::Reinstall { available: true })
        );
        assert_eq!(
            kind(Change::reinstall(gone)),
            Some(ChangeKind::Reinstall { available: false })
        );
        assert_eq!(kind(Change::replace(a1, a1)), None);
    }

    #[test]
    fn test_classify_is_pure() {
        let mut db = PackageDb::new();
        let a1 = pkg(&mut db, "a", "1.0", 10);
        let a2 = pkg(&mut db, "a", "1.1", 10);
        let change = Change::replace(a1, a2);
        let first = classify(&db, &change);
        for _ in 0..3 {
            assert_eq!(classify(&db, &change), first);
        }
    }

    #[test]
    fn test_install_and_purge_totals() {
        let mut db = PackageDb::new();
        let new = pkg(&mut db, "pkg", "1.0", 3000);
        let old = pkg(&mut db, "old", "2.0", 1000);
        let changeset =
            Changeset::from_changes(&db, [Change::install(new), Change::purge(old)]).unwrap();

        let totals = changeset.totals(&db);
        assert_eq!(totals.packages_gained, 1);
        assert_eq!(totals.packages_lost, 1);
        assert_eq!(totals.stats.changes, 2);
        assert_eq!(totals.stats.packages, 2);
        assert_eq!(totals.stats.bytes, 3000);
        assert_eq!(totals.size_diff, 2000);
        assert_eq!(totals.pkg_diff, 0);
        assert_eq!(totals.download_size, 1500);
    }

    #[test]
    fn test_local_packages_need_no_download() {
        let mut db = PackageDb::new();
        let local = db.add_repository("/srv/packages", None).unwrap();
        let p = db
            .add_package(PackageTemplate::new("p", "1.0").sizes(10, 7).repo(local))
            .unwrap();
        let changeset = Changeset::from_changes(&db, [Change::install(p)]).unwrap();
        assert_eq!(changeset.totals(&db).download_size, 0);
    }

    #[test]
    fn test_repin_counts_as_change() {
        let mut db = PackageDb::new();
        let a = pkg(&mut db, "a", "1.0", 10);
        let mut stats = Stats::default();
        stats.count(&db, &Change::repin(a, 0, 1));
        assert_eq!(stats, Stats { bytes: 0, packages: 1, changes: 1 });

        stats.count(&db, &Change::replace(a, a));
        assert_eq!(stats.changes, 1);
    }

    #[test]
    fn test_push_rejects_invalid_changes() {
        let mut db = PackageDb::new();
        let a = pkg(&mut db, "a", "1.0", 10);
        let a2 = pkg(&mut db, "a", "2.0", 10);
        let mut changeset = Changeset::new();

        let empty = Change {
            old_pkg: None,
            new_pkg: None,
            ..Change::install(a)
        };
        assert!(matches!(
            changeset.push(&db, empty),
            Err(Error::InvalidChangeset(_))
        ));

        changeset.push(&db, Change::install(a)).unwrap();
        assert!(matches!(
            changeset.push(&db, Change::replace(a, a2)),
            Err(Error::InvalidChangeset(_))
        ));
        assert_eq!(changeset.len(), 1);
    }

    #[test]
    fn test_display_order_is_case_insensitive_first() {
        let mut db = PackageDb::new();
        let bzip2 = pkg(&mut db, "Bzip2", "1.0", 1);
        let apk = pkg(&mut db, "apk", "1.0", 1);
        let zlib = pkg(&mut db, "Zlib", "1.0", 1);
        let changeset = Changeset::from_changes(
            &db,
            [Change::install(zlib), Change::install(apk), Change::install(bzip2)],
        )
        .unwrap();

        let order: Vec<_> = changeset
            .sorted_for_display(&db)
            .iter()
            .map(|c| db.pkg_name(c.pkg().unwrap()).to_string())
            .collect();
        assert_eq!(order, vec!["apk", "Bzip2", "Zlib"]);
        // Solver order is untouched
        assert_eq!(changeset.changes()[0].new_pkg, Some(zlib));
    }
}
