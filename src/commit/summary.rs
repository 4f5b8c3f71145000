// src/commit/summary.rs

//! User-facing commit text: change lines, the confirmation listing and the
//! final status line

use super::CommitOptions;
use crate::changeset::{Change, ChangeKind, Changeset, Totals};
use crate::graph::PackageDb;
use crate::output::{Output, human_size};

const MIB: i64 = 1024 * 1024;

/// `(i/N) Upgrading name@tag (old -> new)`
///
/// `index` is zero-based; the counter is padded to `width` digits.
pub fn change_line(
    db: &PackageDb,
    change: &Change,
    kind: ChangeKind,
    index: u64,
    total: u64,
    width: usize,
) -> String {
    let Some(pkg) = change.pkg() else {
        return String::new();
    };
    let tag = db
        .repo_tags
        .get(change.new_repository_tag)
        .map_or("", |t| t.tag.as_str());
    let versions = match (kind.shows_transition(), change.old_pkg, change.new_pkg) {
        (true, Some(old), Some(new)) => format!(
            "{} -> {}",
            db.package(old).version,
            db.package(new).version
        ),
        _ => db.package(pkg).version.to_string(),
    };
    format!(
        "({:>width$}/{}) {} {}{} ({})",
        index + 1,
        total,
        kind.message(),
        db.pkg_name(pkg),
        tag,
        versions,
        width = width
    )
}

fn dump_group(
    out: &mut Output,
    db: &PackageDb,
    sorted: &[&Change],
    heading: &str,
    select: impl Fn(&Change) -> bool,
) -> usize {
    let mut matched = 0;
    let mut indent = out.indent(false);
    for change in sorted.iter().filter(|c| select(c)) {
        if matched == 0 {
            indent.group(2, &format!("{}:\n", heading));
        }
        if let Some(pkg) = change.pkg() {
            indent.item(db.pkg_name(pkg));
        }
        matched += 1;
    }
    indent.end();
    matched
}

/// List what the commit will do, grouped and sorted by name
///
/// Removals and downgrades are always listed. Everything else is listed only
/// when one of those was, or when interactive or very verbose. Returns the
/// number of listed entries.
pub fn show_changes(
    db: &PackageDb,
    changeset: &Changeset,
    totals: &Totals,
    options: &CommitOptions,
    out: &mut Output,
) -> usize {
    let sorted = changeset.sorted_for_display(db);

    let mut shown = dump_group(out, db, &sorted, "The following packages will be REMOVED", |c| {
        c.is_removal()
    });
    shown += dump_group(out, db, &sorted, "The following packages will be DOWNGRADED", |c| {
        c.is_downgrade(db)
    });
    if shown == 0 && !options.interactive && options.verbosity <= 2 {
        return shown;
    }

    shown += dump_group(out, db, &sorted, "The following NEW packages will be installed", |c| {
        c.is_new()
    });
    shown += dump_group(out, db, &sorted, "The following packages will be upgraded", |c| {
        c.is_upgrade(db)
    });
    shown += dump_group(out, db, &sorted, "The following packages will be reinstalled", |c| {
        c.reinstall
    });

    if totals.download_size > 0 {
        let (size, unit) = human_size(totals.download_size);
        out.msg(&format!("Need to download {} {} of packages.", size, unit));
    }
    let (size, unit) = human_size(totals.size_diff.unsigned_abs());
    let effect = if totals.size_diff < 0 {
        "disk space will be freed"
    } else {
        "additional disk space will be used"
    };
    out.msg(&format!("After this operation, {} {} of {}.", size, unit, effect));
    shown
}

/// Final status line: `OK: 12 MiB in 40 packages`
///
/// Under simulation the installed totals are adjusted by the changes that
/// would have been applied.
pub fn summary_line(db: &PackageDb, totals: &Totals, errors: u32, options: &CommitOptions) -> String {
    let status = match errors {
        0 => "OK:".to_string(),
        1 => "1 error;".to_string(),
        n => format!("{} errors;", n),
    };

    let mut bytes = db.installed.bytes as i64;
    let mut packages = db.installed.packages as i64;
    if options.simulate {
        bytes += totals.size_diff;
        packages += totals.pkg_diff;
    }
    let mib = bytes.max(0) / MIB;

    if options.verbosity > 1 {
        format!(
            "{} {} packages, {} dirs, {} files, {} MiB",
            status, packages, db.installed.dirs, db.installed.files, mib
        )
    } else {
        format!("{} {} MiB in {} packages", status, mib, packages)
    }
}
