// src/graph/dependency.rs

//! Dependency expressions and how they match packages
//!
//! Syntax: `[!]name[@tag][op version]`, e.g. `so:libc.musl-x86_64.so.1`,
//! `busybox>=1.36`, `!openssl<3`, `curl@edge`.

use super::name::Provider;
use super::repository::{DEFAULT_TAG, TagId};
use super::{NameId, PackageDb, PackageId};
use crate::atom::Atom;
use crate::error::{Error, Result};
use crate::version::{self, VersionOp};

/// Characters that start the operator part of a dependency
const COMPARERS: &[char] = &['<', '>', '=', '~'];

/// A constraint on a name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: NameId,
    pub version: Option<Atom>,
    pub op: VersionOp,
    /// Pinning tag, only meaningful for world dependencies
    pub repository_tag: TagId,
    /// The version did not parse; kept for reporting only
    pub broken: bool,
}

impl Dependency {
    /// Unversioned dependency on `name`
    pub fn any(name: NameId) -> Self {
        Self {
            name,
            version: None,
            op: VersionOp::ANY,
            repository_tag: DEFAULT_TAG,
            broken: false,
        }
    }

    pub fn is_conflict(&self) -> bool {
        self.op.is_conflict()
    }
}

/// How a dependency relates to a particular package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepMatch {
    /// The package has nothing to do with the dependency's name
    Irrelevant,
    Satisfies,
    Conflicts,
}

/// Textual parts of a dependency expression
#[derive(Debug, PartialEq, Eq)]
pub struct DependencySpec<'a> {
    pub name: &'a str,
    pub tag: Option<&'a str>,
    pub op: VersionOp,
    pub version: Option<&'a str>,
}

/// Split a dependency expression into its parts without touching any database
pub fn parse_spec(spec: &str) -> Result<DependencySpec<'_>> {
    let invalid = || Error::InvalidDependency(spec.to_string());

    let (conflict, rest) = match spec.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, spec),
    };

    let (name, op, version) = match rest.find(COMPARERS) {
        Some(pos) => {
            let (name, tail) = rest.split_at(pos);
            let op_len = tail
                .find(|c: char| !COMPARERS.contains(&c))
                .ok_or_else(invalid)?;
            let op = VersionOp::parse(&tail[..op_len])
                .filter(|op| !matches!(op.as_str(), "?" | ""))
                .ok_or_else(invalid)?;
            (name, op, Some(&tail[op_len..]))
        }
        None => (rest, VersionOp::ANY, None),
    };

    let (name, tag) = match name.split_once('@') {
        Some((name, tag)) if !tag.is_empty() => (name, Some(tag)),
        Some(_) => return Err(invalid()),
        None => (name, None),
    };
    if name.is_empty() {
        return Err(invalid());
    }

    let op = if conflict { op | VersionOp::CONFLICT } else { op };
    Ok(DependencySpec {
        name,
        tag,
        op,
        version,
    })
}

impl PackageDb {
    /// Parse a dependency expression, creating its name and tag if needed
    pub fn parse_dependency(&mut self, spec: &str) -> Result<Dependency> {
        let parts = parse_spec(spec)?;
        let repository_tag = match parts.tag {
            Some(tag) => self
                .get_tag_id(tag)
                .ok_or_else(|| Error::InvalidDependency(format!("{}: too many tags", spec)))?,
            None => DEFAULT_TAG,
        };
        let broken = match parts.version {
            Some(v) => !parts.op.contains(VersionOp::CHECKSUM) && !version::validate(v),
            None => false,
        };
        let name = self.lookup_or_create_name(parts.name);
        let version = parts.version.map(|v| self.atoms.intern(v));

        Ok(Dependency {
            name,
            version,
            op: parts.op,
            repository_tag,
            broken,
        })
    }

    /// Parse a whitespace-separated list of dependency expressions
    pub fn parse_dependencies(&mut self, specs: &str) -> Result<Vec<Dependency>> {
        specs
            .split_whitespace()
            .map(|spec| self.parse_dependency(spec))
            .collect()
    }

    /// Dependency pinning exactly `pkg` by checksum
    pub fn dependency_on_package(&mut self, pkg: PackageId) -> Dependency {
        let package = self.package(pkg);
        let name = package.name;
        let checksum = package.checksum();
        Dependency {
            name,
            version: Some(self.atoms.intern(&checksum)),
            op: VersionOp::CHECKSUM,
            repository_tag: DEFAULT_TAG,
            broken: false,
        }
    }

    /// Render a dependency for reports: `[!]name[op version]`
    pub fn dep_display(&self, dep: &Dependency) -> String {
        let mut out = String::new();
        if dep.is_conflict() {
            out.push('!');
        }
        out.push_str(&self.name(dep.name).name);
        if let Some(version) = &dep.version {
            out.push_str(dep.op.as_str());
            out.push_str(version);
        }
        out
    }

    /// Render a dependency in the persisted form, including its `@tag`
    pub fn dep_spec(&self, dep: &Dependency) -> String {
        let mut out = String::new();
        if dep.is_conflict() {
            out.push('!');
        }
        out.push_str(&self.name(dep.name).name);
        if dep.repository_tag != DEFAULT_TAG {
            if let Some(tag) = self.repo_tags.get(dep.repository_tag) {
                out.push_str(&tag.tag);
            }
        }
        if let Some(version) = &dep.version {
            out.push_str(dep.op.as_str());
            out.push_str(version);
        }
        out
    }

    fn dep_matches_checksum(&self, dep: &Dependency, pkg: PackageId) -> bool {
        dep.version.as_deref() == Some(self.package(pkg).checksum().as_str())
    }

    /// Does `provider` satisfy `dep`, as declared by package `deppkg`?
    ///
    /// A conflict declared by a package never excludes the package itself.
    pub fn dep_is_provided(
        &self,
        deppkg: Option<PackageId>,
        dep: &Dependency,
        provider: Option<&Provider>,
    ) -> bool {
        let Some(provider) = provider else {
            return dep.is_conflict();
        };
        if dep.is_conflict() && deppkg == Some(provider.pkg) {
            return true;
        }
        if dep.op == VersionOp::CHECKSUM {
            return self.dep_matches_checksum(dep, provider.pkg);
        }
        version::matches(provider.version.as_deref(), dep.op, dep.version.as_deref())
    }

    /// Does package `pkg` itself (not its provides) satisfy `dep`?
    pub fn dep_is_materialized(&self, dep: &Dependency, pkg: Option<PackageId>) -> bool {
        let Some(pkg) = pkg.filter(|p| self.package(*p).name == dep.name) else {
            return dep.is_conflict();
        };
        if dep.op == VersionOp::CHECKSUM {
            return self.dep_matches_checksum(dep, pkg);
        }
        version::matches(Some(&self.package(pkg).version), dep.op, dep.version.as_deref())
    }

    /// Relation between `dep` (declared by `deppkg`) and package `pkg`
    pub fn dep_analyze(
        &self,
        deppkg: Option<PackageId>,
        dep: &Dependency,
        pkg: Option<PackageId>,
    ) -> DepMatch {
        let Some(pkg) = pkg else {
            return DepMatch::Irrelevant;
        };
        let package = self.package(pkg);
        let verdict = |ok: bool| if ok { DepMatch::Satisfies } else { DepMatch::Conflicts };

        if dep.name == package.name {
            return verdict(self.dep_is_materialized(dep, Some(pkg)));
        }
        match package.provides.iter().find(|p| p.name == dep.name) {
            Some(provide) => {
                let provider = Provider {
                    pkg,
                    version: provide.version.clone(),
                };
                verdict(self.dep_is_provided(deppkg, dep, Some(&provider)))
            }
            None => DepMatch::Irrelevant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::PackageTemplate;

    #[test]
    fn test_parse_spec_forms() {
        let plain = parse_spec("busybox").unwrap();
        assert_eq!(plain.name, "busybox");
        assert_eq!(plain.op, VersionOp::ANY);
        assert!(plain.version.is_none());

        let versioned = parse_spec("!openssl<3").unwrap();
        assert_eq!(versioned.name, "openssl");
        assert!(versioned.op.is_conflict());
        assert_eq!(versioned.op.as_str(), "<");
        assert_eq!(versioned.version, Some("3"));

        let tagged = parse_spec("curl@edge>=8.0").unwrap();
        assert_eq!(tagged.name, "curl");
        assert_eq!(tagged.tag, Some("edge"));
        assert_eq!(tagged.op.as_str(), ">=");
    }

    #[test]
    fn test_parse_spec_rejects_garbage() {
        assert!(parse_spec("").is_err());
        assert!(parse_spec(">=1.0").is_err());
        assert!(parse_spec("foo>=").is_err());
        assert!(parse_spec("foo@").is_err());
        assert!(parse_spec("foo=<>~=1").is_err());
    }

    #[test]
    fn test_parse_dependency_marks_broken_versions() {
        let mut db = PackageDb::new();
        let good = db.parse_dependency("musl>=1.2.4-r0").unwrap();
        let bad = db.parse_dependency("musl>=one").unwrap();

        assert!(!good.broken);
        assert!(bad.broken);
        assert_eq!(good.name, bad.name);
    }

    #[test]
    fn test_display_and_spec() {
        let mut db = PackageDb::new();
        let dep = db.parse_dependency("!curl@edge>=8.0").unwrap();
        assert_eq!(db.dep_display(&dep), "!curl>=8.0");
        assert_eq!(db.dep_spec(&dep), "!curl@edge>=8.0");
    }

    #[test]
    fn test_analyze_against_name_and_provides() {
        let mut db = PackageDb::new();
        let pkg = db
            .add_package(PackageTemplate::new("openssl", "3.1.4-r0").provides(&["libssl=3.1.4", "ssl"]))
            .unwrap();

        let newer = db.parse_dependency("openssl>=3").unwrap();
        let older = db.parse_dependency("openssl<3").unwrap();
        let lib = db.parse_dependency("libssl>3.0").unwrap();
        let virt = db.parse_dependency("ssl").unwrap();
        let other = db.parse_dependency("zlib").unwrap();

        assert_eq!(db.dep_analyze(None, &newer, Some(pkg)), DepMatch::Satisfies);
        assert_eq!(db.dep_analyze(None, &older, Some(pkg)), DepMatch::Conflicts);
        assert_eq!(db.dep_analyze(None, &lib, Some(pkg)), DepMatch::Satisfies);
        assert_eq!(db.dep_analyze(None, &virt, Some(pkg)), DepMatch::Satisfies);
        assert_eq!(db.dep_analyze(None, &other, Some(pkg)), DepMatch::Irrelevant);
        assert_eq!(db.dep_analyze(None, &newer, None), DepMatch::Irrelevant);
    }

    #[test]
    fn test_self_conflict_is_ignored() {
        let mut db = PackageDb::new();
        let pkg = db
            .add_package(PackageTemplate::new("mdev", "1.0").provides(&["dev-manager=1.0"]).depends(&["!dev-manager"]))
            .unwrap();
        let dep = db.package(pkg).depends[0].clone();
        assert_eq!(db.dep_analyze(Some(pkg), &dep, Some(pkg)), DepMatch::Satisfies);
        assert_eq!(db.dep_analyze(None, &dep, Some(pkg)), DepMatch::Conflicts);
    }

    #[test]
    fn test_checksum_pin() {
        let mut db = PackageDb::new();
        let a = db.add_package(PackageTemplate::new("tzdata", "2024a-r0")).unwrap();
        let b = db.add_package(PackageTemplate::new("tzdata", "2024b-r0")).unwrap();
        let pin = db.dependency_on_package(a);

        assert_eq!(db.dep_analyze(None, &pin, Some(a)), DepMatch::Satisfies);
        assert_eq!(db.dep_analyze(None, &pin, Some(b)), DepMatch::Conflicts);
        assert_eq!(pin.op.as_str(), "><");
    }
}
