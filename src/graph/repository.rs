// src/graph/repository.rs

//! Repositories and pinning tags

/// Index of a pinning tag in the database tag table
pub type TagId = usize;

/// Tag 0: dependencies without an explicit `@tag`
pub const DEFAULT_TAG: TagId = 0;

/// Repository slot 0 holds packages only known from the local archive cache
pub const CACHE_REPOSITORY: usize = 0;

/// Upper bound on repositories and tags (each is one bit in a `u32` mask)
pub const MAX_REPOSITORIES: usize = 32;
pub const MAX_TAGS: usize = 32;

/// Pinning mask with only the default tag set
pub const DEFAULT_PINNING_MASK: u32 = 1 << DEFAULT_TAG;

/// Layer of the root filesystem
pub const LAYER_ROOT: u8 = 0;

/// A configured package source
#[derive(Debug, Clone)]
pub struct Repository {
    pub url: String,
    /// Tag this repository was declared under, if any
    pub tag: TagId,
}

impl Repository {
    /// Local repositories can be used without network access or downloads
    pub fn is_local(&self) -> bool {
        self.url.starts_with('/') || self.url.starts_with("file:")
    }
}

/// A pinning tag and the repositories it allows
#[derive(Debug, Clone)]
pub struct RepositoryTag {
    /// Tag as written in dependencies, e.g. `@testing`; empty for the default tag
    pub tag: String,
    /// Tag without the leading `@`
    pub plain_name: String,
    /// Bit mask of repositories reachable through this tag
    pub allowed_repos: u32,
}

impl RepositoryTag {
    pub(crate) fn default_tag() -> Self {
        Self {
            tag: String::new(),
            plain_name: String::new(),
            allowed_repos: 0,
        }
    }

    pub(crate) fn named(name: &str) -> Self {
        let plain = name.trim_start_matches('@');
        Self {
            tag: format!("@{}", plain),
            plain_name: plain.to_string(),
            allowed_repos: 0,
        }
    }

    /// Does `name` (with or without `@`) refer to this tag?
    pub fn matches(&self, name: &str) -> bool {
        if name.starts_with('@') {
            self.tag == name
        } else {
            self.plain_name == name
        }
    }
}

#[inline]
pub fn bit(n: usize) -> u32 {
    1u32 << n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_tag_accepts_both_spellings() {
        let tag = RepositoryTag::named("testing");
        assert_eq!(tag.tag, "@testing");
        assert!(tag.matches("@testing"));
        assert!(tag.matches("testing"));
        assert!(!tag.matches("edge"));

        let same = RepositoryTag::named("@testing");
        assert_eq!(same.plain_name, "testing");
    }

    #[test]
    fn test_local_repository_detection() {
        let local = Repository {
            url: "/var/cache/packages".to_string(),
            tag: DEFAULT_TAG,
        };
        let remote = Repository {
            url: "https://mirror.example.org/main".to_string(),
            tag: DEFAULT_TAG,
        };
        assert!(local.is_local());
        assert!(!remote.is_local());
    }
}
