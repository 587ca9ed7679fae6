//! Slash-separated, root-relative content paths.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a content item within one transfer run.
///
/// A `RepoPath` is a slash-separated path relative to the configured read
/// root. The root itself is the empty path. Paths never start or end with
/// a slash and never contain empty segments.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepoPath(String);

impl RepoPath {
    /// The empty path identifying the traversal root.
    #[must_use]
    pub const fn root() -> Self {
        Self(String::new())
    }

    /// Builds a path from a slash-separated string, normalising redundant
    /// separators.
    #[must_use]
    pub fn new<S: AsRef<str>>(raw: S) -> Self {
        let joined = raw
            .as_ref()
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(joined)
    }

    /// Returns the underlying slash-separated representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reports whether this is the root (empty) path.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Appends a single segment, returning the child path.
    #[must_use]
    pub fn join(&self, segment: &str) -> Self {
        if self.0.is_empty() {
            Self::new(segment)
        } else if segment.is_empty() {
            self.clone()
        } else {
            Self(format!("{}/{}", self.0, segment.trim_matches('/')))
        }
    }

    /// Returns the parent path, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(index) => Some(Self(self.0[..index].to_string())),
            None => Some(Self::root()),
        }
    }

    /// Returns the final path segment, or `None` for the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            Some(self.0.rsplit('/').next().unwrap_or(&self.0))
        }
    }

    /// Returns the number of segments (the root has depth `0`).
    #[must_use]
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.0.split('/').count()
        }
    }

    /// Iterates over the path segments from the root downwards.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Reports whether `self` equals `prefix` or lies underneath it.
    ///
    /// The comparison is segment-aware: `a/bc` is not under `a/b`.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        if prefix.is_root() {
            return true;
        }
        if self.0 == prefix.0 {
            return true;
        }
        self.0.len() > prefix.0.len()
            && self.0.starts_with(&prefix.0)
            && self.0.as_bytes()[prefix.0.len()] == b'/'
    }

    /// Reports whether `self` is a strict descendant of `prefix`.
    #[must_use]
    pub fn is_under(&self, prefix: &Self) -> bool {
        self != prefix && self.starts_with(prefix)
    }

    /// Strips a leading `prefix`, returning the remainder relative to it.
    ///
    /// Returns `None` when `self` is not equal to or under `prefix`.
    #[must_use]
    pub fn strip_prefix(&self, prefix: &Self) -> Option<Self> {
        if !self.starts_with(prefix) {
            return None;
        }
        if prefix.is_root() {
            return Some(self.clone());
        }
        if self == prefix {
            return Some(Self::root());
        }
        Some(Self(self.0[prefix.0.len() + 1..].to_string()))
    }

    /// Joins another relative path below `self`.
    #[must_use]
    pub fn append(&self, relative: &Self) -> Self {
        if relative.is_root() {
            self.clone()
        } else if self.is_root() {
            relative.clone()
        } else {
            Self(format!("{}/{}", self.0, relative.0))
        }
    }
}

impl fmt::Display for RepoPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            write!(f, "/{}", self.0)
        }
    }
}

impl From<&str> for RepoPath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for RepoPath {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalises_separators() {
        assert_eq!(RepoPath::new("/a//b/").as_str(), "a/b");
        assert_eq!(RepoPath::new("").as_str(), "");
    }

    #[test]
    fn join_and_parent_are_inverse() {
        let root = RepoPath::root();
        let child = root.join("Root").join("F1");
        assert_eq!(child.as_str(), "Root/F1");
        assert_eq!(child.parent(), Some(RepoPath::new("Root")));
        assert_eq!(RepoPath::new("Root").parent(), Some(RepoPath::root()));
        assert_eq!(RepoPath::root().parent(), None);
    }

    #[test]
    fn name_returns_final_segment() {
        assert_eq!(RepoPath::new("Root/F1/File1").name(), Some("File1"));
        assert_eq!(RepoPath::root().name(), None);
    }

    #[test]
    fn starts_with_is_segment_aware() {
        let prefix = RepoPath::new("a/b");
        assert!(RepoPath::new("a/b").starts_with(&prefix));
        assert!(RepoPath::new("a/b/c").starts_with(&prefix));
        assert!(!RepoPath::new("a/bc").starts_with(&prefix));
        assert!(RepoPath::new("anything").starts_with(&RepoPath::root()));
    }

    #[test]
    fn is_under_excludes_the_prefix_itself() {
        let prefix = RepoPath::new("a/b");
        assert!(!RepoPath::new("a/b").is_under(&prefix));
        assert!(RepoPath::new("a/b/c").is_under(&prefix));
    }

    #[test]
    fn strip_prefix_yields_relative_remainder() {
        let prefix = RepoPath::new("System/Schema");
        let path = RepoPath::new("System/Schema/ContentTypes/File");
        assert_eq!(
            path.strip_prefix(&prefix),
            Some(RepoPath::new("ContentTypes/File"))
        );
        assert_eq!(prefix.strip_prefix(&prefix), Some(RepoPath::root()));
        assert_eq!(RepoPath::new("Other").strip_prefix(&prefix), None);
    }

    #[test]
    fn display_is_rooted() {
        assert_eq!(RepoPath::root().to_string(), "/");
        assert_eq!(RepoPath::new("Root/F1").to_string(), "/Root/F1");
    }

    #[test]
    fn depth_counts_segments() {
        assert_eq!(RepoPath::root().depth(), 0);
        assert_eq!(RepoPath::new("a/b/c").depth(), 3);
    }
}
