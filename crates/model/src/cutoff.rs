//! Append-only set of paths below which traversal is suppressed.

use crate::path::RepoPath;

/// Accumulating set of cutoff paths with segment-prefix matching.
///
/// Once a path is inserted, the path and everything underneath it are
/// permanently suppressed for the remainder of the run. Entries are never
/// removed by callers; [`prune_before`](Self::prune_before) exists purely
/// as an optimization for paginated cursors that have sorted past an
/// entry's position.
#[derive(Clone, Debug, Default)]
pub struct CutoffSet {
    entries: Vec<RepoPath>,
}

impl CutoffSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `path` as a cutoff.
    ///
    /// Idempotent; a path already covered by a broader cutoff is a no-op.
    pub fn insert(&mut self, path: RepoPath) {
        if self.is_under_any(&path) || self.entries.contains(&path) {
            return;
        }
        // Narrower entries the new cutoff covers become redundant.
        self.entries.retain(|entry| !entry.is_under(&path));
        self.entries.push(path);
    }

    /// Reports whether `path` equals or lies underneath any cutoff.
    #[must_use]
    pub fn is_under_any(&self, path: &RepoPath) -> bool {
        self.entries.iter().any(|entry| path.starts_with(entry))
    }

    /// Reports whether `path` is a strict descendant of any cutoff.
    #[must_use]
    pub fn is_strictly_under_any(&self, path: &RepoPath) -> bool {
        self.entries.iter().any(|entry| path.is_under(entry))
    }

    /// Reports whether `path` itself is a cutoff entry.
    #[must_use]
    pub fn contains(&self, path: &RepoPath) -> bool {
        self.entries.contains(path)
    }

    /// Returns the current entries.
    #[must_use]
    pub fn entries(&self) -> &[RepoPath] {
        &self.entries
    }

    /// Reports whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops entries that sort strictly before `position` and are not its
    /// ancestors. A keyset-paginated traversal has permanently moved past
    /// such entries, so they can no longer match.
    pub fn prune_before(&mut self, position: &RepoPath) {
        self.entries
            .retain(|entry| entry.as_str() >= position.as_str() || position.starts_with(entry));
    }
}
