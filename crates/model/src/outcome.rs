//! Per-item result classification returned by a target sink.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::path::RepoPath;

/// What happened to a single item at the target.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum WriteAction {
    /// Item was created and is complete.
    Created,
    /// Item was created, but a later reference fixup is required.
    Creating,
    /// Item existed and was updated; now complete.
    Updated,
    /// Item existed and was updated, but a later fixup is required.
    Updating,
    /// The item's parent does not yet exist at the target.
    MissingParent,
    /// The write was rejected.
    Failed,
    /// The sink declined to write the item (policy decision).
    Skipped,
    /// The item was under a cutoff; no sink call was made.
    CutOff,
    /// No classification available.
    #[default]
    Unknown,
}

impl WriteAction {
    /// Reports whether the action counts towards the run's error total.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Failed | Self::MissingParent)
    }

    /// Maps a completed action onto its "fixup still required" variant.
    #[must_use]
    pub const fn deferred(self) -> Self {
        match self {
            Self::Created => Self::Creating,
            Self::Updated => Self::Updating,
            other => other,
        }
    }
}

impl fmt::Display for WriteAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Created => "Created",
            Self::Creating => "Creating",
            Self::Updated => "Updated",
            Self::Updating => "Updating",
            Self::MissingParent => "MissingParent",
            Self::Failed => "Failed",
            Self::Skipped => "Skipped",
            Self::CutOff => "CutOff",
            Self::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

/// Result of writing one item to the target.
#[derive(Clone, Debug, Default)]
pub struct WriteOutcome {
    /// Classification of the write.
    pub action: WriteAction,
    /// Path of the item at the source.
    pub reader_path: RepoPath,
    /// Path of the item at the target.
    pub writer_path: RepoPath,
    /// Field names whose reference target could not be resolved yet.
    pub broken_references: Vec<String>,
    /// Whether the permission descriptor must be re-applied later.
    pub retry_permissions: bool,
    /// Human-readable diagnostics gathered during the write.
    pub messages: Vec<String>,
}

impl WriteOutcome {
    /// Creates an outcome for `action` at `writer_path`.
    #[must_use]
    pub fn new(action: WriteAction, writer_path: RepoPath) -> Self {
        Self {
            action,
            writer_path,
            ..Self::default()
        }
    }

    /// Creates a synthetic outcome for an item suppressed by a cutoff.
    #[must_use]
    pub fn cut_off(reader_path: RepoPath, writer_path: RepoPath) -> Self {
        Self {
            action: WriteAction::CutOff,
            reader_path,
            writer_path,
            ..Self::default()
        }
    }

    /// Creates a failed outcome carrying a single diagnostic message.
    #[must_use]
    pub fn failed(writer_path: RepoPath, message: String) -> Self {
        Self {
            action: WriteAction::Failed,
            writer_path,
            messages: vec![message],
            ..Self::default()
        }
    }

    /// Whether a corrective second write is needed once the whole tree
    /// exists at the target.
    #[must_use]
    pub fn update_required(&self) -> bool {
        !self.broken_references.is_empty() || self.retry_permissions
    }
}
