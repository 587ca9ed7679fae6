//! Durable, replayable record of a deferred reference fixup.

use serde::{Deserialize, Serialize};

use crate::outcome::WriteOutcome;
use crate::path::RepoPath;

/// The durable form of a [`WriteOutcome`] that had `update_required`.
///
/// Created once per affected item during the main pass, persisted to the
/// ledger, never mutated after creation, and consumed exactly once in the
/// fixup pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferTask {
    /// Path of the item at the source.
    pub reader_path: RepoPath,
    /// Path of the item at the target.
    pub writer_path: RepoPath,
    /// Field names that must be rewritten once their targets exist.
    pub broken_references: Vec<String>,
    /// Whether the permission descriptor must be re-applied.
    pub retry_permissions: bool,
}

impl TransferTask {
    /// Derives a task from an outcome with `update_required() == true`.
    ///
    /// Returns `None` when no fixup is needed.
    #[must_use]
    pub fn from_outcome(outcome: &WriteOutcome) -> Option<Self> {
        if !outcome.update_required() {
            return None;
        }
        Some(Self {
            reader_path: outcome.reader_path.clone(),
            writer_path: outcome.writer_path.clone(),
            broken_references: outcome.broken_references.clone(),
            retry_permissions: outcome.retry_permissions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::WriteAction;

    #[test]
    fn complete_outcomes_produce_no_task() {
        let outcome = WriteOutcome::new(WriteAction::Created, RepoPath::new("a"));
        assert!(TransferTask::from_outcome(&outcome).is_none());
    }

    #[test]
    fn deferred_outcomes_round_trip_into_tasks() {
        let mut outcome = WriteOutcome::new(WriteAction::Creating, RepoPath::new("Root/a"));
        outcome.reader_path = RepoPath::new("a");
        outcome.broken_references = vec!["Manager".into(), "Members".into()];
        let task = TransferTask::from_outcome(&outcome).expect("task");
        assert_eq!(task.reader_path, RepoPath::new("a"));
        assert_eq!(task.writer_path, RepoPath::new("Root/a"));
        assert_eq!(task.broken_references.len(), 2);
        assert!(!task.retry_permissions);
    }

    #[test]
    fn tasks_serialize_as_json_lines() {
        let task = TransferTask {
            reader_path: RepoPath::new("a/b"),
            writer_path: RepoPath::new("Root/a/b"),
            broken_references: vec!["Manager".into()],
            retry_permissions: true,
        };
        let line = serde_json::to_string(&task).expect("serialize");
        let parsed: TransferTask = serde_json::from_str(&line).expect("parse");
        assert_eq!(parsed, task);
    }
}
