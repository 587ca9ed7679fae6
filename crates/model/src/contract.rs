//! Contracts the transfer engine is composed from.
//!
//! A transfer run wires one [`SourceCursor`] to one [`TargetSink`] and an
//! optional [`ProgressObserver`]. The orchestrator pulls one item, pushes
//! one item, inspects the outcome, and repeats; no operation on these
//! traits is ever issued concurrently within one run.

use crate::error::Result;
use crate::item::ContentItem;
use crate::outcome::WriteOutcome;
use crate::path::RepoPath;
use crate::state::TransferState;
use crate::task::TransferTask;

/// Lazy, restartable-per-subtree, pre-order source of content items.
///
/// `content`/`relative_path` are valid only immediately after a read call
/// returned `true`.
#[allow(async_fn_in_trait)]
pub trait SourceCursor {
    /// Advances to the next item in global pre-order over the configured
    /// root, skipping any path under an excluded subtree. Returns `false`
    /// once the traversal is exhausted; callable repeatedly to drive a
    /// `while read_all()` loop.
    async fn read_all(&mut self, excluded: &[RepoPath]) -> Result<bool>;

    /// Advances an independent, per-path cursor over the named subtree.
    ///
    /// Each distinct `subtree` argument keeps its own traversal state
    /// across calls, so multiple named subtrees can be drained in sequence
    /// without interfering with each other or with [`read_all`](Self::read_all).
    async fn read_subtree(&mut self, subtree: &RepoPath) -> Result<bool>;

    /// Marks `path` as cut off: no cursor of this source descends into it
    /// again for the rest of the run. The node itself, if currently
    /// positioned, is still reported once more. Idempotent.
    fn skip_subtree(&mut self, path: &RepoPath);

    /// Switches the cursor into replay mode over `tasks`, in order.
    fn set_reference_update_tasks(&mut self, tasks: Vec<TransferTask>);

    /// Advances the replay-mode cursor, fetching (by exact path, on
    /// demand) only the fields named in the current task's
    /// broken-reference list plus identity fields.
    async fn read_by_reference_update_tasks(&mut self) -> Result<bool>;

    /// The currently-positioned item.
    fn content(&self) -> Option<&ContentItem>;

    /// Mutable access to the current item; exists so the orchestrator can
    /// apply a configured root rename before writing.
    fn content_mut(&mut self) -> Option<&mut ContentItem>;

    /// Path of the current item relative to the read root.
    fn relative_path(&self) -> Option<&RepoPath>;

    /// Best-effort total used only for progress percentage; may be
    /// computed in the background and need not be exact.
    fn estimated_count(&self) -> u64;
}

/// What a sink does when the target artifact already exists.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum OverwritePolicy {
    /// Overwrite existing artifacts; the outcome reports `Updated`.
    #[default]
    Always,
    /// Leave existing artifacts untouched; the outcome reports `Skipped`.
    SkipExisting,
}

/// Destination accepting `(path, item)` pairs.
#[allow(async_fn_in_trait)]
pub trait TargetSink {
    /// Target container everything is written underneath.
    fn container_path(&self) -> &RepoPath;

    /// Optional rename applied to every written root item: both the
    /// item's display name and its path segment.
    fn root_name(&self) -> Option<&str>;

    /// Persists `item` at `path` (relative to
    /// [`container_path`](Self::container_path)), uploading attachments
    /// after the item's own metadata is accepted. A
    /// [`MissingParent`](crate::WriteAction::MissingParent) outcome is a
    /// signal, not necessarily a terminal error for the caller.
    async fn write(&mut self, path: &RepoPath, item: &ContentItem) -> Result<WriteOutcome>;

    /// Queried after a `Failed` outcome: does the failure invalidate the
    /// whole subtree (e.g. the container itself could never be created),
    /// as opposed to a recoverable single-item failure?
    async fn should_skip_subtree(&mut self, path: &RepoPath) -> Result<bool>;
}

/// Sink accepting one [`TransferState`] per processed item.
///
/// Implementations must not block the orchestrator indefinitely; anything
/// slow should buffer internally or fire and forget.
pub trait ProgressObserver {
    /// Handles a new progress snapshot.
    fn on_progress(&mut self, state: &TransferState);
}

impl<F> ProgressObserver for F
where
    F: FnMut(&TransferState),
{
    fn on_progress(&mut self, state: &TransferState) {
        self(state);
    }
}

/// Observer that discards every snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn on_progress(&mut self, _state: &TransferState) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{WriteAction, WriteOutcome};
    use crate::state::BatchAction;

    #[test]
    fn closures_are_observers() {
        let mut seen = 0u32;
        {
            let mut observer = |_state: &TransferState| seen += 1;
            let state = TransferState {
                batch_action: BatchAction::Contents,
                current_count: 1,
                total_estimate: 0,
                error_count: 0,
                updating_references: false,
                outcome: WriteOutcome::new(WriteAction::Created, RepoPath::new("a")),
            };
            observer.on_progress(&state);
            observer.on_progress(&state);
        }
        assert_eq!(seen, 2);
    }
}
