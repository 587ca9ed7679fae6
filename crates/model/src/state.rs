//! Progress snapshots emitted once per processed item.

use std::fmt;

use crate::outcome::WriteOutcome;

/// Label of the phase a progress snapshot belongs to.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum BatchAction {
    /// Transferring content-type definitions.
    ContentTypes,
    /// Transferring settings items.
    Settings,
    /// Transferring aspect definitions.
    Aspects,
    /// Transferring the general tree.
    #[default]
    Contents,
    /// Replaying the reference-fixup ledger.
    UpdateReferences,
}

impl fmt::Display for BatchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ContentTypes => "transfer content types",
            Self::Settings => "transfer settings",
            Self::Aspects => "transfer aspect definitions",
            Self::Contents => "transfer contents",
            Self::UpdateReferences => "update references",
        };
        f.write_str(label)
    }
}

/// Snapshot of a transfer run, emitted after every processed item.
#[derive(Clone, Debug)]
pub struct TransferState {
    /// Phase the snapshot belongs to.
    pub batch_action: BatchAction,
    /// Number of items processed so far, monotonically increasing.
    pub current_count: u64,
    /// Best-effort total used only for a progress percentage.
    pub total_estimate: u64,
    /// Number of failed or missing-parent outcomes so far.
    pub error_count: u64,
    /// Whether the run is in the reference-fixup phase.
    pub updating_references: bool,
    /// Outcome of the item this snapshot reports.
    pub outcome: WriteOutcome,
}

impl TransferState {
    /// Returns the completion percentage, clamped to `0..=100`, when a
    /// total estimate is available.
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        if self.total_estimate == 0 {
            return None;
        }
        let raw = self.current_count.saturating_mul(100) / self.total_estimate;
        Some(raw.min(100) as u8)
    }
}
