//! Final accounting of one transfer run.

use std::fmt;
use std::time::Duration;

use model::WriteAction;

/// Per-action counts and timing for a completed (or cancelled) run.
#[derive(Clone, Debug, Default)]
pub struct RunSummary {
    /// Total items processed, synthesized container writes included.
    pub processed: u64,
    /// Items newly created and complete.
    pub created: u64,
    /// Items newly created with a fixup pending at the time of the write.
    pub creating: u64,
    /// Items updated in place and complete.
    pub updated: u64,
    /// Items updated with a fixup pending at the time of the write.
    pub updating: u64,
    /// Writes rejected by the sink.
    pub failed: u64,
    /// Writes refused because the target parent did not exist.
    pub missing_parent: u64,
    /// Writes declined by sink policy.
    pub skipped: u64,
    /// Items suppressed by a cutoff.
    pub cut_off: u64,
    /// Outcomes the sink could not classify.
    pub unknown: u64,
    /// Failed plus missing-parent outcomes.
    pub error_count: u64,
    /// Reference-fixup tasks recorded during the run.
    pub tasks_recorded: u64,
    /// Wall time of the run.
    pub elapsed: Duration,
    /// Whether the run stopped on a cancellation signal.
    pub cancelled: bool,
}

impl RunSummary {
    /// Adds one outcome to the per-action counters.
    pub fn add(&mut self, action: WriteAction) {
        self.processed += 1;
        match action {
            WriteAction::Created => self.created += 1,
            WriteAction::Creating => self.creating += 1,
            WriteAction::Updated => self.updated += 1,
            WriteAction::Updating => self.updating += 1,
            WriteAction::Failed => self.failed += 1,
            WriteAction::MissingParent => self.missing_parent += 1,
            WriteAction::Skipped => self.skipped += 1,
            WriteAction::CutOff => self.cut_off += 1,
            WriteAction::Unknown => self.unknown += 1,
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        for (count, label) in [
            (self.created, "created"),
            (self.creating, "creating"),
            (self.updated, "updated"),
            (self.updating, "updating"),
            (self.skipped, "skipped"),
            (self.cut_off, "cut off"),
            (self.missing_parent, "missing parent"),
            (self.failed, "failed"),
            (self.unknown, "unknown"),
        ] {
            if count > 0 {
                parts.push(format!("{count} {label}"));
            }
        }
        let breakdown = if parts.is_empty() {
            "nothing to do".to_string()
        } else {
            parts.join(", ")
        };
        write!(
            f,
            "{}{} items in {:.1?}: {breakdown} ({} error{})",
            if self.cancelled { "cancelled after " } else { "" },
            self.processed,
            self.elapsed,
            self.error_count,
            if self.error_count == 1 { "" } else { "s" }
        )?;
        if self.tasks_recorded > 0 {
            write!(f, ", {} reference fixup task(s)", self.tasks_recorded)?;
        }
        Ok(())
    }
}
