//! Phase sequencing for one transfer run.
//!
//! The orchestrator owns one cursor, one sink, and one observer and
//! drives them strictly sequentially: pull one item, push one item,
//! inspect the outcome, repeat. Phases run in a fixed order: the
//! schema-priority subtrees first (content types, settings, aspects),
//! then the general tree, then the reference fixups. Every phase is
//! optional depending on the logical target region, computed once from
//! the sink's container path and root name.

use std::time::Instant;

use model::{
    BatchAction, ContentItem, ProgressObserver, RepoPath, Result, SourceCursor, TargetSink,
    TransferState, TransferTask, WriteAction, WriteOutcome,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ledger::Ledger;
use crate::summary::RunSummary;

/// Repository-rooted subtrees that must exist before anything that
/// depends on them, in the order they are drained.
fn schema_phases() -> [(BatchAction, RepoPath); 3] {
    [
        (
            BatchAction::ContentTypes,
            RepoPath::new("Root/System/Schema/ContentTypes"),
        ),
        (BatchAction::Settings, RepoPath::new("Root/System/Settings")),
        (
            BatchAction::Aspects,
            RepoPath::new("Root/System/Schema/Aspects"),
        ),
    ]
}

/// Run parameters the configuration layer resolves before construction.
#[derive(Clone, Debug)]
pub struct TransferOptions {
    /// Display name of the source root item, used as the written root
    /// path segment unless the sink configures a rename.
    pub source_root_name: String,
}

enum Flow {
    Continue,
    AbortPhase,
}

/// The transfer state machine.
pub struct Orchestrator<C, K, O> {
    cursor: C,
    sink: K,
    observer: O,
    options: TransferOptions,
    ledger: Ledger,
    token: CancellationToken,
    summary: RunSummary,
    current_count: u64,
    error_count: u64,
}

impl<C, K, O> Orchestrator<C, K, O>
where
    C: SourceCursor,
    K: TargetSink,
    O: ProgressObserver,
{
    /// Wires a cursor, sink, and observer into a runnable transfer.
    pub fn new(cursor: C, sink: K, observer: O, options: TransferOptions) -> Self {
        Self {
            cursor,
            sink,
            observer,
            options,
            ledger: Ledger::in_memory(),
            token: CancellationToken::new(),
            summary: RunSummary::default(),
            current_count: 0,
            error_count: 0,
        }
    }

    /// Replaces the in-memory ledger, typically with a journaled one.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Ledger) -> Self {
        self.ledger = ledger;
        self
    }

    /// Installs a cooperative cancellation token. The run checks it
    /// before every cursor and sink call and returns its partial summary
    /// once it fires, leaving the ledger intact.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Consumes the orchestrator, returning the sink.
    pub fn into_sink(self) -> K {
        self.sink
    }

    /// Consumes the orchestrator, returning the cursor and sink.
    pub fn into_parts(self) -> (C, K) {
        (self.cursor, self.sink)
    }

    /// Runs all phases to completion (or cancellation).
    ///
    /// A single item's failure never aborts the run; the only
    /// run-aborting error is a cursor or sink contract violation.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        self.summary = RunSummary::default();
        self.current_count = 0;
        self.error_count = 0;

        info!(
            root = %self.writer_base(),
            container = %self.sink.container_path(),
            "starting transfer"
        );
        let cancelled = self.run_phases().await?;
        if cancelled {
            warn!("transfer cancelled, ledger preserved");
        }

        let mut summary = std::mem::take(&mut self.summary);
        summary.processed = self.current_count;
        summary.error_count = self.error_count;
        summary.tasks_recorded = self.ledger.len() as u64;
        summary.elapsed = started.elapsed();
        summary.cancelled = cancelled;
        info!(%summary, "transfer finished");
        Ok(summary)
    }

    async fn run_phases(&mut self) -> Result<bool> {
        for (action, subtree) in self.applicable_schema_phases() {
            if self.token.is_cancelled() {
                return Ok(true);
            }
            if self.run_schema_phase(action, &subtree).await? {
                return Ok(true);
            }
        }
        if self.run_general_phase().await? {
            return Ok(true);
        }
        self.run_fixup_phase().await
    }

    /// The root path segment every written item lives under.
    fn writer_base(&self) -> RepoPath {
        RepoPath::new(
            self.sink
                .root_name()
                .unwrap_or(&self.options.source_root_name),
        )
    }

    /// Schema phases whose well-known subtree falls inside the logical
    /// target region, paired with the subtree path relative to the
    /// source root.
    fn applicable_schema_phases(&self) -> Vec<(BatchAction, RepoPath)> {
        let target_root = self.sink.container_path().append(&self.writer_base());
        schema_phases()
            .into_iter()
            .filter_map(|(action, well_known)| {
                well_known
                    .strip_prefix(&target_root)
                    .filter(|rel| !rel.is_root())
                    .map(|rel| (action, rel))
            })
            .collect()
    }

    /// Drains one schema-priority subtree.
    ///
    /// Returns `Ok(true)` on cancellation. A source without the subtree
    /// makes the phase a no-op before anything is written.
    async fn run_schema_phase(&mut self, action: BatchAction, subtree: &RepoPath) -> Result<bool> {
        if !self.cursor.read_subtree(subtree).await? {
            return Ok(false);
        }
        debug!(phase = %action, subtree = %subtree, "entering schema phase");

        if !self.ensure_container_chain(action, subtree).await? {
            return Ok(false);
        }

        let mut first = true;
        loop {
            if self.token.is_cancelled() {
                return Ok(true);
            }
            let Some(rel) = self.cursor.relative_path().cloned() else {
                break;
            };
            // The phase's own empty container root was just synthesized
            // and will be rewritten by the general phase.
            let skip_root = rel == *subtree && self.cursor.content().is_some_and(is_bare_container);
            if !skip_root {
                if let Flow::AbortPhase = self.process_current(action, &rel, first).await? {
                    return Ok(false);
                }
                first = false;
            }
            if !self.cursor.read_subtree(subtree).await? {
                break;
            }
        }
        Ok(false)
    }

    /// Writes minimal folder items for every absent ancestor of the
    /// phase's target subtree. Returns `Ok(false)` when the chain cannot
    /// be established and the phase must be abandoned.
    async fn ensure_container_chain(&mut self, action: BatchAction, subtree: &RepoPath) -> Result<bool> {
        let base = self.writer_base().append(subtree);
        let mut prefix = RepoPath::root();
        for segment in base.segments() {
            prefix = prefix.join(segment);
            if !self.sink.should_skip_subtree(&prefix).await? {
                continue;
            }
            let container = ContentItem::folder(segment, "Folder");
            let mut outcome = self.sink.write(&prefix, &container).await?;
            outcome.writer_path = prefix.clone();
            let established = !outcome.action.is_error();
            self.emit(action, false, outcome);
            if !established {
                warn!(phase = %action, container = %prefix, "container chain cannot be established");
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Drains the whole tree, excluding subtrees already handled by the
    /// schema phases. Returns `Ok(true)` on cancellation.
    async fn run_general_phase(&mut self) -> Result<bool> {
        let excluded: Vec<RepoPath> = self
            .applicable_schema_phases()
            .into_iter()
            .map(|(_, rel)| rel)
            .collect();

        let mut first = true;
        loop {
            if self.token.is_cancelled() {
                return Ok(true);
            }
            if !self.cursor.read_all(&excluded).await? {
                break;
            }
            let Some(rel) = self.cursor.relative_path().cloned() else {
                break;
            };
            if rel.is_root() {
                if let Some(name) = self.sink.root_name().map(str::to_string) {
                    if let Some(item) = self.cursor.content_mut() {
                        item.name = name;
                    }
                }
            }
            if let Flow::AbortPhase = self.process_current(BatchAction::Contents, &rel, first).await? {
                break;
            }
            first = false;
        }
        Ok(false)
    }

    /// Replays the ledger's tasks in creation order. No cutoff logic
    /// applies here; the items are already known to exist.
    async fn run_fixup_phase(&mut self) -> Result<bool> {
        if self.ledger.is_empty() {
            return Ok(false);
        }
        info!(tasks = self.ledger.len(), "entering reference fixup phase");
        let tasks: Vec<TransferTask> = self.ledger.tasks().to_vec();
        self.cursor.set_reference_update_tasks(tasks);

        loop {
            if self.token.is_cancelled() {
                return Ok(true);
            }
            if !self.cursor.read_by_reference_update_tasks().await? {
                break;
            }
            let (Some(rel), Some(item)) = (
                self.cursor.relative_path().cloned(),
                self.cursor.content().cloned(),
            ) else {
                break;
            };
            let writer_path = self.writer_base().append(&rel);
            let mut outcome = self.sink.write(&writer_path, &item).await?;
            outcome.reader_path = rel;
            self.emit(BatchAction::UpdateReferences, true, outcome);
        }
        Ok(false)
    }

    /// Writes the cursor's current item and applies the shared outcome
    /// rules: cutoff synthesis, subtree-skip evaluation, first-item
    /// abort, and ledger recording.
    async fn process_current(
        &mut self,
        phase: BatchAction,
        rel: &RepoPath,
        first: bool,
    ) -> Result<Flow> {
        let Some(item) = self.cursor.content().cloned() else {
            return Ok(Flow::Continue);
        };
        let writer_path = self.writer_base().append(rel);

        if item.cut_off {
            self.emit(phase, false, WriteOutcome::cut_off(rel.clone(), writer_path));
            return Ok(Flow::Continue);
        }

        let mut outcome = self.sink.write(&writer_path, &item).await?;
        outcome.reader_path = rel.clone();

        if outcome.action == WriteAction::MissingParent && first {
            warn!(phase = %phase, path = %writer_path, "first item has no parent, aborting phase");
            self.emit(phase, false, outcome);
            return Ok(Flow::AbortPhase);
        }
        if outcome.action.is_error() && self.sink.should_skip_subtree(&writer_path).await? {
            warn!(reader = %rel, writer = %writer_path, "failed subtree cut off on both sides");
            self.cursor.skip_subtree(rel);
        }
        if outcome.update_required() {
            if let Some(task) = TransferTask::from_outcome(&outcome) {
                self.ledger.record(task).await?;
            }
        }
        self.emit(phase, false, outcome);
        Ok(Flow::Continue)
    }

    /// Updates the running counters and hands one progress snapshot to
    /// the observer.
    fn emit(&mut self, phase: BatchAction, updating_references: bool, outcome: WriteOutcome) {
        self.current_count += 1;
        if outcome.action.is_error() {
            self.error_count += 1;
        }
        self.summary.add(outcome.action);
        debug!(action = %outcome.action, path = %outcome.writer_path, "processed");
        let state = TransferState {
            batch_action: phase,
            current_count: self.current_count,
            total_estimate: self.cursor.estimated_count(),
            error_count: self.error_count,
            updating_references,
            outcome,
        };
        self.observer.on_progress(&state);
    }
}

/// A folder with no fields and no permissions carries no information of
/// its own.
fn is_bare_container(item: &ContentItem) -> bool {
    item.folder && item.fields.is_empty() && item.permissions.is_none()
}
