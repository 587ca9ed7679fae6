#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `model` defines the shared vocabulary of the treeflow workspace: the
//! in-memory representation of one tree node ([`ContentItem`]), the
//! per-item result classification returned by a target sink
//! ([`WriteOutcome`]), the durable record of deferred reference fixups
//! ([`TransferTask`]), the progress snapshot emitted once per processed
//! item ([`TransferState`]), and the [`SourceCursor`]/[`TargetSink`]
//! contracts the transfer engine is composed from.
//!
//! # Design
//!
//! - Identity within a run is a [`RepoPath`]: a slash-separated path
//!   relative to the configured read root. Uniqueness of the relative
//!   path within one traversal is an invariant the cursors uphold.
//! - Cutoffs are modelled as an append-only accumulating set with
//!   segment-prefix matching ([`CutoffSet`]); a single membership test is
//!   used everywhere instead of ad hoc string checks.
//! - Source cursors and target sinks are traits with exactly the
//!   operations the engine needs. The filesystem and repository variants
//!   are independent implementations composed into the orchestrator by
//!   construction, not through a shared base hierarchy.
//!
//! # Invariants
//!
//! - [`ContentItem`] values are constructed fresh by a cursor on each
//!   positional read and are never mutated by the orchestrator except to
//!   overwrite `name` when the target configures a root rename.
//! - A [`TransferTask`] is created once per affected item, never mutated
//!   after creation, and consumed exactly once in the fixup pass.
//! - `current_count` in emitted [`TransferState`] values increases
//!   monotonically within a run.

pub mod contract;
pub mod cutoff;
pub mod error;
pub mod item;
pub mod outcome;
pub mod path;
pub mod state;
pub mod task;

pub use contract::{NullObserver, OverwritePolicy, ProgressObserver, SourceCursor, TargetSink};
pub use cutoff::CutoffSet;
pub use error::{Result, TransferError};
pub use item::{
    Attachment, AttachmentSource, ContentItem, FieldValue, PermissionEntry, PermissionInfo,
    PositionedItem,
};
pub use outcome::{WriteAction, WriteOutcome};
pub use path::RepoPath;
pub use state::{BatchAction, TransferState};
pub use task::TransferTask;
