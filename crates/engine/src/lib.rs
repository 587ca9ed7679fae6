#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `engine` sequences one transfer run: the [`Orchestrator`] pulls items
//! from a source cursor in dependency-safe order, pushes them to a
//! target sink, contains partial failures through cutoffs, records
//! deferred reference fixups in the [`Ledger`], and replays them once
//! the whole tree exists at the target. The result of a run is a
//! [`RunSummary`].
//!
//! # Design
//!
//! - One logical thread of control per run: cursor and sink calls are
//!   strictly sequential, so the core needs no locking.
//! - Phases are strictly ordered and individually optional: schema
//!   subtrees, the general tree, then reference fixups.
//! - A single item's failure never aborts the run. A failed container
//!   aborts only its own subtree, via a cutoff registered on both the
//!   reader and writer sides.
//! - Cancellation is cooperative: the token is checked before every
//!   cursor and sink call, and a cancelled run returns its partial
//!   summary with the ledger intact.

mod ledger;
mod orchestrator;
mod summary;

pub use ledger::Ledger;
pub use orchestrator::{Orchestrator, TransferOptions};
pub use summary::RunSummary;
