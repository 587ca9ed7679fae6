#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `repo` implements the repository endpoint of the treeflow workspace:
//! [`RepoCursor`], a paged pre-order source cursor over a repository
//! subtree, and [`RepoSink`], the matching target sink. Both are generic
//! over the [`RepositoryService`] backend contract; [`MemoryRepository`]
//! is the in-memory backend used in tests and demos.
//!
//! # Design
//!
//! - Paging is keyset-only: each page asks for paths strictly greater
//!   than the last row of the previous page, ordered by path. The source
//!   may gain or lose earlier rows between pages without making the
//!   cursor skip or repeat items.
//! - Housekeeping subtrees (previews, version history) are filtered on
//!   the client, after the keyset position has advanced past them.
//! - The sink retries transient failures a bounded number of times and
//!   converts permanent per-item failures into `Failed` outcomes, so a
//!   single bad item never aborts a run.
//!
//! # Invariants
//!
//! - Every path returned by one traversal compares strictly greater than
//!   the previous one, which implies parents before descendants.
//! - A path marked as cut off is never descended into again, by any
//!   cursor of the same source.

mod cursor;
mod memory;
mod service;
mod sink;

pub use cursor::RepoCursor;
pub use memory::MemoryRepository;
pub use service::{ImportOutcome, RemoteItem, RepositoryService, SubtreeQuery};
pub use sink::{RepoSink, RepoSinkConfig};
