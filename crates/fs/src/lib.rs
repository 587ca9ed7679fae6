#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `fs` implements the filesystem endpoint of the treeflow workspace:
//! [`FsCursor`], a lazy pre-order source cursor over a local directory
//! layout, and [`FsSink`], the matching target sink.
//!
//! # Layout convention
//!
//! A directory maps onto a content tree as follows. Every subdirectory is
//! a folder item, optionally paired with a sibling metadata file of the
//! same name plus the reserved `.Content` suffix. Every leaf metadata
//! file without a matching directory is a non-folder item. Every
//! remaining file that is neither a metadata file nor declared as an
//! attachment of a sibling item becomes a single-attachment item named
//! after the file.
//!
//! # Design
//!
//! Traversal uses an explicit stack of levels, each holding an ordered
//! array of sibling entries and a cursor index, so memory stays bounded
//! by tree depth and the walk can be suspended between items and resumed
//! without re-entrant call-stack state. Within a level, entries are
//! ordered directories first, then metadata-only leaves, then raw-file
//! leaves, each group sorted lexicographically by name. The ordering is
//! an explicit, tested contract, not an accident of the underlying
//! filesystem.
//!
//! # Invariants
//!
//! - A parent is always yielded strictly before any of its descendants.
//! - Relative paths are unique within one traversal.
//! - A path marked as cut off is never descended into again, by any
//!   cursor of the same source.

mod cursor;
mod sink;
mod walker;

pub use cursor::FsCursor;
pub use sink::{FsSink, FsSinkConfig};

/// Reserved suffix pairing a metadata file with its item.
pub const METADATA_SUFFIX: &str = ".Content";
