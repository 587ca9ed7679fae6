//! In-memory representation of one tree node.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;

use crate::error::{Result, TransferError};
use crate::path::RepoPath;

/// A single field value carried by a [`ContentItem`].
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// Explicit null.
    Null,
    /// Boolean flag.
    Bool(bool),
    /// Numeric value.
    Number(f64),
    /// Plain text.
    String(String),
    /// Point in time.
    Timestamp(DateTime<Utc>),
    /// Reference to a binary attachment, by declared file name.
    Attachment(String),
}

impl FieldValue {
    /// Returns the referenced attachment file name, if any.
    #[must_use]
    pub fn attachment_name(&self) -> Option<&str> {
        match self {
            Self::Attachment(name) => Some(name),
            _ => None,
        }
    }
}

/// Permission descriptor attached to a content item.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionInfo {
    /// Whether permissions are inherited from the parent item.
    pub is_inherited: bool,
    /// Explicit permission entries.
    pub entries: Vec<PermissionEntry>,
}

/// One explicit permission entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PermissionEntry {
    /// Identity (user or group path) the entry applies to.
    pub identity: String,
    /// Whether the entry applies only to this item, not its subtree.
    pub local_only: bool,
    /// Permission name to value ("allow"/"deny") map.
    pub permissions: BTreeMap<String, String>,
}

/// Where the bytes of an [`Attachment`] come from.
///
/// Opening the stream is a side-effecting, possibly failing operation
/// distinct from reading the owning item's metadata.
#[derive(Clone, Debug)]
pub enum AttachmentSource {
    /// A file on the local filesystem, read lazily.
    File(PathBuf),
    /// Bytes already materialised in memory.
    Inline(Arc<Vec<u8>>),
}

/// A lazy binary attachment of a content item.
#[derive(Clone, Debug)]
pub struct Attachment {
    /// Field the attachment belongs to.
    pub field_name: String,
    /// Declared file name of the attachment.
    pub file_name: String,
    /// Optional MIME type.
    pub content_type: Option<String>,
    /// Byte source opened on demand.
    pub source: AttachmentSource,
}

impl Attachment {
    /// Opens the attachment stream and reads it to completion.
    pub async fn open(&self) -> Result<Vec<u8>> {
        match &self.source {
            AttachmentSource::File(path) => {
                tokio::fs::read(path).await.map_err(|source| TransferError::Io {
                    path: path.display().to_string(),
                    source,
                })
            }
            AttachmentSource::Inline(bytes) => Ok(bytes.as_ref().clone()),
        }
    }
}

/// One node of the transferred tree.
#[derive(Clone, Debug, Default)]
pub struct ContentItem {
    /// Display name; also the final path segment unless the root is renamed.
    pub name: String,
    /// Content type name.
    pub type_name: String,
    /// Whether the item can carry children.
    pub folder: bool,
    /// Ordered field map.
    pub fields: IndexMap<String, FieldValue>,
    /// Optional permission descriptor.
    pub permissions: Option<PermissionInfo>,
    /// Lazy binary attachments.
    pub attachments: Vec<Attachment>,
    /// Set once this item's descendants must never be read or written again.
    pub cut_off: bool,
}

impl ContentItem {
    /// Creates a minimal folder item, used when synthesizing ancestor
    /// containers for a schema-priority phase.
    #[must_use]
    pub fn folder(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            folder: true,
            ..Self::default()
        }
    }

    /// Looks up the attachment declared for `field_name`.
    #[must_use]
    pub fn attachment(&self, field_name: &str) -> Option<&Attachment> {
        self.attachments
            .iter()
            .find(|attachment| attachment.field_name == field_name)
    }

    /// Reports whether the item is nothing but a single raw attachment:
    /// one attachment field and no other metadata to speak of.
    ///
    /// Such items round-trip to a plain file on the filesystem side.
    #[must_use]
    pub fn is_raw_attachment(&self) -> bool {
        self.attachments.len() == 1
            && self.permissions.is_none()
            && self
                .fields
                .iter()
                .all(|(_, value)| matches!(value, FieldValue::Attachment(_)))
            && self.fields.len() == 1
    }

    /// Drops every field except the ones named in `keep`, preserving order.
    ///
    /// Used by replay-mode cursors, which fetch only the fields named in a
    /// transfer task's broken-reference list.
    pub fn retain_fields(&mut self, keep: &[String]) {
        self.fields.retain(|name, _| keep.iter().any(|k| k == name));
        self.attachments
            .retain(|attachment| keep.iter().any(|k| *k == attachment.field_name));
    }
}

/// Pairs an item with its position in the source tree.
///
/// Cursors hand this to the orchestrator one node at a time.
#[derive(Clone, Debug)]
pub struct PositionedItem {
    /// Path of the item relative to the read root.
    pub relative_path: RepoPath,
    /// The item itself.
    pub item: ContentItem,
}
