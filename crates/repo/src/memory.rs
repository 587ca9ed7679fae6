//! In-memory repository backend.
//!
//! Implements the full [`RepositoryService`] contract over a sorted map,
//! including keyset paging, reference resolution on import, and a binary
//! store fed by uploads. Used as the backend in tests and demos; fault
//! injection ([`MemoryRepository::reject_imports`],
//! [`MemoryRepository::throttle_imports`]) exercises the failure paths of
//! the cursor and sink.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use model::{
    Attachment, AttachmentSource, ContentItem, FieldValue, RepoPath, Result, TransferError,
};
use rustc_hash::FxHashMap;

use crate::service::{ImportOutcome, RemoteItem, RepositoryService, SubtreeQuery};

struct StoredItem {
    item: ContentItem,
    blobs: BTreeMap<String, Vec<u8>>,
}

/// Sorted-map repository holding items by absolute path.
#[derive(Default)]
pub struct MemoryRepository {
    items: BTreeMap<RepoPath, StoredItem>,
    rejected: Vec<RepoPath>,
    throttle: FxHashMap<RepoPath, u32>,
    imports: Vec<RepoPath>,
}

impl MemoryRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `item` at `path` directly, bypassing reference resolution.
    pub fn seed(&mut self, path: impl Into<RepoPath>, item: ContentItem) {
        self.items.insert(
            path.into(),
            StoredItem {
                item,
                blobs: BTreeMap::new(),
            },
        );
    }

    /// Seeds every missing ancestor of `path` (and `path` itself) as a
    /// plain folder.
    pub fn seed_folders(&mut self, path: impl Into<RepoPath>) {
        let path = path.into();
        let mut current = RepoPath::root();
        for segment in path.segments() {
            current = current.join(segment);
            if !self.items.contains_key(&current) {
                self.seed(current.clone(), ContentItem::folder(segment, "Folder"));
            }
        }
    }

    /// Makes every future import at `path` fail permanently.
    pub fn reject_imports(&mut self, path: impl Into<RepoPath>) {
        self.rejected.push(path.into());
    }

    /// Makes the next `times` imports at `path` fail transiently.
    pub fn throttle_imports(&mut self, path: impl Into<RepoPath>, times: u32) {
        self.throttle.insert(path.into(), times);
    }

    /// The stored item at `path`, if any.
    #[must_use]
    pub fn item(&self, path: &RepoPath) -> Option<&ContentItem> {
        self.items.get(path).map(|stored| &stored.item)
    }

    /// The uploaded bytes for `field` of the item at `path`, if any.
    #[must_use]
    pub fn blob(&self, path: &RepoPath, field: &str) -> Option<&[u8]> {
        self.items
            .get(path)
            .and_then(|stored| stored.blobs.get(field))
            .map(Vec::as_slice)
    }

    /// Every import accepted so far, in order.
    #[must_use]
    pub fn import_log(&self) -> &[RepoPath] {
        &self.imports
    }

    /// Number of stored items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the repository holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Clone of the stored item with its blobs attached as inline
    /// attachment streams.
    fn materialise(&self, path: &RepoPath, stored: &StoredItem, fields: &[String]) -> ContentItem {
        let mut item = stored.item.clone();
        if !fields.is_empty() {
            item.retain_fields(fields);
        }
        for (field, bytes) in &stored.blobs {
            if !fields.is_empty() && !fields.iter().any(|name| name == field) {
                continue;
            }
            let file_name = item
                .fields
                .get(field)
                .and_then(FieldValue::attachment_name)
                .unwrap_or(path.name().unwrap_or_default())
                .to_string();
            item.attachments.push(Attachment {
                field_name: field.clone(),
                file_name,
                content_type: None,
                source: AttachmentSource::Inline(Arc::new(bytes.clone())),
            });
        }
        item
    }

    fn path_exists(&self, path: &RepoPath) -> bool {
        path.is_root() || self.items.contains_key(path)
    }

    /// Fields of `item` whose value names a repository path that does not
    /// exist yet. By convention a string field starting with `/` is a
    /// reference.
    fn broken_references(&self, item: &ContentItem) -> Vec<String> {
        item.fields
            .iter()
            .filter_map(|(name, value)| match value {
                FieldValue::String(text) if text.starts_with('/') => {
                    (!self.path_exists(&RepoPath::new(text))).then(|| name.clone())
                }
                _ => None,
            })
            .collect()
    }

    fn unresolved_identities(&self, item: &ContentItem) -> bool {
        item.permissions.as_ref().is_some_and(|permissions| {
            permissions
                .entries
                .iter()
                .any(|entry| !self.path_exists(&RepoPath::new(&entry.identity)))
        })
    }
}

/// The only filter form this backend understands is `TypeIs:<TypeName>`.
fn compile_filter(expression: &str) -> Result<impl Fn(&ContentItem) -> bool + '_> {
    let type_name = expression.strip_prefix("TypeIs:").ok_or_else(|| {
        TransferError::service(expression, "unsupported filter expression")
    })?;
    Ok(move |item: &ContentItem| item.type_name == type_name)
}

impl RepositoryService for MemoryRepository {
    async fn query(&mut self, query: &SubtreeQuery) -> Result<Vec<RemoteItem>> {
        let start = query
            .after
            .clone()
            .unwrap_or_else(|| query.subtree.clone());
        let filter = query
            .filter
            .as_deref()
            .map(compile_filter)
            .transpose()?;
        let mut rows = Vec::new();
        for (path, stored) in self
            .items
            .range((Bound::Excluded(start), Bound::Unbounded))
        {
            if rows.len() >= query.page_size {
                break;
            }
            if !path.is_under(&query.subtree) {
                continue;
            }
            if query.exclude.iter().any(|prefix| path.is_under(prefix)) {
                continue;
            }
            if filter.as_ref().is_some_and(|accept| !accept(&stored.item)) {
                continue;
            }
            rows.push(RemoteItem {
                path: path.clone(),
                item: self.materialise(path, stored, &[]),
            });
        }
        Ok(rows)
    }

    async fn load(&mut self, path: &RepoPath, fields: &[String]) -> Result<Option<ContentItem>> {
        Ok(self
            .items
            .get(path)
            .map(|stored| self.materialise(path, stored, fields)))
    }

    async fn exists(&mut self, path: &RepoPath) -> Result<bool> {
        Ok(self.path_exists(path))
    }

    async fn import(&mut self, path: &RepoPath, item: &ContentItem) -> Result<ImportOutcome> {
        if self.rejected.iter().any(|rejected| rejected == path) {
            return Err(TransferError::service(
                path.as_str(),
                "import rejected by policy",
            ));
        }
        if let Some(remaining) = self.throttle.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TransferError::throttled(path.as_str(), "throttled"));
            }
        }
        let parent = path
            .parent()
            .ok_or_else(|| TransferError::service(path.as_str(), "cannot import the root"))?;
        if !self.path_exists(&parent) {
            return Err(TransferError::service(
                path.as_str(),
                "parent does not exist",
            ));
        }

        let broken_references = self.broken_references(item);
        let retry_permissions = self.unresolved_identities(item);

        let mut incoming = item.clone();
        incoming.attachments.clear();
        let updated = match self.items.get_mut(path) {
            Some(stored) => {
                stored.item.name = incoming.name;
                stored.item.type_name = incoming.type_name;
                stored.item.folder = incoming.folder;
                for (field, value) in incoming.fields {
                    stored.item.fields.insert(field, value);
                }
                if incoming.permissions.is_some() {
                    stored.item.permissions = incoming.permissions;
                }
                true
            }
            None => {
                self.items.insert(
                    path.clone(),
                    StoredItem {
                        item: incoming,
                        blobs: BTreeMap::new(),
                    },
                );
                false
            }
        };
        self.imports.push(path.clone());

        Ok(ImportOutcome {
            updated,
            broken_references,
            retry_permissions,
            messages: Vec::new(),
        })
    }

    async fn upload(&mut self, path: &RepoPath, attachment: &Attachment) -> Result<()> {
        let bytes = attachment.open().await?;
        let stored = self.items.get_mut(path).ok_or_else(|| {
            TransferError::service(path.as_str(), "upload target does not exist")
        })?;
        stored.item.fields.insert(
            attachment.field_name.clone(),
            FieldValue::Attachment(attachment.file_name.clone()),
        );
        stored.blobs.insert(attachment.field_name.clone(), bytes);
        Ok(())
    }

    async fn count(&mut self, path: &RepoPath) -> Result<u64> {
        let root = u64::from(self.path_exists(path));
        let descendants = self.items.keys().filter(|key| key.is_under(path)).count();
        Ok(root + descendants as u64)
    }
}
