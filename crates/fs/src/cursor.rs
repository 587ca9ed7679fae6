//! Filesystem implementation of the source-cursor contract.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use model::{
    Attachment, AttachmentSource, ContentItem, CutoffSet, FieldValue, PositionedItem, RepoPath,
    Result, SourceCursor, TransferError, TransferTask,
};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::METADATA_SUFFIX;
use crate::walker::{TreeWalker, read_sibling_metadata};

/// Lazy pre-order cursor over a local directory tree.
///
/// The `read_all` traversal and every `read_subtree` traversal keep
/// isolated stack state; cutoffs registered through `skip_subtree` apply
/// to all of them.
pub struct FsCursor {
    root_dir: PathBuf,
    cutoffs: CutoffSet,
    all: TreeWalker,
    subtrees: FxHashMap<RepoPath, TreeWalker>,
    replay: Option<ReplayState>,
    current: Option<PositionedItem>,
    estimate: Arc<AtomicU64>,
}

struct ReplayState {
    tasks: Vec<TransferTask>,
    index: usize,
}

impl FsCursor {
    /// Opens a cursor over `root_dir`.
    ///
    /// Spawns a background task that pre-computes the estimated item
    /// count; the estimate feeds progress percentages only and is read
    /// monotonically while it grows.
    pub async fn open(root_dir: impl Into<PathBuf>) -> Result<Self> {
        let root_dir = root_dir.into();
        let meta = tokio::fs::metadata(&root_dir)
            .await
            .map_err(|error| TransferError::io(root_dir.display().to_string(), error))?;
        if !meta.is_dir() {
            return Err(TransferError::InvalidState(format!(
                "source root '{}' is not a directory",
                root_dir.display()
            )));
        }

        let estimate = Arc::new(AtomicU64::new(0));
        {
            let counter = Arc::clone(&estimate);
            let root = root_dir.clone();
            tokio::task::spawn_blocking(move || estimate_items(&root, &counter));
        }

        Ok(Self {
            all: TreeWalker::new(root_dir.clone(), RepoPath::root()),
            root_dir,
            cutoffs: CutoffSet::new(),
            subtrees: FxHashMap::default(),
            replay: None,
            current: None,
            estimate,
        })
    }

    fn fs_path(&self, path: &RepoPath) -> PathBuf {
        let mut full = self.root_dir.clone();
        for segment in path.segments() {
            full.push(segment);
        }
        full
    }

    /// Loads one item by exact relative path, for replay mode.
    async fn load_item(&self, path: &RepoPath) -> Result<ContentItem> {
        let full = self.fs_path(path);
        let name = path
            .name()
            .map_or_else(
                || {
                    self.root_dir
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default()
                },
                str::to_string,
            );

        let is_dir = tokio::fs::metadata(&full)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);
        let meta = read_sibling_metadata(&full).await?;

        if !is_dir && meta.is_none() {
            // Raw single-attachment item; verify the file itself exists.
            tokio::fs::metadata(&full)
                .await
                .map_err(|error| TransferError::io(full.display().to_string(), error))?;
            let mut item = ContentItem {
                name: name.clone(),
                type_name: "File".to_string(),
                ..ContentItem::default()
            };
            item.fields
                .insert("Binary".to_string(), FieldValue::Attachment(name.clone()));
            item.attachments.push(Attachment {
                field_name: "Binary".to_string(),
                file_name: name,
                content_type: None,
                source: AttachmentSource::File(full),
            });
            return Ok(item);
        }

        let mut item = ContentItem {
            name,
            type_name: if is_dir { "Folder" } else { "File" }.to_string(),
            folder: is_dir,
            ..ContentItem::default()
        };
        if let Some(meta) = meta {
            item.type_name = meta.type_name.clone();
            if let Some(name) = &meta.name {
                item.name = name.clone();
            }
            item.fields = meta.fields.clone();
            item.permissions = meta.permissions.clone();
            let parent = full.parent().map_or_else(PathBuf::new, Path::to_path_buf);
            for (field, file) in meta.attachment_table() {
                item.attachments.push(Attachment {
                    field_name: field.to_string(),
                    file_name: file.to_string(),
                    content_type: None,
                    source: AttachmentSource::File(parent.join(file)),
                });
            }
        }
        Ok(item)
    }
}

impl SourceCursor for FsCursor {
    async fn read_all(&mut self, excluded: &[RepoPath]) -> Result<bool> {
        self.current = self.all.advance(&self.cutoffs, excluded).await?;
        Ok(self.current.is_some())
    }

    async fn read_subtree(&mut self, subtree: &RepoPath) -> Result<bool> {
        if !self.subtrees.contains_key(subtree) {
            let dir = self.fs_path(subtree);
            let exists = tokio::fs::metadata(&dir)
                .await
                .map(|meta| meta.is_dir())
                .unwrap_or(false);
            let walker = if exists {
                TreeWalker::new(dir, subtree.clone())
            } else {
                TreeWalker::exhausted(dir, subtree.clone())
            };
            self.subtrees.insert(subtree.clone(), walker);
        }
        let walker = self
            .subtrees
            .get_mut(subtree)
            .ok_or_else(|| TransferError::InvalidState("subtree walker vanished".to_string()))?;
        self.current = walker.advance(&self.cutoffs, &[]).await?;
        Ok(self.current.is_some())
    }

    fn skip_subtree(&mut self, path: &RepoPath) {
        debug!(path = %path, "cutting off subtree on the reader side");
        self.cutoffs.insert(path.clone());
    }

    fn set_reference_update_tasks(&mut self, tasks: Vec<TransferTask>) {
        self.replay = Some(ReplayState { tasks, index: 0 });
    }

    async fn read_by_reference_update_tasks(&mut self) -> Result<bool> {
        let Some(replay) = self.replay.as_mut() else {
            return Err(TransferError::InvalidState(
                "replay mode requires reference update tasks".to_string(),
            ));
        };
        let Some(task) = replay.tasks.get(replay.index).cloned() else {
            self.current = None;
            return Ok(false);
        };
        replay.index += 1;

        let mut item = self.load_item(&task.reader_path).await?;
        item.retain_fields(&task.broken_references);
        if !task.retry_permissions {
            item.permissions = None;
        }
        self.current = Some(PositionedItem {
            relative_path: task.reader_path,
            item,
        });
        Ok(true)
    }

    fn content(&self) -> Option<&ContentItem> {
        self.current.as_ref().map(|positioned| &positioned.item)
    }

    fn content_mut(&mut self) -> Option<&mut ContentItem> {
        self.current.as_mut().map(|positioned| &mut positioned.item)
    }

    fn relative_path(&self) -> Option<&RepoPath> {
        self.current
            .as_ref()
            .map(|positioned| &positioned.relative_path)
    }

    fn estimated_count(&self) -> u64 {
        self.estimate.load(Ordering::Relaxed)
    }
}

/// Best-effort item count, computed off the main traversal.
///
/// Counts directories, metadata leaves, and raw files with an explicit
/// stack. Declared attachments are not subtracted; the result only feeds
/// a progress percentage.
fn estimate_items(root: &Path, counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(read_dir) = std::fs::read_dir(&dir) else {
            continue;
        };
        let mut dir_names = Vec::new();
        let mut file_names = Vec::new();
        for entry in read_dir.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => {
                    stack.push(entry.path());
                    dir_names.push(name);
                }
                Ok(_) => file_names.push(name),
                Err(_) => {}
            }
        }
        let count = dir_names.len()
            + file_names
                .iter()
                .filter(|name| match name.strip_suffix(METADATA_SUFFIX) {
                    Some(base) => !dir_names.iter().any(|dir| dir == base),
                    None => true,
                })
                .count();
        counter.fetch_add(count as u64, Ordering::Relaxed);
    }
}
