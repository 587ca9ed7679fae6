//! Explicit-stack pre-order walker over the on-disk layout.

use std::path::{Path, PathBuf};

use metadata::Metadata;
use model::{
    Attachment, AttachmentSource, ContentItem, CutoffSet, FieldValue, PositionedItem, RepoPath,
    Result, TransferError,
};
use tracing::{debug, trace};

use crate::METADATA_SUFFIX;

/// How a directory child maps onto the content model.
#[derive(Clone, Debug)]
enum ChildKind {
    /// Subdirectory, optionally paired with a metadata file.
    Folder,
    /// Leaf metadata file without a matching directory.
    MetaLeaf,
    /// Plain file that becomes a single-attachment item.
    RawLeaf,
}

#[derive(Clone, Debug)]
struct ChildEntry {
    /// Item name: directory name, metadata base name, or raw file name.
    name: String,
    kind: ChildKind,
    /// Parsed metadata, when a metadata file exists and is non-empty.
    meta: Option<Metadata>,
}

/// One frame of the traversal stack: an ordered array of sibling entries
/// plus a cursor index.
#[derive(Debug)]
struct Level {
    dir: PathBuf,
    prefix: RepoPath,
    children: Vec<ChildEntry>,
    index: usize,
}

impl Level {
    fn next_child(&mut self) -> Option<ChildEntry> {
        let child = self.children.get(self.index).cloned();
        if child.is_some() {
            self.index += 1;
        }
        child
    }
}

/// Suspendable pre-order traversal of one subtree, rooted at `base`.
///
/// Each [`super::FsCursor`] keeps one walker per logical subtree so that
/// `read_subtree` calls for distinct paths never interfere with each
/// other or with the `read_all` traversal.
#[derive(Debug)]
pub(crate) struct TreeWalker {
    root_dir: PathBuf,
    base: RepoPath,
    yielded_root: bool,
    stack: Vec<Level>,
    finished: bool,
}

impl TreeWalker {
    pub(crate) fn new(root_dir: PathBuf, base: RepoPath) -> Self {
        Self {
            root_dir,
            base,
            yielded_root: false,
            stack: Vec::new(),
            finished: false,
        }
    }

    /// Creates a walker that is already exhausted (missing subtree).
    pub(crate) fn exhausted(root_dir: PathBuf, base: RepoPath) -> Self {
        Self {
            finished: true,
            ..Self::new(root_dir, base)
        }
    }

    /// Advances to the next item in pre-order, honouring cutoffs and
    /// excluded subtrees.
    pub(crate) async fn advance(
        &mut self,
        cutoffs: &CutoffSet,
        excluded: &[RepoPath],
    ) -> Result<Option<PositionedItem>> {
        if self.finished {
            return Ok(None);
        }

        if !self.yielded_root {
            self.yielded_root = true;
            return self.yield_root(cutoffs).await;
        }

        loop {
            // Try the next sibling at the deepest level; pop and retry at
            // the parent once a level is exhausted.
            let (entry, dir, path) = {
                let Some(level) = self.stack.last_mut() else {
                    self.finished = true;
                    return Ok(None);
                };
                match level.next_child() {
                    Some(entry) => {
                        let path = level.prefix.join(&entry.name);
                        (entry, level.dir.clone(), path)
                    }
                    None => {
                        self.stack.pop();
                        continue;
                    }
                }
            };

            if excluded.iter().any(|prefix| path.is_under(prefix)) {
                continue;
            }
            if cutoffs.is_strictly_under_any(&path) {
                trace!(path = %path, "suppressed by cutoff");
                continue;
            }

            let cut_off = cutoffs.is_under_any(&path);
            let exclusion_root = excluded.contains(&path);
            let item = build_item(&entry, &dir, cut_off);

            if matches!(entry.kind, ChildKind::Folder) && !cut_off && !exclusion_root {
                let child_dir = dir.join(&entry.name);
                self.push_level(child_dir, path.clone()).await?;
            }

            return Ok(Some(PositionedItem {
                relative_path: path,
                item,
            }));
        }
    }

    async fn yield_root(&mut self, cutoffs: &CutoffSet) -> Result<Option<PositionedItem>> {
        if cutoffs.is_strictly_under_any(&self.base) {
            self.finished = true;
            return Ok(None);
        }

        let name = match self.base.name() {
            Some(name) => name.to_string(),
            None => self
                .root_dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        let meta = read_sibling_metadata(&self.root_dir).await?;
        let cut_off = cutoffs.is_under_any(&self.base);

        let entry = ChildEntry {
            name,
            kind: ChildKind::Folder,
            meta,
        };
        let parent_dir = self
            .root_dir
            .parent()
            .map_or_else(|| self.root_dir.clone(), Path::to_path_buf);
        let item = build_item(&entry, &parent_dir, cut_off);

        if !cut_off {
            let root_dir = self.root_dir.clone();
            let base = self.base.clone();
            self.push_level(root_dir, base).await?;
        }

        Ok(Some(PositionedItem {
            relative_path: self.base.clone(),
            item,
        }))
    }

    async fn push_level(&mut self, dir: PathBuf, prefix: RepoPath) -> Result<()> {
        debug!(dir = %dir.display(), "entering directory");
        let children = build_children(&dir).await?;
        trace!(dir = %dir.display(), count = children.len(), "assembled level");
        self.stack.push(Level {
            dir,
            prefix,
            children,
            index: 0,
        });
        Ok(())
    }
}

/// Reads the metadata file paired with `item_path` (a directory or a raw
/// name inside its parent), if one exists.
pub(crate) async fn read_sibling_metadata(item_path: &Path) -> Result<Option<Metadata>> {
    let Some(name) = item_path.file_name() else {
        return Ok(None);
    };
    let mut meta_name = name.to_os_string();
    meta_name.push(METADATA_SUFFIX);
    let meta_path = item_path.with_file_name(meta_name);
    match tokio::fs::read_to_string(&meta_path).await {
        Ok(text) => metadata::parse(&text, &meta_path.display().to_string()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(TransferError::io(meta_path.display().to_string(), error)),
    }
}

/// Assembles the ordered child entries of one directory.
///
/// Group order is directories, then metadata-only leaves, then raw-file
/// leaves, each sorted lexicographically by name.
async fn build_children(dir: &Path) -> Result<Vec<ChildEntry>> {
    let mut read_dir = tokio::fs::read_dir(dir)
        .await
        .map_err(|error| TransferError::io(dir.display().to_string(), error))?;

    let mut dir_names = Vec::new();
    let mut file_names = Vec::new();
    loop {
        let entry = read_dir
            .next_entry()
            .await
            .map_err(|error| TransferError::io(dir.display().to_string(), error))?;
        let Some(entry) = entry else { break };
        let file_type = entry
            .file_type()
            .await
            .map_err(|error| TransferError::io(entry.path().display().to_string(), error))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if file_type.is_dir() {
            dir_names.push(name);
        } else {
            file_names.push(name);
        }
    }
    dir_names.sort();
    file_names.sort();

    let meta_bases: Vec<String> = file_names
        .iter()
        .filter_map(|name| name.strip_suffix(METADATA_SUFFIX).map(str::to_string))
        .collect();

    let mut declared_attachments: Vec<String> = Vec::new();
    let mut parsed: Vec<(String, Option<Metadata>)> = Vec::new();
    for base in &meta_bases {
        let meta_path = dir.join(format!("{base}{METADATA_SUFFIX}"));
        let text = tokio::fs::read_to_string(&meta_path)
            .await
            .map_err(|error| TransferError::io(meta_path.display().to_string(), error))?;
        let meta = metadata::parse(&text, &meta_path.display().to_string())?;
        if let Some(meta) = &meta {
            declared_attachments.extend(
                meta.attachment_table()
                    .map(|(_, file)| file.to_string()),
            );
        }
        parsed.push((base.clone(), meta));
    }

    let mut children = Vec::new();

    // Group 1: directories (folder semantics imply children).
    for name in &dir_names {
        let meta = parsed
            .iter()
            .find(|(base, _)| base == name)
            .and_then(|(_, meta)| meta.clone());
        children.push(ChildEntry {
            name: name.clone(),
            kind: ChildKind::Folder,
            meta,
        });
    }

    // Group 2: metadata-only leaves.
    for (base, meta) in &parsed {
        if !dir_names.contains(base) {
            children.push(ChildEntry {
                name: base.clone(),
                kind: ChildKind::MetaLeaf,
                meta: meta.clone(),
            });
        }
    }

    // Group 3: remaining raw files.
    for name in &file_names {
        if name.ends_with(METADATA_SUFFIX) {
            continue;
        }
        if declared_attachments.iter().any(|declared| declared == name) {
            continue;
        }
        children.push(ChildEntry {
            name: name.clone(),
            kind: ChildKind::RawLeaf,
            meta: None,
        });
    }

    Ok(children)
}

/// Constructs a fresh content item for one child entry.
///
/// `dir` is the directory containing the entry; attachment sources are
/// resolved against it lazily.
fn build_item(entry: &ChildEntry, dir: &Path, cut_off: bool) -> ContentItem {
    let mut item = ContentItem {
        name: entry.name.clone(),
        cut_off,
        ..ContentItem::default()
    };

    match entry.kind {
        ChildKind::Folder => {
            item.folder = true;
            item.type_name = "Folder".to_string();
        }
        ChildKind::MetaLeaf => {
            item.type_name = "File".to_string();
        }
        ChildKind::RawLeaf => {
            item.type_name = "File".to_string();
            item.fields.insert(
                "Binary".to_string(),
                FieldValue::Attachment(entry.name.clone()),
            );
            item.attachments.push(Attachment {
                field_name: "Binary".to_string(),
                file_name: entry.name.clone(),
                content_type: None,
                source: AttachmentSource::File(dir.join(&entry.name)),
            });
            return item;
        }
    }

    if let Some(meta) = &entry.meta {
        item.type_name = meta.type_name.clone();
        if let Some(name) = &meta.name {
            item.name = name.clone();
        }
        item.fields = meta.fields.clone();
        item.permissions = meta.permissions.clone();
        for (field, file) in meta.attachment_table() {
            item.attachments.push(Attachment {
                field_name: field.to_string(),
                file_name: file.to_string(),
                content_type: None,
                source: AttachmentSource::File(dir.join(file)),
            });
        }
    }

    item
}
