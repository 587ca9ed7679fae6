//! Filesystem implementation of the target-sink contract.

use std::path::{Path, PathBuf};

use metadata::{Metadata, MetadataFormat};
use model::{
    ContentItem, OverwritePolicy, RepoPath, Result, TargetSink, TransferError, WriteAction,
    WriteOutcome,
};
use tracing::debug;

use crate::METADATA_SUFFIX;

/// Configuration for an [`FsSink`].
#[derive(Clone, Debug)]
pub struct FsSinkConfig {
    /// Directory the tree is materialised under. Must already exist.
    pub output_dir: PathBuf,
    /// Optional rename applied to the written root item.
    pub root_name: Option<String>,
    /// Behaviour towards pre-existing artifacts.
    pub overwrite: OverwritePolicy,
    /// Surface format used for written metadata files.
    pub format: MetadataFormat,
}

impl FsSinkConfig {
    /// Default configuration writing under `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            root_name: None,
            overwrite: OverwritePolicy::default(),
            format: MetadataFormat::default(),
        }
    }
}

/// Target sink materialising items as directories, metadata files, and
/// attachment files, inverse to the layout the filesystem cursor reads.
///
/// Write failures caused by the environment (permissions, disk) are
/// reported through the outcome's `Failed` action rather than as errors,
/// so one bad item never aborts a run.
pub struct FsSink {
    config: FsSinkConfig,
    container: RepoPath,
}

impl FsSink {
    /// Opens a sink over the configured output directory.
    pub async fn open(config: FsSinkConfig) -> Result<Self> {
        let meta = tokio::fs::metadata(&config.output_dir)
            .await
            .map_err(|error| TransferError::io(config.output_dir.display().to_string(), error))?;
        if !meta.is_dir() {
            return Err(TransferError::InvalidState(format!(
                "target root '{}' is not a directory",
                config.output_dir.display()
            )));
        }
        Ok(Self {
            config,
            container: RepoPath::root(),
        })
    }

    fn fs_path(&self, path: &RepoPath) -> PathBuf {
        let mut full = self.config.output_dir.clone();
        for segment in path.segments() {
            full.push(segment);
        }
        full
    }

    /// Whether the item's primary artifact already exists on disk.
    async fn existed(&self, full: &Path, item: &ContentItem) -> bool {
        let probe = if item.folder || item.is_raw_attachment() {
            full.to_path_buf()
        } else {
            meta_path(full)
        };
        tokio::fs::metadata(&probe).await.is_ok()
    }

    async fn write_metadata(&self, full: &Path, path: &RepoPath, item: &ContentItem) -> Result<()> {
        let segment_name = path.name().unwrap_or_default();
        let meta = Metadata {
            type_name: item.type_name.clone(),
            name: (item.name != segment_name && !item.name.is_empty())
                .then(|| item.name.clone()),
            fields: item.fields.clone(),
            permissions: item.permissions.clone(),
        };
        let text = self.config.format.render(&meta);
        let target = meta_path(full);
        tokio::fs::write(&target, text)
            .await
            .map_err(|error| TransferError::io(target.display().to_string(), error))
    }

    /// Writes every attachment beside the item's metadata file.
    async fn write_attachments(&self, parent: &Path, item: &ContentItem) -> Result<()> {
        for attachment in &item.attachments {
            let bytes = attachment.open().await?;
            let target = parent.join(&attachment.file_name);
            tokio::fs::write(&target, bytes)
                .await
                .map_err(|error| TransferError::io(target.display().to_string(), error))?;
        }
        Ok(())
    }

    async fn write_item(&self, path: &RepoPath, item: &ContentItem) -> Result<()> {
        let full = self.fs_path(path);
        let parent = full
            .parent()
            .map_or_else(|| self.config.output_dir.clone(), Path::to_path_buf);

        if item.folder {
            if tokio::fs::metadata(&full).await.is_err() {
                tokio::fs::create_dir(&full)
                    .await
                    .map_err(|error| TransferError::io(full.display().to_string(), error))?;
            }
            if needs_metadata_file(path, item) {
                self.write_metadata(&full, path, item).await?;
            }
            self.write_attachments(&parent, item).await?;
        } else if item.is_raw_attachment() {
            let attachment = item
                .attachments
                .first()
                .ok_or_else(|| TransferError::InvalidState("raw item lost its attachment".into()))?;
            let bytes = attachment.open().await?;
            tokio::fs::write(&full, bytes)
                .await
                .map_err(|error| TransferError::io(full.display().to_string(), error))?;
        } else {
            self.write_metadata(&full, path, item).await?;
            self.write_attachments(&parent, item).await?;
        }
        Ok(())
    }
}

impl TargetSink for FsSink {
    fn container_path(&self) -> &RepoPath {
        &self.container
    }

    fn root_name(&self) -> Option<&str> {
        self.config.root_name.as_deref()
    }

    async fn write(&mut self, path: &RepoPath, item: &ContentItem) -> Result<WriteOutcome> {
        if path.is_root() {
            return Err(TransferError::InvalidState(
                "filesystem sink cannot write the container itself".to_string(),
            ));
        }
        let full = self.fs_path(path);
        let parent = full
            .parent()
            .map_or_else(|| self.config.output_dir.clone(), Path::to_path_buf);
        if tokio::fs::metadata(&parent)
            .await
            .map(|meta| !meta.is_dir())
            .unwrap_or(true)
        {
            return Ok(WriteOutcome::new(WriteAction::MissingParent, path.clone()));
        }

        let existed = self.existed(&full, item).await;
        if existed && self.config.overwrite == OverwritePolicy::SkipExisting {
            debug!(path = %path, "target exists, skipping by policy");
            return Ok(WriteOutcome::new(WriteAction::Skipped, path.clone()));
        }

        match self.write_item(path, item).await {
            Ok(()) => {
                let action = if existed {
                    WriteAction::Updated
                } else {
                    WriteAction::Created
                };
                Ok(WriteOutcome::new(action, path.clone()))
            }
            Err(error) => Ok(WriteOutcome::failed(path.clone(), error.to_string())),
        }
    }

    async fn should_skip_subtree(&mut self, path: &RepoPath) -> Result<bool> {
        // Children are writable only if the failed item still exists as a
        // directory on disk.
        let full = self.fs_path(path);
        Ok(tokio::fs::metadata(&full)
            .await
            .map(|meta| !meta.is_dir())
            .unwrap_or(true))
    }
}

fn meta_path(full: &Path) -> PathBuf {
    let mut file_name = full
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    file_name.push_str(METADATA_SUFFIX);
    full.with_file_name(file_name)
}

/// A plain folder with no fields, no permissions, and no rename carries
/// everything in the directory entry itself.
fn needs_metadata_file(path: &RepoPath, item: &ContentItem) -> bool {
    item.type_name != "Folder"
        || !item.fields.is_empty()
        || item.permissions.is_some()
        || path.name().is_some_and(|segment| segment != item.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FsCursor;
    use model::{
        Attachment, AttachmentSource, FieldValue, PermissionEntry, PermissionInfo, SourceCursor,
    };
    use std::sync::Arc;

    fn folder(name: &str) -> ContentItem {
        ContentItem::folder(name, "Folder")
    }

    fn raw_file(name: &str, bytes: &[u8]) -> ContentItem {
        let mut item = ContentItem {
            name: name.to_string(),
            type_name: "File".to_string(),
            ..ContentItem::default()
        };
        item.fields
            .insert("Binary".into(), FieldValue::Attachment(name.to_string()));
        item.attachments.push(Attachment {
            field_name: "Binary".into(),
            file_name: name.to_string(),
            content_type: None,
            source: AttachmentSource::Inline(Arc::new(bytes.to_vec())),
        });
        item
    }

    async fn open_sink(dir: &Path) -> FsSink {
        FsSink::open(FsSinkConfig::new(dir)).await.expect("open sink")
    }

    #[tokio::test]
    async fn creates_then_updates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sink = open_sink(temp.path()).await;
        let path = RepoPath::new("Root");

        let outcome = sink.write(&path, &folder("Root")).await.expect("first");
        assert_eq!(outcome.action, WriteAction::Created);
        assert!(temp.path().join("Root").is_dir());

        let outcome = sink.write(&path, &folder("Root")).await.expect("second");
        assert_eq!(outcome.action, WriteAction::Updated);
    }

    #[tokio::test]
    async fn skip_existing_policy_reports_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut config = FsSinkConfig::new(temp.path());
        config.overwrite = OverwritePolicy::SkipExisting;
        let mut sink = FsSink::open(config).await.expect("open");
        let path = RepoPath::new("Root");

        assert_eq!(
            sink.write(&path, &folder("Root")).await.expect("first").action,
            WriteAction::Created
        );
        assert_eq!(
            sink.write(&path, &folder("Root")).await.expect("second").action,
            WriteAction::Skipped
        );
    }

    #[tokio::test]
    async fn missing_parent_is_signalled_without_touching_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sink = open_sink(temp.path()).await;
        let path = RepoPath::new("Root/F1/File1");

        let outcome = sink.write(&path, &raw_file("File1", b"x")).await.expect("write");
        assert_eq!(outcome.action, WriteAction::MissingParent);
        assert!(!temp.path().join("Root").exists());
    }

    #[tokio::test]
    async fn raw_attachment_lands_as_a_plain_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sink = open_sink(temp.path()).await;
        sink.write(&RepoPath::new("Root"), &folder("Root")).await.expect("root");

        let outcome = sink
            .write(&RepoPath::new("Root/logo.png"), &raw_file("logo.png", b"png"))
            .await
            .expect("file");
        assert_eq!(outcome.action, WriteAction::Created);
        let on_disk = std::fs::read(temp.path().join("Root/logo.png")).expect("read");
        assert_eq!(on_disk, b"png");
        assert!(!temp.path().join("Root/logo.png.Content").exists());
    }

    #[tokio::test]
    async fn typed_item_writes_metadata_and_attachments() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sink = open_sink(temp.path()).await;
        sink.write(&RepoPath::new("Root"), &folder("Root")).await.expect("root");

        let mut item = ContentItem {
            name: "settings".into(),
            type_name: "Settings".into(),
            ..ContentItem::default()
        };
        item.fields
            .insert("Description".into(), FieldValue::String("site".into()));
        item.fields
            .insert("Binary".into(), FieldValue::Attachment("settings.json".into()));
        item.attachments.push(Attachment {
            field_name: "Binary".into(),
            file_name: "settings.json".into(),
            content_type: Some("application/json".into()),
            source: AttachmentSource::Inline(Arc::new(b"{}".to_vec())),
        });
        item.permissions = Some(PermissionInfo {
            is_inherited: false,
            entries: vec![PermissionEntry {
                identity: "/IMS/Admins".into(),
                local_only: false,
                permissions: [("Open".to_string(), "allow".to_string())].into(),
            }],
        });

        let outcome = sink
            .write(&RepoPath::new("Root/settings"), &item)
            .await
            .expect("write");
        assert_eq!(outcome.action, WriteAction::Created);

        let meta_text =
            std::fs::read_to_string(temp.path().join("Root/settings.Content")).expect("meta");
        let parsed = metadata::parse(&meta_text, "x").expect("parse").expect("some");
        assert_eq!(parsed.type_name, "Settings");
        assert!(parsed.permissions.is_some());
        let payload = std::fs::read(temp.path().join("Root/settings.json")).expect("payload");
        assert_eq!(payload, b"{}");
    }

    #[tokio::test]
    async fn plain_folder_gets_no_metadata_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sink = open_sink(temp.path()).await;
        sink.write(&RepoPath::new("Root"), &folder("Root")).await.expect("root");
        assert!(!temp.path().join("Root.Content").exists());

        let typed = ContentItem::folder("WS", "Workspace");
        sink.write(&RepoPath::new("Root/WS"), &typed).await.expect("ws");
        assert!(temp.path().join("Root/WS.Content").exists());
    }

    #[tokio::test]
    async fn failed_directory_invalidates_its_subtree() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sink = open_sink(temp.path()).await;
        assert!(sink
            .should_skip_subtree(&RepoPath::new("Root/never"))
            .await
            .expect("query"));

        sink.write(&RepoPath::new("Root"), &folder("Root")).await.expect("root");
        assert!(!sink
            .should_skip_subtree(&RepoPath::new("Root"))
            .await
            .expect("query"));
    }

    #[tokio::test]
    async fn written_tree_reads_back_in_order() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut sink = open_sink(temp.path()).await;
        sink.write(&RepoPath::new("Root"), &folder("Root")).await.expect("root");
        sink.write(&RepoPath::new("Root/Docs"), &folder("Docs")).await.expect("docs");
        sink.write(&RepoPath::new("Root/Docs/a.txt"), &raw_file("a.txt", b"a"))
            .await
            .expect("leaf");

        let mut cursor = FsCursor::open(temp.path().join("Root")).await.expect("cursor");
        let mut paths = Vec::new();
        while cursor.read_all(&[]).await.expect("read") {
            paths.push(cursor.relative_path().expect("path").as_str().to_string());
        }
        assert_eq!(paths, vec!["", "Docs", "Docs/a.txt"]);
    }
}
