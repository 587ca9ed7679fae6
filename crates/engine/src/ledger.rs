//! Record of items that need a corrective second write pass.

use std::path::PathBuf;

use model::{Result, TransferError, TransferTask};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// The reference-fixup ledger.
///
/// Tasks accumulate in creation order during the main pass and are
/// replayed exactly once by the fixup phase. With a journal attached,
/// every task is additionally appended to a JSON-lines file as it is
/// recorded, so an interrupted run leaves an inspectable record.
pub struct Ledger {
    tasks: Vec<TransferTask>,
    journal: Option<Journal>,
}

struct Journal {
    path: PathBuf,
    file: tokio::fs::File,
}

impl Ledger {
    /// Creates a ledger without durable backing.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            tasks: Vec::new(),
            journal: None,
        }
    }

    /// Creates a ledger that appends every recorded task to the
    /// JSON-lines file at `path`, creating the file if necessary.
    pub async fn with_journal(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|error| TransferError::io(path.display().to_string(), error))?;
        Ok(Self {
            tasks: Vec::new(),
            journal: Some(Journal { path, file }),
        })
    }

    /// Appends one task, journaling it first when a journal is attached.
    pub async fn record(&mut self, task: TransferTask) -> Result<()> {
        if let Some(journal) = self.journal.as_mut() {
            let mut line = serde_json::to_string(&task).map_err(|error| {
                TransferError::InvalidState(format!("unserializable transfer task: {error}"))
            })?;
            line.push('\n');
            journal
                .file
                .write_all(line.as_bytes())
                .await
                .map_err(|error| TransferError::io(journal.path.display().to_string(), error))?;
            journal
                .file
                .flush()
                .await
                .map_err(|error| TransferError::io(journal.path.display().to_string(), error))?;
        }
        debug!(reader = %task.reader_path, "recorded reference fixup task");
        self.tasks.push(task);
        Ok(())
    }

    /// Tasks recorded so far, in creation order.
    #[must_use]
    pub fn tasks(&self) -> &[TransferTask] {
        &self.tasks
    }

    /// Number of recorded tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether no task has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Reads a journal file back into a task list, skipping blank lines.
    pub async fn load_journal(path: impl Into<PathBuf>) -> Result<Vec<TransferTask>> {
        let path = path.into();
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|error| TransferError::io(path.display().to_string(), error))?;
        let mut tasks = Vec::new();
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            let task = serde_json::from_str(line).map_err(|error| {
                TransferError::InvalidState(format!(
                    "malformed ledger line in '{}': {error}",
                    path.display()
                ))
            })?;
            tasks.push(task);
        }
        Ok(tasks)
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::in_memory()
    }
}
