//! Repository implementation of the source-cursor contract.

use std::collections::VecDeque;

use model::{
    ContentItem, CutoffSet, PositionedItem, RepoPath, Result, SourceCursor, TransferError,
    TransferTask,
};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::service::{RemoteItem, RepositoryService, SubtreeQuery};

/// Path segments that mark repository housekeeping content; items under
/// them never travel.
const NOISE_SEGMENTS: [&str; 2] = ["Previews", "Versions"];

fn is_noise(path: &RepoPath) -> bool {
    path.segments()
        .any(|segment| NOISE_SEGMENTS.contains(&segment))
}

/// Resumable position of one subtree traversal.
///
/// The keyset position advances with every raw page row, before any
/// client-side filtering, so noise items and freshly-registered cutoffs
/// never disturb where the next page starts.
struct SubtreeState {
    /// Absolute subtree root in the repository.
    base: RepoPath,
    /// The same root, relative to the cursor root.
    rel: RepoPath,
    pending_root: bool,
    after: Option<RepoPath>,
    buffer: VecDeque<RemoteItem>,
    no_more_pages: bool,
}

impl SubtreeState {
    fn new(base: RepoPath, rel: RepoPath) -> Self {
        Self {
            base,
            rel,
            pending_root: true,
            after: None,
            buffer: VecDeque::new(),
            no_more_pages: false,
        }
    }
}

/// Lazy pre-order cursor over a repository subtree, paging children by
/// keyset.
pub struct RepoCursor<S> {
    service: S,
    root: RepoPath,
    page_size: usize,
    filter: Option<String>,
    cutoffs: CutoffSet,
    all: SubtreeState,
    subtrees: FxHashMap<RepoPath, SubtreeState>,
    replay: Option<ReplayState>,
    current: Option<PositionedItem>,
    estimate: u64,
}

struct ReplayState {
    tasks: Vec<TransferTask>,
    index: usize,
}

impl<S: RepositoryService> RepoCursor<S> {
    /// Opens a cursor over the subtree rooted at the absolute repository
    /// path `root`.
    pub async fn open(mut service: S, root: RepoPath, page_size: usize) -> Result<Self> {
        let page_size = page_size.max(1);
        let estimate = match service.count(&root).await {
            Ok(count) => count,
            Err(error) => {
                debug!(%error, "subtree count unavailable, progress will lack a total");
                0
            }
        };
        Ok(Self {
            service,
            all: SubtreeState::new(root.clone(), RepoPath::root()),
            root,
            page_size,
            filter: None,
            cutoffs: CutoffSet::new(),
            subtrees: FxHashMap::default(),
            replay: None,
            current: None,
            estimate,
        })
    }

    /// Installs a backend filter expression ANDed into every page query
    /// this cursor issues. The subtree roots themselves are loaded by
    /// exact path and bypass the filter.
    #[must_use]
    pub fn with_filter(mut self, expression: impl Into<String>) -> Self {
        self.filter = Some(expression.into());
        self
    }

    /// Consumes the cursor, returning the backend.
    pub fn into_service(self) -> S {
        self.service
    }
}

async fn advance<S: RepositoryService>(
    service: &mut S,
    state: &mut SubtreeState,
    root: &RepoPath,
    cutoffs: &CutoffSet,
    excluded: &[RepoPath],
    page_size: usize,
    filter: Option<&str>,
) -> Result<Option<PositionedItem>> {
    if state.pending_root {
        state.pending_root = false;
        let Some(mut item) = service.load(&state.base, &[]).await? else {
            state.no_more_pages = true;
            return Ok(None);
        };
        if cutoffs.is_strictly_under_any(&state.rel) {
            state.no_more_pages = true;
            return Ok(None);
        }
        if cutoffs.contains(&state.rel) {
            item.cut_off = true;
            state.no_more_pages = true;
        }
        return Ok(Some(PositionedItem {
            relative_path: state.rel.clone(),
            item,
        }));
    }

    loop {
        while let Some(row) = state.buffer.pop_front() {
            let Some(rel) = row.path.strip_prefix(root) else {
                continue;
            };
            if is_noise(&rel) || cutoffs.is_strictly_under_any(&rel) {
                continue;
            }
            if excluded.iter().any(|prefix| rel.is_under(prefix)) {
                continue;
            }
            let mut item = row.item;
            if cutoffs.contains(&rel) {
                item.cut_off = true;
            }
            return Ok(Some(PositionedItem {
                relative_path: rel,
                item,
            }));
        }
        if state.no_more_pages {
            return Ok(None);
        }

        // Active cutoffs join the server-side exclusion list so pages
        // inside a cut-off subtree are never fetched; the cutoff root
        // itself still comes back per the query contract.
        let query = SubtreeQuery {
            subtree: state.base.clone(),
            after: state.after.clone(),
            page_size,
            exclude: excluded
                .iter()
                .chain(cutoffs.entries())
                .map(|rel| root.append(rel))
                .collect(),
            filter: filter.map(str::to_string),
        };
        let rows = service.query(&query).await?;
        if rows.len() < page_size {
            state.no_more_pages = true;
        }
        if let Some(last) = rows.last() {
            state.after = Some(last.path.clone());
        }
        state.buffer.extend(rows);
    }
}

impl<S: RepositoryService> SourceCursor for RepoCursor<S> {
    async fn read_all(&mut self, excluded: &[RepoPath]) -> Result<bool> {
        self.current = advance(
            &mut self.service,
            &mut self.all,
            &self.root,
            &self.cutoffs,
            excluded,
            self.page_size,
            self.filter.as_deref(),
        )
        .await?;
        // Once no other traversal can revisit earlier sort positions,
        // cutoffs the keyset has moved past can no longer match anything.
        if let Some(positioned) = &self.current {
            let subtrees_drained = self
                .subtrees
                .values()
                .all(|state| state.no_more_pages && state.buffer.is_empty());
            if subtrees_drained {
                self.cutoffs.prune_before(&positioned.relative_path);
            }
        }
        Ok(self.current.is_some())
    }

    async fn read_subtree(&mut self, subtree: &RepoPath) -> Result<bool> {
        let state = self.subtrees.entry(subtree.clone()).or_insert_with(|| {
            SubtreeState::new(self.root.append(subtree), subtree.clone())
        });
        self.current = advance(
            &mut self.service,
            state,
            &self.root,
            &self.cutoffs,
            &[],
            self.page_size,
            self.filter.as_deref(),
        )
        .await?;
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

        let absolute = self.root.append(&task.reader_path);
        let item: Option<ContentItem> = self
            .service
            .load(&absolute, &task.broken_references)
            .await?;
        let Some(mut item) = item else {
            return Err(TransferError::InvalidState(format!(
                "item at '{absolute}' vanished before its reference fixup"
            )));
        };
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
        self.estimate
    }
}
