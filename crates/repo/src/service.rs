//! The transport-facing contract a content repository backend fulfils.
//!
//! The cursor and sink in this crate are generic over
//! [`RepositoryService`], so the paging, retry, and noise-filtering logic
//! is written once and exercised against the in-memory backend in tests.

use model::{Attachment, ContentItem, RepoPath, Result};

/// One page request against a repository subtree.
///
/// Results are ordered by path ascending and resumed by keyset: every
/// returned path compares strictly greater than `after`. Offset-based
/// paging is deliberately absent, so concurrent writers shifting earlier
/// rows can never make the cursor skip or repeat items.
#[derive(Clone, Debug)]
pub struct SubtreeQuery {
    /// Absolute subtree root; only strict descendants are returned.
    pub subtree: RepoPath,
    /// Keyset position of the previous page's last row, if any.
    pub after: Option<RepoPath>,
    /// Maximum number of rows to return.
    pub page_size: usize,
    /// Subtree roots whose strict descendants are excluded server-side.
    /// The excluded root itself is still returned.
    pub exclude: Vec<RepoPath>,
    /// Optional backend filter expression ANDed into the query. The
    /// expression language belongs to the backend; rows it rejects are
    /// dropped server-side without disturbing the keyset.
    pub filter: Option<String>,
}

impl SubtreeQuery {
    /// First-page query over `subtree`.
    #[must_use]
    pub fn new(subtree: RepoPath, page_size: usize) -> Self {
        Self {
            subtree,
            after: None,
            page_size,
            exclude: Vec::new(),
            filter: None,
        }
    }
}

/// One row of a [`SubtreeQuery`] result page.
#[derive(Clone, Debug)]
pub struct RemoteItem {
    /// Absolute repository path of the item.
    pub path: RepoPath,
    /// The item itself.
    pub item: ContentItem,
}

/// Result of importing one item into the repository.
///
/// An import that succeeds structurally may still be incomplete: fields
/// referencing not-yet-transferred paths are left unset and reported in
/// `broken_references`, and a permission entry naming an absent identity
/// sets `retry_permissions`. Both are resolved by a later corrective
/// import of the same item.
#[derive(Clone, Debug, Default)]
pub struct ImportOutcome {
    /// Whether the item already existed and was updated in place.
    pub updated: bool,
    /// Fields whose reference target does not exist yet.
    pub broken_references: Vec<String>,
    /// Whether the permission descriptor must be re-applied later.
    pub retry_permissions: bool,
    /// Diagnostics produced by the backend.
    pub messages: Vec<String>,
}

/// Operations a repository backend exposes to the cursor and sink.
#[allow(async_fn_in_trait)]
pub trait RepositoryService {
    /// Fetches one page of strict descendants of a subtree.
    async fn query(&mut self, query: &SubtreeQuery) -> Result<Vec<RemoteItem>>;

    /// Fetches one item by exact path. An empty `fields` slice fetches
    /// everything; a non-empty slice restricts the field map (and the
    /// attachment streams) to the named fields.
    async fn load(&mut self, path: &RepoPath, fields: &[String]) -> Result<Option<ContentItem>>;

    /// Whether an item exists at `path`.
    async fn exists(&mut self, path: &RepoPath) -> Result<bool>;

    /// Creates or updates the item at `path` from its metadata.
    ///
    /// A partial import (broken references, deferred permissions) is a
    /// success at this level; outright rejection is an error.
    async fn import(&mut self, path: &RepoPath, item: &ContentItem) -> Result<ImportOutcome>;

    /// Uploads one attachment stream to the already-imported item at
    /// `path`.
    async fn upload(&mut self, path: &RepoPath, attachment: &Attachment) -> Result<()>;

    /// Number of items in the subtree rooted at `path`, itself included.
    /// Best effort; feeds progress percentages only.
    async fn count(&mut self, path: &RepoPath) -> Result<u64>;
}
