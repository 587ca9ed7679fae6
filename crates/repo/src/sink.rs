//! Repository implementation of the target-sink contract.

use std::time::Duration;

use model::{
    ContentItem, OverwritePolicy, RepoPath, Result, TargetSink, TransferError, WriteAction,
    WriteOutcome,
};
use tracing::warn;

use crate::service::RepositoryService;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(250);

/// Retries transient service failures with a growing delay; permanent
/// failures and exhausted budgets propagate unchanged.
async fn retry<T>(mut op: impl AsyncFnMut() -> Result<T>) -> Result<T> {
    let mut attempt = 1;
    loop {
        match op().await {
            Err(error) if error.is_transient() && attempt < MAX_ATTEMPTS => {
                warn!(attempt, %error, "transient repository failure, backing off");
                tokio::time::sleep(RETRY_DELAY * attempt).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Configuration for a [`RepoSink`].
#[derive(Clone, Debug)]
pub struct RepoSinkConfig {
    /// Absolute repository container everything is written underneath.
    pub container: RepoPath,
    /// Optional rename applied to the written root item.
    pub root_name: Option<String>,
    /// Behaviour towards pre-existing items.
    pub overwrite: OverwritePolicy,
}

impl RepoSinkConfig {
    /// Default configuration writing under `container`.
    #[must_use]
    pub fn new(container: RepoPath) -> Self {
        Self {
            container,
            root_name: None,
            overwrite: OverwritePolicy::default(),
        }
    }
}

/// Target sink importing items into a repository backend.
///
/// A structurally-accepted import that left references or permissions
/// unresolved is reported through the deferred actions (`Creating`,
/// `Updating`); a rejected import becomes a `Failed` outcome so one bad
/// item never aborts a run.
pub struct RepoSink<S> {
    service: S,
    config: RepoSinkConfig,
}

impl<S: RepositoryService> RepoSink<S> {
    /// Wraps `service` behind the sink contract.
    pub fn new(service: S, config: RepoSinkConfig) -> Self {
        Self { service, config }
    }

    /// Consumes the sink, returning the backend.
    pub fn into_service(self) -> S {
        self.service
    }
}

impl<S: RepositoryService> TargetSink for RepoSink<S> {
    fn container_path(&self) -> &RepoPath {
        &self.config.container
    }

    fn root_name(&self) -> Option<&str> {
        self.config.root_name.as_deref()
    }

    async fn write(&mut self, path: &RepoPath, item: &ContentItem) -> Result<WriteOutcome> {
        let absolute = self.config.container.append(path);
        let Some(parent) = absolute.parent() else {
            return Err(TransferError::InvalidState(
                "repository sink cannot write the repository root".to_string(),
            ));
        };
        let service = &mut self.service;

        if !retry(async || service.exists(&parent).await).await? {
            return Ok(WriteOutcome::new(WriteAction::MissingParent, path.clone()));
        }
        let existed = retry(async || service.exists(&absolute).await).await?;
        if existed && self.config.overwrite == OverwritePolicy::SkipExisting {
            return Ok(WriteOutcome::new(WriteAction::Skipped, path.clone()));
        }

        let import = match retry(async || service.import(&absolute, item).await).await {
            Ok(import) => import,
            Err(error) => return Ok(WriteOutcome::failed(path.clone(), error.to_string())),
        };
        let mut messages = import.messages;

        for attachment in &item.attachments {
            if let Err(error) = retry(async || service.upload(&absolute, attachment).await).await {
                messages.push(format!(
                    "upload of '{}' failed: {error}",
                    attachment.field_name
                ));
                return Ok(WriteOutcome {
                    action: WriteAction::Failed,
                    writer_path: path.clone(),
                    messages,
                    ..WriteOutcome::default()
                });
            }
        }

        let mut outcome = WriteOutcome {
            action: if existed {
                WriteAction::Updated
            } else {
                WriteAction::Created
            },
            writer_path: path.clone(),
            broken_references: import.broken_references,
            retry_permissions: import.retry_permissions,
            messages,
            ..WriteOutcome::default()
        };
        if outcome.update_required() {
            outcome.action = outcome.action.deferred();
        }
        Ok(outcome)
    }

    async fn should_skip_subtree(&mut self, path: &RepoPath) -> Result<bool> {
        let absolute = self.config.container.append(path);
        let service = &mut self.service;
        Ok(!retry(async || service.exists(&absolute).await).await?)
    }
}
