//! Common error type shared across the transfer workspace.

use std::io;

use thiserror::Error;

/// Result type for transfer operations.
pub type Result<T> = std::result::Result<T, TransferError>;

/// Errors surfaced by cursors, sinks, and the orchestrator.
#[derive(Debug, Error)]
pub enum TransferError {
    /// An I/O operation failed.
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Path the failing operation addressed.
        path: String,
        /// Underlying operating-system error.
        source: io::Error,
    },

    /// Metadata of a recognized format could not be parsed.
    ///
    /// Fatal for the single item being read; surfaced through the cursor.
    #[error("malformed {format} metadata at '{path}': {message}")]
    MetadataParse {
        /// Detected surface format ("tag" or "object").
        format: &'static str,
        /// Path of the offending metadata.
        path: String,
        /// Parser diagnostic.
        message: String,
    },

    /// The repository service rejected or failed an operation.
    #[error("repository error at '{path}': {message}")]
    Service {
        /// Path the failing operation addressed.
        path: String,
        /// Service diagnostic.
        message: String,
        /// Whether the failure is transient (throttling, timeout) and
        /// eligible for a bounded retry by the sink.
        transient: bool,
    },

    /// A cursor or sink was used outside its contract.
    #[error("invalid transfer state: {0}")]
    InvalidState(String),
}

impl TransferError {
    /// Builds an [`Io`](Self::Io) error for `path`.
    #[must_use]
    pub fn io(path: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Builds a permanent [`Service`](Self::Service) error.
    #[must_use]
    pub fn service(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            path: path.into(),
            message: message.into(),
            transient: false,
        }
    }

    /// Builds a transient [`Service`](Self::Service) error.
    #[must_use]
    pub fn throttled(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            path: path.into(),
            message: message.into(),
            transient: true,
        }
    }

    /// Reports whether a bounded retry may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Service { transient: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(TransferError::throttled("a", "429").is_transient());
        assert!(!TransferError::service("a", "validation").is_transient());
        assert!(!TransferError::io("a", io::Error::other("x")).is_transient());
    }

    #[test]
    fn display_names_path_and_format() {
        let error = TransferError::MetadataParse {
            format: "object",
            path: "Root/a.Content".into(),
            message: "unexpected token".into(),
        };
        let rendered = error.to_string();
        assert!(rendered.contains("object"));
        assert!(rendered.contains("Root/a.Content"));
    }
}
