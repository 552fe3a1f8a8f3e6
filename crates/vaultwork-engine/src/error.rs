//! Error types for the orchestration engine.

use std::path::PathBuf;

use crate::state_machine::Actor;
use vaultwork_core::error::VaultError;
use vaultwork_core::{RecordKind, Status};

/// Errors from parsing a record's header block.
///
/// A record that fails to parse is corrupt: stages skip it, log, and look
/// at it again on the next tick. It is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Missing header block: record must start with a '---' line")]
    MissingHeader,
    #[error("Unterminated header block: no closing '---' line")]
    UnterminatedHeader,
    #[error("Malformed header line {line}: {content:?}")]
    MalformedLine { line: usize, content: String },
    #[error("Empty key on header line {line}")]
    EmptyKey { line: usize },
    #[error("Missing status field")]
    MissingStatus,
    #[error("Status {status:?} is not legal for {kind} records")]
    IllegalStatus { status: String, kind: RecordKind },
}

/// Errors from vault store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Corrupt record {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: ParseError,
    },
    #[error("Invalid file pattern: {0}")]
    InvalidPattern(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the file disappeared, typically moved by another stage.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// A transition that is not in the state table for the record's kind.
///
/// Stages treat this as "not mine to act on" and skip silently.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid state transition for {kind}: {from} -> {to} by {actor}")]
pub struct TransitionRejected {
    pub kind: RecordKind,
    pub from: Status,
    pub to: Status,
    pub actor: Actor,
}

/// Errors from the dedup cache.
#[derive(Debug, thiserror::Error)]
pub enum DedupError {
    #[error("Dedup cache I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Dedup cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors reported by external collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("Collaborator call failed: {0}")]
    Failed(String),
    #[error("Collaborator call timed out after {0} seconds")]
    Timeout(u64),
    #[error("Collaborator returned an invalid response: {0}")]
    InvalidResponse(String),
}

/// Errors that abort a whole stage tick (as opposed to a single record).
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Dedup error: {0}")]
    Dedup(#[from] DedupError),
    #[error("Ingest source {source_name} failed: {message}")]
    Source { source_name: String, message: String },
}

impl From<StoreError> for VaultError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Io { source, .. } => VaultError::Io(source),
            other => VaultError::Vault(other.to_string()),
        }
    }
}

impl From<ParseError> for VaultError {
    fn from(err: ParseError) -> Self {
        VaultError::Record(err.to_string())
    }
}

impl From<TransitionRejected> for VaultError {
    fn from(err: TransitionRejected) -> Self {
        VaultError::Record(err.to_string())
    }
}

impl From<DedupError> for VaultError {
    fn from(err: DedupError) -> Self {
        match err {
            DedupError::Io { source, .. } => VaultError::Io(source),
            DedupError::Serialization(e) => VaultError::Serialization(e.to_string()),
        }
    }
}

impl From<CollaboratorError> for VaultError {
    fn from(err: CollaboratorError) -> Self {
        VaultError::Collaborator(err.to_string())
    }
}

impl From<StageError> for VaultError {
    fn from(err: StageError) -> Self {
        match err {
            StageError::Store(e) => e.into(),
            StageError::Dedup(e) => e.into(),
            other => VaultError::Vault(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        assert_eq!(
            ParseError::UnterminatedHeader.to_string(),
            "Unterminated header block: no closing '---' line"
        );
        let err = ParseError::MalformedLine {
            line: 3,
            content: "no separator".to_string(),
        };
        assert_eq!(err.to_string(), "Malformed header line 3: \"no separator\"");
        let err = ParseError::IllegalStatus {
            status: "sent".to_string(),
            kind: RecordKind::Plan,
        };
        assert_eq!(err.to_string(), "Status \"sent\" is not legal for plan records");
    }

    #[test]
    fn test_store_error_not_found() {
        let err = StoreError::io(
            "/vault/Drafts/DRAFT_1.md",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());
        assert!(err.to_string().contains("/vault/Drafts/DRAFT_1.md"));

        let err = StoreError::io(
            "/vault/Drafts/DRAFT_1.md",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked"),
        );
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_transition_rejected_display() {
        let err = TransitionRejected {
            kind: RecordKind::Draft,
            from: Status::Sent,
            to: Status::Approved,
            actor: Actor::Send,
        };
        assert_eq!(
            err.to_string(),
            "Invalid state transition for draft: sent -> approved by send"
        );
    }

    #[test]
    fn test_collaborator_error_display() {
        assert_eq!(
            CollaboratorError::Timeout(30).to_string(),
            "Collaborator call timed out after 30 seconds"
        );
        assert_eq!(
            CollaboratorError::Failed("smtp 550".to_string()).to_string(),
            "Collaborator call failed: smtp 550"
        );
    }

    #[test]
    fn test_conversions_into_vault_error() {
        let err: VaultError = StoreError::io(
            "/x",
            std::io::Error::new(std::io::ErrorKind::Other, "disk"),
        )
        .into();
        assert!(matches!(err, VaultError::Io(_)));

        let err: VaultError = ParseError::MissingStatus.into();
        assert!(matches!(err, VaultError::Record(_)));

        let err: VaultError = CollaboratorError::Unavailable("offline".to_string()).into();
        assert!(matches!(err, VaultError::Collaborator(_)));
    }
}
