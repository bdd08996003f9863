//! Error types for roosync-sync.

use std::path::PathBuf;

use thiserror::Error;

use roosync_core::{CommitStatus, PersistError};

/// Errors raised by [`crate::CommitLog`].
#[derive(Debug, Error)]
pub enum CommitLogError {
    /// The log failed to load and refuses every operation.
    #[error("commit log unavailable: {0}")]
    Unavailable(String),

    #[error("commit {0} not found")]
    NotFound(u64),

    #[error("commit {sequence}: illegal transition {from} -> {to}")]
    InvalidTransition {
        sequence: u64,
        from: CommitStatus,
        to: CommitStatus,
    },

    /// Malformed input; nothing was persisted.
    #[error("invalid commit: {0}")]
    Validation(String),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("cannot encode commit payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised by [`crate::RollbackManager`].
#[derive(Debug, Error)]
pub enum RollbackError {
    #[error("rollback point for '{decision_id}' already exists at {path}")]
    AlreadyExists { decision_id: String, path: PathBuf },

    #[error("no rollback point for '{0}'")]
    NotFound(String),

    #[error("invalid decision id '{0}': use only [A-Za-z0-9._-]")]
    InvalidDecisionId(String),

    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Errors raised by [`crate::ReconciliationPolicy`].
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("commit log error: {0}")]
    CommitLog(#[from] CommitLogError),

    #[error("rollback error: {0}")]
    Rollback(#[from] RollbackError),

    /// Some files could not be put back; the entry stays APPLIED.
    #[error("restore for '{decision_id}' incomplete: {}", logs.join("; "))]
    RestoreIncomplete {
        decision_id: String,
        logs: Vec<String>,
    },

    #[error("config applier task failed: {0}")]
    Applier(String),
}
