use std::path::PathBuf;

use thiserror::Error;

/// Error surface of the daemon runtime.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("config error: {0}")]
    Config(#[from] roosync_core::ConfigError),

    #[error("commit log error: {0}")]
    CommitLog(#[from] roosync_sync::CommitLogError),

    #[error("reconciliation error: {0}")]
    Policy(#[from] roosync_sync::PolicyError),

    #[error("baseline error: {0}")]
    Baseline(#[from] roosync_baseline::BaselineError),

    #[error("{task} task failed: {message}")]
    Task { task: &'static str, message: String },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> DaemonError {
    DaemonError::Io {
        path: path.into(),
        source,
    }
}
