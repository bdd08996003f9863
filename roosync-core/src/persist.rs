//! Shared-store persistence primitives.
//!
//! ## Atomic write protocol
//!
//! 1. Ensure the parent directory exists.
//! 2. Write to a `<name>.tmp` sibling (same filesystem, so rename is atomic).
//! 3. Rename over the final path; on failure remove the `.tmp`.
//!
//! ## Retry discipline
//!
//! Every shared-store operation runs on the blocking pool through
//! [`retry_io`]: each attempt is bounded by [`RetryPolicy::timeout`], failed
//! attempts are retried after [`RetryPolicy::delay`] up to
//! [`RetryPolicy::max_attempts`] in total. Nothing waits forever on a stalled
//! network share.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Bounded retry/timeout settings shared by every component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(200),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Failure of a shared-store operation after the retry budget was spent.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("I/O error at {path} after {attempts} attempt(s): {source}")]
    Io {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O at {path} timed out after {attempts} attempt(s) of {timeout_ms}ms")]
    TimedOut {
        path: PathBuf,
        attempts: u32,
        timeout_ms: u128,
    },

    #[error("JSON error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("blocking I/O task for {path} failed: {message}")]
    Join { path: PathBuf, message: String },
}

impl PersistError {
    pub fn path(&self) -> &Path {
        match self {
            PersistError::Io { path, .. }
            | PersistError::TimedOut { path, .. }
            | PersistError::Json { path, .. }
            | PersistError::Join { path, .. } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// Blocking primitives
// ---------------------------------------------------------------------------

/// Atomically replace `path` with `bytes`.
pub fn write_bytes_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = tmp_sibling(path);
    std::fs::write(&tmp, bytes)?;
    if let Err(err) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(err);
    }
    Ok(())
}

/// Read `path`, mapping "not found" to `None`.
pub fn read_optional(path: &Path) -> std::io::Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

/// `<path>.tmp`, next to `path`.
pub fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Async wrappers with retry
// ---------------------------------------------------------------------------

enum AttemptFailure {
    Io(std::io::Error),
    TimedOut,
}

/// Run a blocking filesystem operation under `policy`.
///
/// `op` is cloned for each attempt, so it must be cheap to clone (capture
/// `Arc`s and `PathBuf`s, not large buffers).
pub async fn retry_io<T, F>(policy: &RetryPolicy, path: &Path, op: F) -> Result<T, PersistError>
where
    T: Send + 'static,
    F: Fn() -> std::io::Result<T> + Clone + Send + 'static,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let task = tokio::task::spawn_blocking(op.clone());
        let failure = match tokio::time::timeout(policy.timeout, task).await {
            Ok(Ok(Ok(value))) => return Ok(value),
            Ok(Ok(Err(err))) => AttemptFailure::Io(err),
            Ok(Err(join)) => {
                return Err(PersistError::Join {
                    path: path.to_path_buf(),
                    message: join.to_string(),
                })
            }
            Err(_elapsed) => AttemptFailure::TimedOut,
        };

        if attempt >= max_attempts {
            return Err(match failure {
                AttemptFailure::Io(source) => PersistError::Io {
                    path: path.to_path_buf(),
                    attempts: attempt,
                    source,
                },
                AttemptFailure::TimedOut => PersistError::TimedOut {
                    path: path.to_path_buf(),
                    attempts: attempt,
                    timeout_ms: policy.timeout.as_millis(),
                },
            });
        }

        match &failure {
            AttemptFailure::Io(err) => tracing::warn!(
                path = %path.display(),
                attempt,
                max_attempts,
                error = %err,
                "shared-store I/O failed, retrying",
            ),
            AttemptFailure::TimedOut => tracing::warn!(
                path = %path.display(),
                attempt,
                max_attempts,
                "shared-store I/O timed out, retrying",
            ),
        }
        tokio::time::sleep(policy.delay).await;
    }
}

/// Serialize `value` as pretty JSON and atomically write it to `path`.
pub async fn persist_json<T: Serialize + ?Sized>(
    policy: &RetryPolicy,
    path: &Path,
    value: &T,
) -> Result<(), PersistError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| PersistError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let bytes = Arc::new(bytes);
    let target = path.to_path_buf();
    retry_io(policy, path, move || write_bytes_atomic(&target, &bytes)).await
}

/// Load and parse JSON from `path`; `Ok(None)` when the file does not exist.
pub async fn load_json<T: DeserializeOwned>(
    policy: &RetryPolicy,
    path: &Path,
) -> Result<Option<T>, PersistError> {
    let target = path.to_path_buf();
    let Some(bytes) = retry_io(policy, path, move || read_optional(&target)).await? else {
        return Ok(None);
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| PersistError::Json {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn atomic_write_cleans_up_tmp() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("file.json");
        write_bytes_atomic(&path, b"{}").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{}");
        assert!(!tmp_sibling(&path).exists(), ".tmp must be gone after rename");
    }

    #[test]
    fn read_optional_maps_missing_to_none() {
        let tmp = TempDir::new().unwrap();
        assert!(read_optional(&tmp.path().join("nope")).unwrap().is_none());
    }

    #[tokio::test]
    async fn persist_then_load_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("value.json");
        let policy = fast_policy(1);
        persist_json(&policy, &path, &serde_json::json!({"a": [1, 2]}))
            .await
            .unwrap();
        let loaded: Option<serde_json::Value> = load_json(&policy, &path).await.unwrap();
        assert_eq!(loaded, Some(serde_json::json!({"a": [1, 2]})));
    }

    #[tokio::test]
    async fn load_missing_is_none() {
        let tmp = TempDir::new().unwrap();
        let loaded: Option<serde_json::Value> =
            load_json(&fast_policy(1), &tmp.path().join("absent.json"))
                .await
                .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn load_garbage_is_json_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = load_json::<serde_json::Value>(&fast_policy(1), &path)
            .await
            .unwrap_err();
        assert!(matches!(err, PersistError::Json { .. }));
        assert_eq!(err.path(), path.as_path());
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = retry_io(&fast_policy(3), Path::new("/flaky"), move || {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(std::io::Error::other("transient"))
            } else {
                Ok(7)
            }
        })
        .await
        .unwrap();
        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = retry_io(&fast_policy(2), Path::new("/broken"), move || -> std::io::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(std::io::Error::other("down"))
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PersistError::Io { attempts: 2, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stalled_operation_times_out() {
        let policy = RetryPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(1),
            timeout: Duration::from_millis(20),
        };
        let err = retry_io(&policy, Path::new("/stalled"), || {
            std::thread::sleep(Duration::from_millis(300));
            Ok(())
        })
        .await
        .unwrap_err();
        assert!(matches!(err, PersistError::TimedOut { attempts: 1, .. }));
    }
}
