//! Rollback points: byte-exact copies of the files a change is about to touch.
//!
//! ```text
//! <local_root>/rollback/<decision_id>/
//!   rollback.json                         manifest (RollbackPoint)
//!   files/000-<name>.<timestamp>.bak      one copy per backed-up file
//! ```
//!
//! A point is written once and never overwritten; creating a point whose
//! directory already exists fails. Points are only removed explicitly.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use roosync_core::digest::sha256_hex;
use roosync_core::paths::ROLLBACK_MANIFEST_FILE;
use roosync_core::persist::{load_json, read_optional, retry_io, write_bytes_atomic};
use roosync_core::{PersistError, RetryPolicy};

use crate::error::RollbackError;

const BACKUP_SUBDIR: &str = "files";

/// One file captured by a rollback point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackedUpFile {
    pub original: PathBuf,
    /// `false` when the file did not exist; restoring then removes it.
    pub existed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default)]
    pub size: u64,
}

/// Manifest of a rollback point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackPoint {
    pub decision_id: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<BackedUpFile>,
}

/// Outcome of a restore. `success` only if every file was put back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreReport {
    pub success: bool,
    pub restored_files: Vec<PathBuf>,
    pub logs: Vec<String>,
}

/// Creates and restores rollback points under one root directory.
#[derive(Debug)]
pub struct RollbackManager {
    root: PathBuf,
    policy: RetryPolicy,
    lock: Mutex<()>,
}

impl RollbackManager {
    pub fn new(root: PathBuf, policy: RetryPolicy) -> Self {
        Self {
            root,
            policy,
            lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn point_dir(&self, decision_id: &str) -> PathBuf {
        self.root.join(decision_id)
    }

    /// Copy `files` into a new rollback point for `decision_id`.
    ///
    /// Files that do not exist yet are recorded as absent.
    pub async fn create_rollback_point(
        &self,
        decision_id: &str,
        files: &[PathBuf],
    ) -> Result<RollbackPoint, RollbackError> {
        validate_decision_id(decision_id)?;
        let _guard = self.lock.lock().await;
        let point_dir = self.point_dir(decision_id);

        // Creation is not idempotent: one attempt, still bounded by the timeout.
        let once = RetryPolicy {
            max_attempts: 1,
            ..self.policy
        };
        let dir = point_dir.clone();
        let id = decision_id.to_string();
        let files = files.to_vec();
        match retry_io(&once, &point_dir, move || write_point(&dir, &id, &files)).await {
            Ok(point) => {
                tracing::info!(
                    decision_id,
                    files = point.files.len(),
                    "rollback point created",
                );
                Ok(point)
            }
            Err(PersistError::Io { source, .. }) if source.kind() == ErrorKind::AlreadyExists => {
                Err(RollbackError::AlreadyExists {
                    decision_id: decision_id.to_string(),
                    path: point_dir,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Restore every file of the point for `decision_id`.
    pub async fn restore_from_rollback_point(
        &self,
        decision_id: &str,
    ) -> Result<RestoreReport, RollbackError> {
        self.restore_with(decision_id, |_| {}).await
    }

    /// Like [`restore_from_rollback_point`](Self::restore_from_rollback_point),
    /// calling `on_restored` once every restore attempt has finished.
    pub async fn restore_with(
        &self,
        decision_id: &str,
        on_restored: impl FnOnce(&RestoreReport),
    ) -> Result<RestoreReport, RollbackError> {
        validate_decision_id(decision_id)?;
        let _guard = self.lock.lock().await;
        let point_dir = self.point_dir(decision_id);
        let point: RollbackPoint = load_json(&self.policy, &point_dir.join(ROLLBACK_MANIFEST_FILE))
            .await?
            .ok_or_else(|| RollbackError::NotFound(decision_id.to_string()))?;

        let mut report = RestoreReport::default();
        for file in &point.files {
            let dir = point_dir.clone();
            let backed_up = file.clone();
            match retry_io(&self.policy, &file.original, move || {
                restore_file(&dir, &backed_up)
            })
            .await
            {
                Ok(action) => {
                    report.restored_files.push(file.original.clone());
                    report
                        .logs
                        .push(format!("{action} {}", file.original.display()));
                }
                Err(err) => {
                    tracing::warn!(
                        decision_id,
                        path = %file.original.display(),
                        error = %err,
                        "file not restored",
                    );
                    report
                        .logs
                        .push(format!("failed {}: {err}", file.original.display()));
                }
            }
        }
        report.success = report.restored_files.len() == point.files.len();
        tracing::info!(
            decision_id,
            restored = report.restored_files.len(),
            total = point.files.len(),
            "rollback point restored",
        );
        on_restored(&report);
        Ok(report)
    }

    pub async fn get_rollback_point(
        &self,
        decision_id: &str,
    ) -> Result<Option<RollbackPoint>, RollbackError> {
        validate_decision_id(decision_id)?;
        let manifest = self.point_dir(decision_id).join(ROLLBACK_MANIFEST_FILE);
        Ok(load_json(&self.policy, &manifest).await?)
    }

    pub async fn has_rollback_point(&self, decision_id: &str) -> Result<bool, RollbackError> {
        Ok(self.get_rollback_point(decision_id).await?.is_some())
    }

    /// Every readable point, oldest first. Unreadable manifests are skipped.
    pub async fn list_rollback_points(&self) -> Result<Vec<RollbackPoint>, RollbackError> {
        let root = self.root.clone();
        let ids = retry_io(&self.policy, &self.root, move || list_point_dirs(&root)).await?;

        let mut points = Vec::with_capacity(ids.len());
        for id in ids {
            let manifest = self.point_dir(&id).join(ROLLBACK_MANIFEST_FILE);
            match load_json::<RollbackPoint>(&self.policy, &manifest).await {
                Ok(Some(point)) => points.push(point),
                Ok(None) => {}
                Err(err) => tracing::warn!(decision_id = %id, error = %err, "skipping unreadable rollback point"),
            }
        }
        points.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.decision_id.cmp(&b.decision_id))
        });
        Ok(points)
    }

    /// Delete a point. Returns `false` if it did not exist.
    pub async fn remove_rollback_point(&self, decision_id: &str) -> Result<bool, RollbackError> {
        validate_decision_id(decision_id)?;
        let _guard = self.lock.lock().await;
        let dir = self.point_dir(decision_id);
        let target = dir.clone();
        let removed = retry_io(&self.policy, &dir, move || {
            match std::fs::remove_dir_all(&target) {
                Ok(()) => Ok(true),
                Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
                Err(err) => Err(err),
            }
        })
        .await?;
        if removed {
            tracing::info!(decision_id, "rollback point removed");
        }
        Ok(removed)
    }
}

fn validate_decision_id(decision_id: &str) -> Result<(), RollbackError> {
    let valid = !decision_id.is_empty()
        && decision_id != "."
        && decision_id != ".."
        && decision_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(RollbackError::InvalidDecisionId(decision_id.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Blocking helpers
// ---------------------------------------------------------------------------

fn write_point(dir: &Path, decision_id: &str, files: &[PathBuf]) -> std::io::Result<RollbackPoint> {
    if let Some(parent) = dir.parent() {
        std::fs::create_dir_all(parent)?;
    }
    // Fails with AlreadyExists when the point is already there.
    std::fs::create_dir(dir)?;
    match fill_point(dir, decision_id, files) {
        Ok(point) => Ok(point),
        Err(err) => {
            let _ = std::fs::remove_dir_all(dir);
            Err(err)
        }
    }
}

fn fill_point(dir: &Path, decision_id: &str, files: &[PathBuf]) -> std::io::Result<RollbackPoint> {
    let created_at = Utc::now();
    let stamp = created_at.format("%Y%m%dT%H%M%S");
    let backups = dir.join(BACKUP_SUBDIR);

    let mut captured = Vec::with_capacity(files.len());
    for (index, original) in files.iter().enumerate() {
        match read_optional(original)? {
            Some(bytes) => {
                let name = original
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "file".to_string());
                let backup = format!("{index:03}-{name}.{stamp}.bak");
                write_bytes_atomic(&backups.join(&backup), &bytes)?;
                captured.push(BackedUpFile {
                    original: original.clone(),
                    existed: true,
                    backup: Some(backup),
                    sha256: Some(sha256_hex(&bytes)),
                    size: bytes.len() as u64,
                });
            }
            None => captured.push(BackedUpFile {
                original: original.clone(),
                existed: false,
                backup: None,
                sha256: None,
                size: 0,
            }),
        }
    }

    let point = RollbackPoint {
        decision_id: decision_id.to_string(),
        created_at,
        files: captured,
    };
    let manifest = serde_json::to_vec_pretty(&point).map_err(std::io::Error::other)?;
    write_bytes_atomic(&dir.join(ROLLBACK_MANIFEST_FILE), &manifest)?;
    Ok(point)
}

fn restore_file(dir: &Path, file: &BackedUpFile) -> std::io::Result<&'static str> {
    if !file.existed {
        return match std::fs::remove_file(&file.original) {
            Ok(()) => Ok("removed"),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok("left absent"),
            Err(err) => Err(err),
        };
    }
    let Some(backup) = &file.backup else {
        return Err(std::io::Error::new(
            ErrorKind::InvalidData,
            "manifest entry has no backup copy",
        ));
    };
    let bytes = std::fs::read(dir.join(BACKUP_SUBDIR).join(backup))?;
    if let Some(expected) = &file.sha256 {
        if sha256_hex(&bytes) != *expected {
            return Err(std::io::Error::new(
                ErrorKind::InvalidData,
                format!("backup {backup} does not match its recorded hash"),
            ));
        }
    }
    write_bytes_atomic(&file.original, &bytes)?;
    Ok("restored")
}

fn list_point_dirs(root: &Path) -> std::io::Result<Vec<String>> {
    let read_dir = match std::fs::read_dir(root) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut ids = Vec::new();
    for item in read_dir {
        let item = item?;
        if item.file_type()?.is_dir() {
            if let Some(name) = item.file_name().to_str() {
                ids.push(name.to_string());
            }
        }
    }
    ids.sort();
    Ok(ids)
}
