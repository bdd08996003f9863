//! Append-only, sequence-numbered commit log in the shared store.
//!
//! ## Layout
//!
//! ```text
//! <shared>/commit-log/<machine>/
//!   0000001.json   one CommitEntry per file (authoritative)
//!   0000002.json
//!   state.json     aggregate snapshot, rewritten after every mutation
//! ```
//!
//! ## Concurrency
//!
//! A single writer lock serializes every mutation, so sequence numbers are
//! assigned without gaps or duplicates even under concurrent callers. Each
//! mutation persists its record file before the in-memory state changes: a
//! failed write leaves memory untouched.
//!
//! ## Readiness
//!
//! [`CommitLog::open`] returns immediately and loads in the background. Every
//! operation first awaits the readiness gate; if loading failed, operations
//! fail with [`CommitLogError::Unavailable`] instead of running against an
//! empty log.

use std::collections::{BTreeMap, BTreeSet};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use roosync_core::commit::CommitRecord;
use roosync_core::paths;
use roosync_core::persist::{read_optional, retry_io, write_bytes_atomic};
use roosync_core::{
    CommitEntry, CommitLogState, CommitPayload, CommitStatistics, CommitStatus, MachineId,
    PersistError, RetryPolicy, SyncConfig,
};

use crate::error::CommitLogError;

// ---------------------------------------------------------------------------
// Public result types
// ---------------------------------------------------------------------------

/// Returned by [`CommitLog::append_commit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppendReceipt {
    pub sequence_number: u64,
    pub content_hash: String,
}

/// Result of a status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub entry: CommitEntry,
    /// `false` when the entry was already in the target state (idempotent apply).
    pub changed: bool,
}

/// Returned by [`CommitLog::get_latest_commits`]: newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestCommits {
    pub entries: Vec<CommitEntry>,
    pub total_count: usize,
}

/// Per-entry outcome of [`CommitLog::apply_pending_commits`].
#[derive(Debug)]
pub struct PendingApplication {
    pub sequence_number: u64,
    pub result: Result<TransitionOutcome, CommitLogError>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InconsistentEntry {
    pub sequence_number: u64,
    pub issue: String,
}

/// Returned by [`CommitLog::verify_consistency`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsistencyReport {
    pub is_consistent: bool,
    pub inconsistent_entries: Vec<InconsistentEntry>,
}

// ---------------------------------------------------------------------------
// CommitLog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Loading,
    Ready,
    Failed(String),
}

struct AutoSync {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct Inner {
    dir: PathBuf,
    policy: RetryPolicy,
    auto_sync_interval: Duration,
    state: RwLock<CommitLogState>,
    writer: Mutex<()>,
    ready: watch::Sender<Readiness>,
    auto_sync: StdMutex<Option<AutoSync>>,
}

/// Handle to one machine's commit log. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CommitLog {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CommitLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitLog")
            .field("dir", &self.inner.dir)
            .finish_non_exhaustive()
    }
}

impl CommitLog {
    /// Open the log of `config.machine_id` and start loading it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open(config: &SyncConfig) -> Self {
        Self::open_at(
            config.commit_log_dir(),
            config.retry_policy(),
            config.auto_sync_interval(),
        )
    }

    /// Open the log stored in `dir`.
    pub fn open_at(dir: PathBuf, policy: RetryPolicy, auto_sync_interval: Duration) -> Self {
        let (ready, _) = watch::channel(Readiness::Loading);
        let log = Self {
            inner: Arc::new(Inner {
                dir,
                policy,
                auto_sync_interval,
                state: RwLock::new(CommitLogState::default()),
                writer: Mutex::new(()),
                ready,
                auto_sync: StdMutex::new(None),
            }),
        };
        let loader = log.clone();
        tokio::spawn(async move { loader.load().await });
        log
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    async fn load(&self) {
        let readiness = match scan(&self.inner.policy, &self.inner.dir).await {
            Ok(scanned) => {
                for issue in &scanned.issues {
                    tracing::warn!(
                        sequence = issue.sequence_number,
                        issue = %issue.issue,
                        "excluding corrupted commit entry",
                    );
                }
                if let Some(problem) = &scanned.snapshot_issue {
                    tracing::warn!(issue = %problem, "ignoring unreadable commit log snapshot");
                }
                let mut state = self.inner.state.write().await;
                *state = scanned.into_state();
                tracing::info!(
                    dir = %self.inner.dir.display(),
                    entries = state.statistics.total_entries,
                    current_sequence = state.current_sequence_number,
                    "commit log loaded",
                );
                Readiness::Ready
            }
            Err(err) => {
                tracing::error!(dir = %self.inner.dir.display(), error = %err, "commit log failed to load");
                Readiness::Failed(err.to_string())
            }
        };
        self.inner.ready.send_replace(readiness);
    }

    /// Wait until loading finished; fails if it did not succeed.
    pub async fn ready(&self) -> Result<(), CommitLogError> {
        let mut rx = self.inner.ready.subscribe();
        let readiness = rx
            .wait_for(|r| *r != Readiness::Loading)
            .await
            .map_err(|_| CommitLogError::Unavailable("loader stopped".to_string()))?;
        match &*readiness {
            Readiness::Failed(reason) => Err(CommitLogError::Unavailable(reason.clone())),
            _ => Ok(()),
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.ready.borrow() == Readiness::Ready
    }

    // -----------------------------------------------------------------------
    // Mutations
    // -----------------------------------------------------------------------

    /// Append a new entry with the next sequence number.
    ///
    /// New entries start PENDING, or APPLIED when recording a change that
    /// already took effect.
    pub async fn append_commit(
        &self,
        machine_id: MachineId,
        status: CommitStatus,
        payload: CommitPayload,
    ) -> Result<AppendReceipt, CommitLogError> {
        self.ready().await?;
        if !machine_id.is_valid() {
            return Err(CommitLogError::Validation(format!(
                "machine id '{machine_id}' must be non-empty and use only [A-Za-z0-9._-]"
            )));
        }
        if !matches!(status, CommitStatus::Pending | CommitStatus::Applied) {
            return Err(CommitLogError::Validation(format!(
                "new entries must be PENDING or APPLIED, got {status}"
            )));
        }
        validate_payload(&payload)?;

        let _writer = self.inner.writer.lock().await;
        let sequence = self.inner.state.read().await.current_sequence_number + 1;
        let entry = CommitEntry::new(sequence, machine_id, status, payload)?;
        self.persist_entry(&entry).await?;

        let receipt = AppendReceipt {
            sequence_number: sequence,
            content_hash: entry.content_hash.clone(),
        };
        tracing::info!(
            sequence,
            kind = %entry.commit_type(),
            status = %entry.status,
            "commit appended",
        );
        self.commit_to_memory(entry).await;
        Ok(receipt)
    }

    /// Mark an entry APPLIED. Applying an APPLIED entry is a no-op.
    pub async fn apply_commit(&self, sequence: u64) -> Result<TransitionOutcome, CommitLogError> {
        self.transition(sequence, CommitStatus::Applied, |entry| {
            entry.applied_at = Some(Utc::now());
            entry.last_error = None;
        })
        .await
    }

    /// Apply every PENDING or RETRY entry in sequence order.
    ///
    /// A failing entry is reported and does not stop the others.
    pub async fn apply_pending_commits(&self) -> Result<Vec<PendingApplication>, CommitLogError> {
        self.ready().await?;
        let pending: Vec<u64> = self
            .inner
            .state
            .read()
            .await
            .entries
            .values()
            .filter(|entry| entry.status.is_unresolved())
            .map(|entry| entry.sequence_number)
            .collect();

        let mut results = Vec::with_capacity(pending.len());
        for sequence in pending {
            let result = self.apply_commit(sequence).await;
            if let Err(err) = &result {
                tracing::warn!(sequence, error = %err, "pending commit could not be applied");
            }
            results.push(PendingApplication {
                sequence_number: sequence,
                result,
            });
        }
        Ok(results)
    }

    /// Mark an APPLIED entry ROLLED_BACK.
    pub async fn rollback_commit(
        &self,
        sequence: u64,
        reason: &str,
    ) -> Result<TransitionOutcome, CommitLogError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(CommitLogError::Validation(
                "a rollback reason is required".to_string(),
            ));
        }
        let reason = reason.to_string();
        self.transition(sequence, CommitStatus::RolledBack, move |entry| {
            entry.rolled_back_at = Some(Utc::now());
            entry.rollback_reason = Some(reason);
        })
        .await
    }

    /// Record a failed application attempt; the entry becomes RETRY.
    pub async fn mark_retry(
        &self,
        sequence: u64,
        error: &str,
    ) -> Result<TransitionOutcome, CommitLogError> {
        let error = error.to_string();
        self.transition(sequence, CommitStatus::Retry, move |entry| {
            entry.attempts += 1;
            entry.last_error = Some(error);
        })
        .await
    }

    async fn transition(
        &self,
        sequence: u64,
        target: CommitStatus,
        update: impl FnOnce(&mut CommitEntry),
    ) -> Result<TransitionOutcome, CommitLogError> {
        self.ready().await?;
        let _writer = self.inner.writer.lock().await;
        let current = self
            .inner
            .state
            .read()
            .await
            .entries
            .get(&sequence)
            .cloned()
            .ok_or(CommitLogError::NotFound(sequence))?;

        if target == CommitStatus::Applied && current.status == CommitStatus::Applied {
            return Ok(TransitionOutcome {
                entry: current,
                changed: false,
            });
        }
        if !current.status.can_transition_to(target) {
            return Err(CommitLogError::InvalidTransition {
                sequence,
                from: current.status,
                to: target,
            });
        }

        let from = current.status;
        let mut updated = current;
        updated.status = target;
        update(&mut updated);
        self.persist_entry(&updated).await?;
        tracing::info!(sequence, from = %from, to = %target, "commit status changed");
        self.commit_to_memory(updated.clone()).await;
        Ok(TransitionOutcome {
            entry: updated,
            changed: true,
        })
    }

    async fn persist_entry(&self, entry: &CommitEntry) -> Result<(), CommitLogError> {
        let path = paths::commit_record_path(&self.inner.dir, entry.sequence_number);
        let bytes = Arc::new(serde_json::to_vec_pretty(entry)?);
        let target = path.clone();
        retry_io(&self.inner.policy, &path, move || {
            write_bytes_atomic(&target, &bytes)
        })
        .await?;
        Ok(())
    }

    /// Install a persisted entry in memory and rewrite the snapshot.
    ///
    /// The record file is already durable, so a snapshot failure only warns:
    /// the next load rebuilds the snapshot from record files.
    async fn commit_to_memory(&self, entry: CommitEntry) {
        let snapshot = {
            let mut state = self.inner.state.write().await;
            state.upsert(entry);
            serde_json::to_vec_pretty(&*state)
        };
        let path = paths::commit_state_path(&self.inner.dir);
        let result = match snapshot {
            Ok(bytes) => {
                let bytes = Arc::new(bytes);
                let target = path.clone();
                retry_io(&self.inner.policy, &path, move || {
                    write_bytes_atomic(&target, &bytes)
                })
                .await
            }
            Err(source) => Err(PersistError::Json {
                path: path.clone(),
                source,
            }),
        };
        if let Err(err) = result {
            tracing::warn!(path = %path.display(), error = %err, "commit log snapshot not written");
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub async fn get_commit(&self, sequence: u64) -> Result<Option<CommitEntry>, CommitLogError> {
        self.ready().await?;
        Ok(self.inner.state.read().await.entries.get(&sequence).cloned())
    }

    /// Up to `limit` entries, newest first, plus the total entry count.
    pub async fn get_latest_commits(&self, limit: usize) -> Result<LatestCommits, CommitLogError> {
        self.ready().await?;
        let state = self.inner.state.read().await;
        Ok(LatestCommits {
            entries: state.entries.values().rev().take(limit).cloned().collect(),
            total_count: state.entries.len(),
        })
    }

    /// A copy of the full in-memory state.
    pub async fn state(&self) -> Result<CommitLogState, CommitLogError> {
        self.ready().await?;
        Ok(self.inner.state.read().await.clone())
    }

    pub async fn statistics(&self) -> Result<CommitStatistics, CommitLogError> {
        self.ready().await?;
        Ok(self.inner.state.read().await.statistics)
    }

    /// Re-hash every entry in memory and on disk.
    ///
    /// Reports entries whose stored hash does not match their data, record
    /// files that cannot be parsed, and entries whose record file vanished.
    pub async fn verify_consistency(&self) -> Result<ConsistencyReport, CommitLogError> {
        self.ready().await?;
        let _writer = self.inner.writer.lock().await;
        let scanned = scan(&self.inner.policy, &self.inner.dir).await?;
        let state = self.inner.state.read().await;

        let mut issues = BTreeSet::new();
        for entry in state.entries.values() {
            if let Some(issue) = entry.integrity_issue() {
                issues.insert(InconsistentEntry {
                    sequence_number: entry.sequence_number,
                    issue,
                });
            }
            if !scanned.files.contains(&entry.sequence_number) {
                issues.insert(InconsistentEntry {
                    sequence_number: entry.sequence_number,
                    issue: "record file missing from shared store".to_string(),
                });
            }
        }
        issues.extend(scanned.issues);

        let inconsistent_entries: Vec<InconsistentEntry> = issues.into_iter().collect();
        Ok(ConsistencyReport {
            is_consistent: inconsistent_entries.is_empty(),
            inconsistent_entries,
        })
    }

    // -----------------------------------------------------------------------
    // Auto-sync
    // -----------------------------------------------------------------------

    /// Reload the log from the shared store, picking up entries written by
    /// other processes. Entries whose record became corrupt drop out.
    pub async fn refresh(&self) -> Result<CommitStatistics, CommitLogError> {
        self.ready().await?;
        let _writer = self.inner.writer.lock().await;
        let scanned = scan(&self.inner.policy, &self.inner.dir).await?;
        let mut state = self.inner.state.write().await;
        let mut next = scanned.into_state();
        next.current_sequence_number = next.current_sequence_number.max(state.current_sequence_number);
        if next.entries != state.entries {
            tracing::debug!(
                before = state.entries.len(),
                after = next.entries.len(),
                "commit log changed on disk",
            );
        }
        *state = next;
        Ok(state.statistics)
    }

    /// Start periodic [`refresh`](Self::refresh). Returns `false` if already running.
    pub fn start_auto_sync(&self) -> bool {
        let mut slot = self
            .inner
            .auto_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|running| !running.task.is_finished()) {
            return false;
        }

        let (stop, mut stopped) = oneshot::channel::<()>();
        let log = self.clone();
        let period = self.inner.auto_sync_interval;
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => match log.refresh().await {
                        Ok(stats) => tracing::debug!(entries = stats.total_entries, "auto-sync tick"),
                        Err(err) => tracing::warn!(error = %err, "auto-sync tick failed"),
                    },
                }
            }
            tracing::debug!("auto-sync stopped");
        });
        *slot = Some(AutoSync { stop, task });
        tracing::info!(interval_secs = period.as_secs_f64(), "auto-sync started");
        true
    }

    /// Cancel future auto-sync ticks without waiting for one in flight.
    /// Returns `false` if auto-sync was not running.
    pub fn stop_auto_sync(&self) -> bool {
        let running = self
            .inner
            .auto_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match running {
            Some(AutoSync { stop, .. }) => {
                let _ = stop.send(());
                tracing::info!("auto-sync stop requested");
                true
            }
            None => false,
        }
    }

    pub fn is_auto_syncing(&self) -> bool {
        self.inner
            .auto_sync
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|running| !running.task.is_finished())
    }
}

fn validate_payload(payload: &CommitPayload) -> Result<(), CommitLogError> {
    let problem = match payload {
        CommitPayload::Baseline(p) if p.baseline_id.trim().is_empty() => Some("baselineId is empty"),
        CommitPayload::Config(p) if p.baseline_id.trim().is_empty() => Some("baselineId is empty"),
        CommitPayload::Sync(p) if !p.source_machine.is_valid() => Some("sourceMachine is not a valid machine id"),
        CommitPayload::Sync(p) if p.baseline_id.trim().is_empty() => Some("baselineId is empty"),
        CommitPayload::Decision(p) if p.decision_id.trim().is_empty() => Some("decisionId is empty"),
        CommitPayload::Decision(p) if p.title.trim().is_empty() => Some("title is empty"),
        _ => None,
    };
    match problem {
        Some(problem) => Err(CommitLogError::Validation(format!(
            "{} payload: {problem}",
            payload.commit_type()
        ))),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Disk scan
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ScannedLog {
    entries: BTreeMap<u64, CommitEntry>,
    issues: Vec<InconsistentEntry>,
    /// Every record file name seen, readable or not.
    files: BTreeSet<u64>,
    snapshot_sequence: u64,
    snapshot_issue: Option<String>,
}

impl ScannedLog {
    /// Corrupted records still count towards the counter, so their
    /// sequence numbers are never handed out again.
    fn into_state(self) -> CommitLogState {
        let highest_file = self.files.last().copied().unwrap_or(0);
        let mut state = CommitLogState {
            current_sequence_number: highest_file.max(self.snapshot_sequence),
            entries: self.entries,
            statistics: CommitStatistics::default(),
        };
        state.refresh_statistics();
        state
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotHeader {
    #[serde(default)]
    current_sequence_number: u64,
}

async fn scan(policy: &RetryPolicy, dir: &Path) -> Result<ScannedLog, PersistError> {
    let target = dir.to_path_buf();
    retry_io(policy, dir, move || scan_dir(&target)).await
}

fn scan_dir(dir: &Path) -> std::io::Result<ScannedLog> {
    let mut scanned = ScannedLog::default();
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(scanned),
        Err(err) => return Err(err),
    };

    for item in read_dir {
        let item = item?;
        let name = item.file_name();
        let Some(sequence) = name.to_str().and_then(paths::parse_record_file_name) else {
            continue;
        };
        scanned.files.insert(sequence);
        match read_record(&item.path(), sequence) {
            Ok(entry) => {
                scanned.entries.insert(sequence, entry);
            }
            Err(issue) => scanned.issues.push(InconsistentEntry {
                sequence_number: sequence,
                issue,
            }),
        }
    }

    if let Some(bytes) = read_optional(&paths::commit_state_path(dir))? {
        match serde_json::from_slice::<SnapshotHeader>(&bytes) {
            Ok(header) => scanned.snapshot_sequence = header.current_sequence_number,
            Err(err) => scanned.snapshot_issue = Some(err.to_string()),
        }
    }
    Ok(scanned)
}

fn read_record(path: &Path, sequence: u64) -> Result<CommitEntry, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("unreadable record: {e}"))?;
    let record: CommitRecord =
        serde_json::from_slice(&bytes).map_err(|e| format!("unparseable record: {e}"))?;
    if record.sequence_number != sequence {
        return Err(format!(
            "record claims sequence {} but is stored as {sequence}",
            record.sequence_number
        ));
    }
    if let Some(issue) = record.integrity_issue() {
        return Err(issue);
    }
    CommitEntry::try_from(record).map_err(|e| format!("data does not match its type: {e}"))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use roosync_core::DecisionCommit;
    use tempfile::TempDir;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            delay: Duration::from_millis(1),
            timeout: Duration::from_secs(5),
        }
    }

    fn open(dir: &Path) -> CommitLog {
        CommitLog::open_at(dir.to_path_buf(), policy(), Duration::from_secs(60))
    }

    fn decision(title: &str) -> CommitPayload {
        CommitPayload::Decision(DecisionCommit {
            decision_id: "d-1".into(),
            title: title.into(),
            description: String::new(),
        })
    }

    #[tokio::test]
    async fn append_writes_record_and_snapshot() {
        let tmp = TempDir::new().unwrap();
        let log = open(tmp.path());
        let receipt = log
            .append_commit(MachineId::from("m1"), CommitStatus::Pending, decision("a"))
            .await
            .unwrap();
        assert_eq!(receipt.sequence_number, 1);
        assert!(tmp.path().join("0000001.json").exists());
        assert!(tmp.path().join("state.json").exists());
        assert!(log.is_ready());
    }

    #[tokio::test]
    async fn rejects_rolled_back_as_initial_status() {
        let tmp = TempDir::new().unwrap();
        let log = open(tmp.path());
        let err = log
            .append_commit(MachineId::from("m1"), CommitStatus::RolledBack, decision("a"))
            .await
            .unwrap_err();
        assert!(matches!(err, CommitLogError::Validation(_)));
        assert!(!tmp.path().join("0000001.json").exists());
    }

    #[tokio::test]
    async fn rejects_empty_title() {
        let tmp = TempDir::new().unwrap();
        let log = open(tmp.path());
        let err = log
            .append_commit(MachineId::from("m1"), CommitStatus::Pending, decision("  "))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("title is empty"));
        assert_eq!(log.statistics().await.unwrap().total_entries, 0);
    }

    #[test]
    fn scan_of_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let scanned = scan_dir(&tmp.path().join("absent")).unwrap();
        assert!(scanned.entries.is_empty());
        assert_eq!(scanned.into_state().current_sequence_number, 0);
    }

    #[test]
    fn counter_covers_corrupted_records() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("0000004.json"), "{ broken").unwrap();
        let scanned = scan_dir(tmp.path()).unwrap();
        assert_eq!(scanned.issues.len(), 1);
        assert_eq!(scanned.issues[0].sequence_number, 4);
        assert_eq!(scanned.into_state().current_sequence_number, 4);
    }

    #[test]
    fn renamed_record_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let entry = CommitEntry::new(2, MachineId::from("m1"), CommitStatus::Pending, decision("x"))
            .unwrap();
        std::fs::write(
            tmp.path().join("0000005.json"),
            serde_json::to_vec(&entry).unwrap(),
        )
        .unwrap();
        let err = read_record(&tmp.path().join("0000005.json"), 5).unwrap_err();
        assert!(err.contains("stored as 5"));
    }
}
