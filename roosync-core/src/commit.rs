//! Commit entry model: one ordered, hashed record of a configuration change
//! intent and its lifecycle status.
//!
//! On disk an entry is a flat JSON object whose `type` field selects the
//! shape of `data`. In memory the pair is a [`CommitPayload`] tagged union,
//! so every entry type is matched exhaustively. Conversion goes through
//! [`CommitRecord`], which keeps `data` as raw JSON so integrity checks hash
//! exactly what was stored.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::digest::content_hash;
use crate::types::{MachineId, ProfileCategory, Severity};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Discriminant of a commit payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitType {
    Baseline,
    Config,
    Sync,
    Decision,
}

impl fmt::Display for CommitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitType::Baseline => write!(f, "BASELINE"),
            CommitType::Config => write!(f, "CONFIG"),
            CommitType::Sync => write!(f, "SYNC"),
            CommitType::Decision => write!(f, "DECISION"),
        }
    }
}

/// Lifecycle status of a commit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommitStatus {
    Pending,
    Applied,
    RolledBack,
    Retry,
}

impl CommitStatus {
    /// Legal lifecycle edges:
    ///
    /// ```text
    /// PENDING -> APPLIED | RETRY
    /// RETRY   -> APPLIED | RETRY
    /// APPLIED -> ROLLED_BACK
    /// ROLLED_BACK (terminal)
    /// ```
    pub fn can_transition_to(self, next: CommitStatus) -> bool {
        matches!(
            (self, next),
            (CommitStatus::Pending, CommitStatus::Applied)
                | (CommitStatus::Pending, CommitStatus::Retry)
                | (CommitStatus::Retry, CommitStatus::Applied)
                | (CommitStatus::Retry, CommitStatus::Retry)
                | (CommitStatus::Applied, CommitStatus::RolledBack)
        )
    }

    /// PENDING or RETRY: still waiting to be applied.
    pub fn is_unresolved(self) -> bool {
        matches!(self, CommitStatus::Pending | CommitStatus::Retry)
    }
}

impl fmt::Display for CommitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommitStatus::Pending => write!(f, "PENDING"),
            CommitStatus::Applied => write!(f, "APPLIED"),
            CommitStatus::RolledBack => write!(f, "ROLLED_BACK"),
            CommitStatus::Retry => write!(f, "RETRY"),
        }
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaselineAction {
    Created,
    Aggregated,
    Migrated,
}

/// A new active baseline was installed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaselineCommit {
    pub baseline_id: String,
    pub action: BaselineAction,
    pub profiles_count: usize,
}

/// Bring one category of this machine in line with the baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigCommit {
    pub baseline_id: String,
    pub category: ProfileCategory,
    pub expected: Value,
    #[serde(default)]
    pub actual: Option<Value>,
    pub severity: Severity,
    pub deviation_count: usize,
}

/// A machine pulled a set of categories from the shared baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCommit {
    pub source_machine: MachineId,
    pub baseline_id: String,
    #[serde(default)]
    pub categories: Vec<ProfileCategory>,
}

/// A free-form decision recorded for audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionCommit {
    pub decision_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Payload of a commit entry, shaped by its type.
#[derive(Debug, Clone, PartialEq)]
pub enum CommitPayload {
    Baseline(BaselineCommit),
    Config(ConfigCommit),
    Sync(SyncCommit),
    Decision(DecisionCommit),
}

impl CommitPayload {
    pub fn commit_type(&self) -> CommitType {
        match self {
            CommitPayload::Baseline(_) => CommitType::Baseline,
            CommitPayload::Config(_) => CommitType::Config,
            CommitPayload::Sync(_) => CommitType::Sync,
            CommitPayload::Decision(_) => CommitType::Decision,
        }
    }

    /// The `data` half of the on-disk record.
    pub fn data(&self) -> Result<Value, serde_json::Error> {
        match self {
            CommitPayload::Baseline(p) => serde_json::to_value(p),
            CommitPayload::Config(p) => serde_json::to_value(p),
            CommitPayload::Sync(p) => serde_json::to_value(p),
            CommitPayload::Decision(p) => serde_json::to_value(p),
        }
    }

    /// Rebuild a payload from its stored `type` and `data`.
    pub fn from_parts(kind: CommitType, data: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            CommitType::Baseline => CommitPayload::Baseline(serde_json::from_value(data)?),
            CommitType::Config => CommitPayload::Config(serde_json::from_value(data)?),
            CommitType::Sync => CommitPayload::Sync(serde_json::from_value(data)?),
            CommitType::Decision => CommitPayload::Decision(serde_json::from_value(data)?),
        })
    }

    pub fn content_hash(&self) -> Result<String, serde_json::Error> {
        content_hash(&self.data()?)
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// The exact on-disk shape of one commit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    pub sequence_number: u64,
    #[serde(rename = "type")]
    pub kind: CommitType,
    pub machine_id: MachineId,
    pub status: CommitStatus,
    pub data: Value,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolled_back_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_reason: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl CommitRecord {
    /// Digest of the stored `data`, recomputed.
    pub fn recompute_hash(&self) -> Result<String, serde_json::Error> {
        content_hash(&self.data)
    }

    /// `Some(issue)` when the stored hash does not match the stored data.
    pub fn integrity_issue(&self) -> Option<String> {
        match self.recompute_hash() {
            Ok(actual) if actual == self.content_hash => None,
            Ok(actual) => Some(format!(
                "content hash mismatch: stored {}, computed {actual}",
                self.content_hash
            )),
            Err(err) => Some(format!("cannot hash data: {err}")),
        }
    }
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

/// One ordered, hashed record of a configuration change intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CommitRecord", into = "CommitRecord")]
pub struct CommitEntry {
    pub sequence_number: u64,
    pub payload: CommitPayload,
    pub machine_id: MachineId,
    pub status: CommitStatus,
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub applied_at: Option<DateTime<Utc>>,
    pub rolled_back_at: Option<DateTime<Utc>>,
    pub rollback_reason: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl CommitEntry {
    /// Build a fresh entry, hashing its payload.
    pub fn new(
        sequence_number: u64,
        machine_id: MachineId,
        status: CommitStatus,
        payload: CommitPayload,
    ) -> Result<Self, serde_json::Error> {
        let content_hash = payload.content_hash()?;
        let now = Utc::now();
        Ok(Self {
            sequence_number,
            payload,
            machine_id,
            status,
            content_hash,
            created_at: now,
            applied_at: (status == CommitStatus::Applied).then_some(now),
            rolled_back_at: None,
            rollback_reason: None,
            attempts: 0,
            last_error: None,
        })
    }

    pub fn commit_type(&self) -> CommitType {
        self.payload.commit_type()
    }

    /// `Some(issue)` when the stored hash no longer matches the payload.
    pub fn integrity_issue(&self) -> Option<String> {
        match self.payload.content_hash() {
            Ok(actual) if actual == self.content_hash => None,
            Ok(actual) => Some(format!(
                "content hash mismatch: stored {}, computed {actual}",
                self.content_hash
            )),
            Err(err) => Some(format!("cannot hash data: {err}")),
        }
    }
}

impl TryFrom<CommitRecord> for CommitEntry {
    type Error = serde_json::Error;

    fn try_from(record: CommitRecord) -> Result<Self, Self::Error> {
        let payload = CommitPayload::from_parts(record.kind, record.data)?;
        Ok(Self {
            sequence_number: record.sequence_number,
            payload,
            machine_id: record.machine_id,
            status: record.status,
            content_hash: record.content_hash,
            created_at: record.created_at,
            applied_at: record.applied_at,
            rolled_back_at: record.rolled_back_at,
            rollback_reason: record.rollback_reason,
            attempts: record.attempts,
            last_error: record.last_error,
        })
    }
}

impl From<CommitEntry> for CommitRecord {
    fn from(entry: CommitEntry) -> Self {
        let kind = entry.payload.commit_type();
        // Payload structs contain only JSON-representable fields.
        let data = entry.payload.data().unwrap_or(Value::Null);
        Self {
            sequence_number: entry.sequence_number,
            kind,
            machine_id: entry.machine_id,
            status: entry.status,
            data,
            content_hash: entry.content_hash,
            created_at: entry.created_at,
            applied_at: entry.applied_at,
            rolled_back_at: entry.rolled_back_at,
            rollback_reason: entry.rollback_reason,
            attempts: entry.attempts,
            last_error: entry.last_error,
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate state
// ---------------------------------------------------------------------------

/// Partition counts of the log's entries by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitStatistics {
    pub total_entries: usize,
    pub pending_entries: usize,
    pub applied_entries: usize,
    pub rolled_back_entries: usize,
    #[serde(default)]
    pub retry_entries: usize,
}

impl CommitStatistics {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a CommitEntry>) -> Self {
        let mut stats = Self::default();
        for entry in entries {
            stats.total_entries += 1;
            match entry.status {
                CommitStatus::Pending => stats.pending_entries += 1,
                CommitStatus::Applied => stats.applied_entries += 1,
                CommitStatus::RolledBack => stats.rolled_back_entries += 1,
                CommitStatus::Retry => stats.retry_entries += 1,
            }
        }
        stats
    }
}

/// The aggregate snapshot persisted as `state.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitLogState {
    pub current_sequence_number: u64,
    pub entries: BTreeMap<u64, CommitEntry>,
    pub statistics: CommitStatistics,
}

impl CommitLogState {
    /// Insert or replace an entry and keep the counter and statistics exact.
    pub fn upsert(&mut self, entry: CommitEntry) {
        self.current_sequence_number = self.current_sequence_number.max(entry.sequence_number);
        self.entries.insert(entry.sequence_number, entry);
        self.refresh_statistics();
    }

    pub fn refresh_statistics(&mut self) {
        self.statistics = CommitStatistics::from_entries(self.entries.values());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
