//! The single active baseline of a shared store.
//!
//! The active baseline lives in `<shared>/non-nominative-baseline.json`.
//! Every way of producing one (authoring, aggregation, migration) replaces
//! that file wholesale; there is never more than one active baseline.
//! Reads always go to the shared store, so a baseline installed by another
//! machine is picked up immediately.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use roosync_core::paths;
use roosync_core::persist::{load_json, persist_json, read_optional, retry_io, write_bytes_atomic};
use roosync_core::{
    Baseline, BaselineAction, BaselineCommit, CommitPayload, CommitStatus, InventoryModel,
    MachineId, Profile, RetryPolicy, SyncConfig,
};
use roosync_sync::CommitLog;

use crate::consensus::{self, AggregationConfig};
use crate::error::{BaselineError, CategoryConflict};
use crate::migrate::{self, LegacyBaseline, MigrationOptions, MigrationOutcome};

/// Returned by [`BaselineStore::aggregate_baseline`].
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationOutcome {
    pub baseline: Baseline,
    /// Categories left out for lack of agreement.
    pub conflicts: Vec<CategoryConflict>,
}

struct Journal {
    log: CommitLog,
    machine_id: MachineId,
}

pub struct BaselineStore {
    shared: PathBuf,
    policy: RetryPolicy,
    writer: Mutex<()>,
    journal: Option<Journal>,
}

impl BaselineStore {
    pub fn new(shared: PathBuf, policy: RetryPolicy) -> Self {
        Self {
            shared,
            policy,
            writer: Mutex::new(()),
            journal: None,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.shared_path.clone(), config.retry_policy())
    }

    /// Record every installed baseline as an APPLIED `BASELINE` entry.
    pub fn with_commit_log(mut self, log: CommitLog, machine_id: MachineId) -> Self {
        self.journal = Some(Journal { log, machine_id });
        self
    }

    pub fn shared_path(&self) -> &Path {
        &self.shared
    }

    pub fn baseline_path(&self) -> PathBuf {
        paths::baseline_path(&self.shared)
    }

    pub async fn get_active_baseline(&self) -> Result<Option<Baseline>, BaselineError> {
        Ok(load_json(&self.policy, &self.baseline_path()).await?)
    }

    /// Author a baseline directly from `profiles` and make it active.
    pub async fn create_baseline(
        &self,
        name: &str,
        description: &str,
        profiles: Vec<Profile>,
    ) -> Result<Baseline, BaselineError> {
        let baseline = new_baseline(name, description, profiles)?;
        self.install(&baseline, BaselineAction::Created).await?;
        Ok(baseline)
    }

    /// Derive a baseline from `inventories` by consensus and make it active.
    ///
    /// Fails with [`BaselineError::NoConsensus`] when no category clears its
    /// threshold; the active baseline is then left alone.
    pub async fn aggregate_baseline(
        &self,
        name: &str,
        inventories: &[InventoryModel],
        config: &AggregationConfig,
    ) -> Result<AggregationOutcome, BaselineError> {
        let consensus = consensus::aggregate(inventories, config)?;
        if consensus.profiles.is_empty() {
            return Err(BaselineError::NoConsensus {
                conflicts: consensus.conflicts,
            });
        }
        let machines: Vec<&str> = inventories.iter().map(|i| i.machine_id.as_str()).collect();
        let description = format!("Consensus of {}", machines.join(", "));
        let baseline = new_baseline(name, &description, consensus.profiles)?;
        self.install(&baseline, BaselineAction::Aggregated).await?;
        Ok(AggregationOutcome {
            baseline,
            conflicts: consensus.conflicts,
        })
    }

    /// Turn the legacy `sync-config.ref.json` into the active baseline.
    pub async fn migrate_to_non_nominative(
        &self,
        options: MigrationOptions,
    ) -> Result<MigrationOutcome, BaselineError> {
        let legacy_path = paths::legacy_baseline_path(&self.shared);
        let legacy: LegacyBaseline = load_json(&self.policy, &legacy_path)
            .await?
            .ok_or_else(|| BaselineError::LegacyNotFound(legacy_path.clone()))?;

        let profiles = migrate::profiles_from_legacy(&legacy);
        if profiles.is_empty() {
            return Err(BaselineError::EmptyLegacy { path: legacy_path });
        }
        if options.create_backup {
            self.backup_files(&[legacy_path, self.baseline_path()]).await?;
        }

        let name = options
            .name
            .unwrap_or_else(|| format!("Migrated from {}", legacy.machine_id));
        let description = match &legacy.last_updated {
            Some(updated) => format!("Legacy baseline {} ({updated})", legacy.version),
            None => format!("Legacy baseline {}", legacy.version),
        };
        let baseline = new_baseline(&name, &description, profiles)?;
        self.install(&baseline, BaselineAction::Migrated).await?;
        Ok(MigrationOutcome {
            success: true,
            profiles_count: baseline.profiles.len(),
            new_baseline: baseline,
        })
    }

    /// Copy each existing file in `files` to
    /// `<shared>/baseline-backups/<timestamp>-<name>`. Missing files are skipped.
    pub async fn backup_files(&self, files: &[PathBuf]) -> Result<Vec<PathBuf>, BaselineError> {
        let dir = paths::baseline_backups_dir(&self.shared);
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ").to_string();
        let mut written = Vec::new();
        for source in files {
            let Some(name) = source.file_name() else {
                continue;
            };
            let target = dir.join(format!("{stamp}-{}", name.to_string_lossy()));
            let from = source.clone();
            let to = target.clone();
            let copied = retry_io(&self.policy, source, move || {
                match read_optional(&from)? {
                    Some(bytes) => write_bytes_atomic(&to, &bytes).map(|()| true),
                    None => Ok(false),
                }
            })
            .await?;
            if copied {
                tracing::info!(from = %source.display(), to = %target.display(), "baseline backup written");
                written.push(target);
            }
        }
        Ok(written)
    }

    async fn install(&self, baseline: &Baseline, action: BaselineAction) -> Result<(), BaselineError> {
        let _writer = self.writer.lock().await;
        persist_json(&self.policy, &self.baseline_path(), baseline).await?;
        tracing::info!(
            baseline_id = %baseline.baseline_id,
            name = %baseline.name,
            profiles = baseline.profiles.len(),
            ?action,
            "active baseline replaced",
        );

        if let Some(journal) = &self.journal {
            let payload = CommitPayload::Baseline(BaselineCommit {
                baseline_id: baseline.baseline_id.clone(),
                action,
                profiles_count: baseline.profiles.len(),
            });
            if let Err(err) = journal
                .log
                .append_commit(journal.machine_id.clone(), CommitStatus::Applied, payload)
                .await
            {
                tracing::warn!(
                    baseline_id = %baseline.baseline_id,
                    error = %err,
                    "baseline installed but not journaled",
                );
            }
        }
        Ok(())
    }
}

fn new_baseline(
    name: &str,
    description: &str,
    profiles: Vec<Profile>,
) -> Result<Baseline, BaselineError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(BaselineError::Validation("baseline name is empty".to_string()));
    }
    let mut ids = HashSet::new();
    for profile in &profiles {
        if profile.profile_id.trim().is_empty() {
            return Err(BaselineError::Validation("profile id is empty".to_string()));
        }
        if !ids.insert(profile.profile_id.as_str()) {
            return Err(BaselineError::Validation(format!(
                "duplicate profile id '{}'",
                profile.profile_id
            )));
        }
    }
    Ok(Baseline {
        baseline_id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        description: description.to_string(),
        profiles,
        timestamp: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use roosync_core::ProfileCategory;
    use serde_json::json;

    #[test]
    fn new_baseline_rejects_duplicate_profile_ids() {
        let profiles = vec![
            Profile::new("p", ProfileCategory::RooCore, json!({})),
            Profile::new("p", ProfileCategory::SystemOs, json!({})),
        ];
        let err = new_baseline("team", "", profiles).unwrap_err();
        assert!(err.to_string().contains("duplicate profile id 'p'"));
    }

    #[test]
    fn new_baseline_rejects_blank_name() {
        assert!(matches!(
            new_baseline("  ", "", vec![]).unwrap_err(),
            BaselineError::Validation(_)
        ));
    }

    #[test]
    fn ids_are_unique() {
        let a = new_baseline("a", "", vec![]).unwrap();
        let b = new_baseline("a", "", vec![]).unwrap();
        assert_ne!(a.baseline_id, b.baseline_id);
    }
}
