//! Reconciliation: turning deviations into commit entries and commit
//! entries into applied (or rolled back) configuration.
//!
//! Every CONFIG entry is applied inside a rollback point named after its
//! sequence number, so a failed apply is undone immediately and an applied
//! entry can be rolled back later.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use roosync_core::{
    Baseline, CommitPayload, CommitStatus, CommitType, ComparisonReport, ConfigCommit, Deviation,
    MachineId, ProfileCategory,
};

use crate::apply::{ApplyRequest, ApplyTarget, ConfigApplier};
use crate::commit_log::CommitLog;
use crate::error::{CommitLogError, PolicyError, RollbackError};
use crate::rollback::{RestoreReport, RollbackManager};

/// Rollback point name for the entry with `sequence`.
pub fn decision_id_for(sequence: u64) -> String {
    format!("commit-{sequence:07}")
}

/// Result of applying one entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryApplyReport {
    pub sequence_number: u64,
    /// APPLIED on success, RETRY when the applier failed.
    pub status: CommitStatus,
    pub files_applied: Vec<PathBuf>,
    pub errors: Vec<String>,
}

pub struct ReconciliationPolicy {
    log: CommitLog,
    rollback: Arc<RollbackManager>,
    applier: Arc<dyn ConfigApplier>,
    machine_id: MachineId,
    max_attempts: u32,
}

impl ReconciliationPolicy {
    pub fn new(
        log: CommitLog,
        rollback: Arc<RollbackManager>,
        applier: Arc<dyn ConfigApplier>,
        machine_id: MachineId,
    ) -> Self {
        Self {
            log,
            rollback,
            applier,
            machine_id,
            max_attempts: 3,
        }
    }

    /// Entries that already failed this many times are left alone by
    /// [`apply_pending`](Self::apply_pending).
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn log(&self) -> &CommitLog {
        &self.log
    }

    pub fn rollback_manager(&self) -> &RollbackManager {
        &self.rollback
    }

    /// Record one PENDING CONFIG entry per deviating category.
    ///
    /// A category is skipped while an entry with the same content is
    /// PENDING, RETRY or APPLIED; only a rolled-back entry lets the same
    /// deviation be recorded again. The content includes the baseline id, so a
    /// new baseline starts afresh. Returns the new sequence numbers.
    pub async fn record_deviations(
        &self,
        report: &ComparisonReport,
        baseline: &Baseline,
    ) -> Result<Vec<u64>, PolicyError> {
        if report.baseline_id != baseline.baseline_id {
            return Err(CommitLogError::Validation(format!(
                "report targets baseline '{}' but '{}' was given",
                report.baseline_id, baseline.baseline_id
            ))
            .into());
        }

        let state = self.log.state().await?;
        let mut outstanding: HashSet<String> = state
            .entries
            .values()
            .filter(|e| e.status != CommitStatus::RolledBack && e.commit_type() == CommitType::Config)
            .filter(|e| e.machine_id == self.machine_id)
            .map(|e| e.content_hash.clone())
            .collect();

        let mut by_category: BTreeMap<ProfileCategory, Vec<&Deviation>> = BTreeMap::new();
        for deviation in &report.differences {
            by_category.entry(deviation.category).or_default().push(deviation);
        }

        let mut recorded = Vec::new();
        for (category, deviations) in by_category {
            let Some(profile) = baseline.profile_for(category) else {
                continue;
            };
            let actual = machine_value(&profile.configuration, &deviations);
            let severity = deviations
                .iter()
                .map(|d| d.severity)
                .min()
                .unwrap_or_else(|| category.default_severity());
            let payload = CommitPayload::Config(ConfigCommit {
                baseline_id: baseline.baseline_id.clone(),
                category,
                expected: profile.configuration.clone(),
                actual,
                severity,
                deviation_count: deviations.len(),
            });

            let hash = payload.content_hash().map_err(CommitLogError::from)?;
            if outstanding.contains(&hash) {
                tracing::debug!(%category, "deviation already recorded, skipping");
                continue;
            }
            let receipt = self
                .log
                .append_commit(self.machine_id.clone(), CommitStatus::Pending, payload)
                .await?;
            outstanding.insert(receipt.content_hash);
            recorded.push(receipt.sequence_number);
        }

        if !recorded.is_empty() {
            tracing::info!(
                machine = %self.machine_id,
                entries = recorded.len(),
                "deviations recorded",
            );
        }
        Ok(recorded)
    }

    /// Apply one entry.
    ///
    /// CONFIG entries are snapshotted, handed to the applier and marked
    /// APPLIED; on applier failure the snapshot is restored and discarded and
    /// the entry goes to RETRY. Other entry types only change status.
    pub async fn apply_entry(&self, sequence: u64) -> Result<EntryApplyReport, PolicyError> {
        let entry = self
            .log
            .get_commit(sequence)
            .await?
            .ok_or(CommitLogError::NotFound(sequence))?;

        let config = match (&entry.payload, entry.status) {
            (CommitPayload::Config(config), status) if status.is_unresolved() => config.clone(),
            _ => {
                let outcome = self.log.apply_commit(sequence).await?;
                return Ok(EntryApplyReport {
                    sequence_number: sequence,
                    status: outcome.entry.status,
                    files_applied: Vec::new(),
                    errors: Vec::new(),
                });
            }
        };

        let request = ApplyRequest {
            version: config.baseline_id.clone(),
            machine_id: self.machine_id.clone(),
            targets: vec![ApplyTarget {
                category: config.category,
                configuration: config.expected.clone(),
            }],
            dry_run: false,
        };
        let decision_id = decision_id_for(sequence);
        let files = self.applier.affected_files(&request);
        match self.rollback.create_rollback_point(&decision_id, &files).await {
            Ok(_) => {}
            Err(err @ RollbackError::AlreadyExists { .. }) => {
                // Left behind by a restore that could not put every file back.
                tracing::error!(
                    sequence,
                    decision_id = %decision_id,
                    "stale rollback point blocks the apply; restore it by hand",
                );
                let message = err.to_string();
                let retried = self.log.mark_retry(sequence, &message).await?;
                return Ok(EntryApplyReport {
                    sequence_number: sequence,
                    status: retried.entry.status,
                    files_applied: Vec::new(),
                    errors: vec![message],
                });
            }
            Err(err) => return Err(err.into()),
        }

        let applier = Arc::clone(&self.applier);
        let outcome = tokio::task::spawn_blocking(move || applier.apply_config(&request))
            .await
            .map_err(|err| PolicyError::Applier(err.to_string()))?;

        if outcome.success {
            if let Err(err) = self.log.apply_commit(sequence).await {
                // The files changed but the log does not say so: put them back.
                self.undo(&decision_id).await;
                return Err(err.into());
            }
            tracing::info!(sequence, category = %config.category, "config entry applied");
            return Ok(EntryApplyReport {
                sequence_number: sequence,
                status: CommitStatus::Applied,
                files_applied: outcome.files_applied,
                errors: Vec::new(),
            });
        }

        tracing::warn!(
            sequence,
            errors = ?outcome.errors,
            "config apply failed, restoring snapshot",
        );
        self.undo(&decision_id).await;
        let retried = self
            .log
            .mark_retry(sequence, &outcome.errors.join("; "))
            .await?;
        Ok(EntryApplyReport {
            sequence_number: sequence,
            status: retried.entry.status,
            files_applied: outcome.files_applied,
            errors: outcome.errors,
        })
    }

    /// Restore and discard the rollback point of a failed attempt, so the
    /// next attempt can snapshot afresh.
    async fn undo(&self, decision_id: &str) {
        match self.rollback.restore_from_rollback_point(decision_id).await {
            Ok(report) if report.success => {
                if let Err(err) = self.rollback.remove_rollback_point(decision_id).await {
                    tracing::warn!(decision_id, error = %err, "rollback point not removed");
                }
            }
            Ok(report) => tracing::error!(
                decision_id,
                logs = ?report.logs,
                "restore after failed apply incomplete; rollback point kept",
            ),
            Err(err) => tracing::error!(decision_id, error = %err, "restore after failed apply failed"),
        }
    }

    /// [`apply_entry`](Self::apply_entry) over every unresolved entry still
    /// under the attempt limit, in sequence order.
    pub async fn apply_pending(
        &self,
    ) -> Result<Vec<(u64, Result<EntryApplyReport, PolicyError>)>, PolicyError> {
        let state = self.log.state().await?;
        let due: Vec<u64> = state
            .entries
            .values()
            .filter(|e| e.status.is_unresolved() && e.attempts < self.max_attempts)
            .map(|e| e.sequence_number)
            .collect();

        let mut results = Vec::with_capacity(due.len());
        for sequence in due {
            let result = self.apply_entry(sequence).await;
            if let Err(err) = &result {
                tracing::warn!(sequence, error = %err, "pending entry not applied");
            }
            results.push((sequence, result));
        }
        Ok(results)
    }

    /// Undo an APPLIED entry.
    ///
    /// The entry's rollback point, if any, is restored first; the entry is
    /// marked ROLLED_BACK only when every file came back.
    pub async fn rollback_entry(
        &self,
        sequence: u64,
        reason: &str,
    ) -> Result<RestoreReport, PolicyError> {
        let entry = self
            .log
            .get_commit(sequence)
            .await?
            .ok_or(CommitLogError::NotFound(sequence))?;
        if entry.status != CommitStatus::Applied {
            return Err(CommitLogError::InvalidTransition {
                sequence,
                from: entry.status,
                to: CommitStatus::RolledBack,
            }
            .into());
        }
        if reason.trim().is_empty() {
            return Err(CommitLogError::Validation("a rollback reason is required".to_string()).into());
        }

        let decision_id = decision_id_for(sequence);
        let report = if self.rollback.has_rollback_point(&decision_id).await? {
            self.rollback.restore_from_rollback_point(&decision_id).await?
        } else {
            RestoreReport {
                success: true,
                restored_files: Vec::new(),
                logs: vec![format!("no rollback point for {decision_id}; status change only")],
            }
        };
        if !report.success {
            return Err(PolicyError::RestoreIncomplete {
                decision_id,
                logs: report.logs,
            });
        }

        if let Err(err) = self.log.rollback_commit(sequence, reason).await {
            tracing::error!(
                sequence,
                decision_id = %decision_id,
                error = %err,
                "files restored but the entry is still APPLIED",
            );
            return Err(err.into());
        }
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Machine value reconstruction
// ---------------------------------------------------------------------------

/// The machine's value for a category, rebuilt from the baseline value and
/// every deviation inside that category. `None` when the machine does not
/// report the category at all.
fn machine_value(expected: &Value, deviations: &[&Deviation]) -> Option<Value> {
    if let Some(whole) = deviations.iter().find(|d| d.path.is_empty()) {
        return whole.actual.clone();
    }
    let mut value = expected.clone();
    let mut missing = Vec::new();
    for deviation in deviations {
        let tokens = pointer_tokens(&deviation.path);
        match &deviation.actual {
            Some(actual) => set_at(&mut value, &tokens, actual.clone()),
            None => missing.push(tokens),
        }
    }
    // Missing array elements are trailing; drop them highest index first.
    missing.sort_by(|a, b| compare_tokens(b, a));
    for tokens in &missing {
        remove_at(&mut value, tokens);
    }
    Some(value)
}

fn pointer_tokens(path: &str) -> Vec<String> {
    path.split('/')
        .skip(1)
        .map(|t| t.replace("~1", "/").replace("~0", "~"))
        .collect()
}

fn compare_tokens(a: &[String], b: &[String]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let order = match (x.parse::<usize>(), y.parse::<usize>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            _ => x.cmp(y),
        };
        if order != Ordering::Equal {
            return order;
        }
    }
    a.len().cmp(&b.len())
}

fn child_mut<'a>(value: &'a mut Value, token: &str) -> Option<&'a mut Value> {
    match value {
        Value::Object(map) => map.get_mut(token),
        Value::Array(items) => token.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
        _ => None,
    }
}

fn set_at(value: &mut Value, tokens: &[String], new: Value) {
    let Some((last, parents)) = tokens.split_last() else {
        *value = new;
        return;
    };
    let mut target = value;
    for token in parents {
        match child_mut(target, token) {
            Some(child) => target = child,
            None => return,
        }
    }
    match target {
        Value::Object(map) => {
            map.insert(last.clone(), new);
        }
        Value::Array(items) => {
            if let Ok(index) = last.parse::<usize>() {
                if index >= items.len() {
                    items.resize(index + 1, Value::Null);
                }
                items[index] = new;
            }
        }
        _ => {}
    }
}

fn remove_at(value: &mut Value, tokens: &[String]) {
    let Some((last, parents)) = tokens.split_last() else {
        return;
    };
    let mut target = value;
    for token in parents {
        match child_mut(target, token) {
            Some(child) => target = child,
            None => return,
        }
    }
    match target {
        Value::Object(map) => {
            map.remove(last);
        }
        Value::Array(items) => {
            if let Ok(index) = last.parse::<usize>() {
                if index < items.len() {
                    items.remove(index);
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roosync_core::{DeviationKind, Severity};
    use rstest::rstest;
    use serde_json::json;

    fn leaf(path: &str, kind: DeviationKind, actual: Option<Value>) -> Deviation {
        Deviation {
            category: ProfileCategory::SoftwareNode,
            path: path.into(),
            kind,
            expected: None,
            actual,
            severity: Severity::Warning,
            description: String::new(),
        }
    }

    #[rstest]
    #[case::changed_leaf(
        vec![leaf("/version", DeviationKind::Changed, Some(json!("18.0.0")))],
        json!({"version": "18.0.0", "globals": ["pnpm", "yarn"]})
    )]
    #[case::extra_key_and_element(
        vec![
            leaf("/extra", DeviationKind::Unexpected, Some(json!(true))),
            leaf("/globals/2", DeviationKind::Unexpected, Some(json!("npx"))),
        ],
        json!({"version": "20.11.0", "globals": ["pnpm", "yarn", "npx"], "extra": true})
    )]
    #[case::trailing_elements_missing(
        vec![
            leaf("/globals/0", DeviationKind::Missing, None),
            leaf("/globals/1", DeviationKind::Missing, None),
        ],
        json!({"version": "20.11.0", "globals": []})
    )]
    #[case::escaped_key(
        vec![leaf("/a~1b", DeviationKind::Unexpected, Some(json!(1)))],
        json!({"version": "20.11.0", "globals": ["pnpm", "yarn"], "a/b": 1})
    )]
    fn machine_value_is_rebuilt_from_leaves(#[case] deviations: Vec<Deviation>, #[case] want: Value) {
        let expected = json!({"version": "20.11.0", "globals": ["pnpm", "yarn"]});
        let refs: Vec<&Deviation> = deviations.iter().collect();
        assert_eq!(machine_value(&expected, &refs), Some(want));
    }

    #[test]
    fn unreported_category_has_no_machine_value() {
        let whole = leaf("", DeviationKind::Missing, None);
        assert_eq!(machine_value(&json!({"version": "20"}), &[&whole]), None);
    }
}
