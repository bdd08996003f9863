use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tempfile::TempDir;

use roosync_core::{
    Baseline, CommitPayload, CommitStatus, ComparisonReport, DecisionCommit, Deviation,
    DeviationKind, MachineId, Profile, ProfileCategory, ReportStatistics, RetryPolicy, Severity,
};
use roosync_sync::{
    decision_id_for, ApplyOutcome, ApplyRequest, CommitLog, CommitLogError, ConfigApplier,
    FileApplier, PolicyError, ReconciliationPolicy, RollbackManager,
};

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        delay: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
    }
}

struct Harness {
    _tmp: TempDir,
    applied: PathBuf,
    policy: ReconciliationPolicy,
}

fn harness_with(applier: impl FnOnce(&Path) -> Arc<dyn ConfigApplier>) -> Harness {
    let tmp = TempDir::new().unwrap();
    let applied = tmp.path().join("applied");
    let log = CommitLog::open_at(tmp.path().join("log"), policy(), Duration::from_secs(3600));
    let rollback = Arc::new(RollbackManager::new(tmp.path().join("rollback"), policy()));
    let policy = ReconciliationPolicy::new(log, rollback, applier(&applied), MachineId::from("desk"));
    Harness {
        _tmp: tmp,
        applied,
        policy,
    }
}

fn harness() -> Harness {
    harness_with(|root| Arc::new(FileApplier::new(root.to_path_buf())))
}

fn baseline() -> Baseline {
    Baseline {
        baseline_id: "b-1".into(),
        name: "team".into(),
        description: String::new(),
        profiles: vec![
            Profile::new("core", ProfileCategory::RooCore, json!({"modes": ["code", "ask"]})),
            Profile::new("node", ProfileCategory::SoftwareNode, json!({"version": "20.11.0"})),
        ],
        timestamp: Utc::now(),
    }
}

fn deviation(category: ProfileCategory, path: &str, expected: Value, actual: Value) -> Deviation {
    Deviation {
        category,
        path: path.into(),
        kind: DeviationKind::Changed,
        expected: Some(expected),
        actual: Some(actual),
        severity: category.default_severity(),
        description: format!("{category}{path} differs"),
    }
}

fn report(differences: Vec<Deviation>) -> ComparisonReport {
    ComparisonReport {
        report_id: "r-1".into(),
        baseline_id: "b-1".into(),
        machine_id: MachineId::from("desk"),
        statistics: ReportStatistics::from_deviations(&differences),
        differences,
        generated_at: Utc::now(),
    }
}

fn two_category_report() -> ComparisonReport {
    report(vec![
        deviation(ProfileCategory::RooCore, "/modes/1", json!("ask"), json!("debug")),
        deviation(ProfileCategory::SoftwareNode, "/version", json!("20.11.0"), json!("18.0.0")),
        deviation(ProfileCategory::RooCore, "/modes/2", json!(null), json!("extra")),
    ])
}

#[tokio::test]
async fn deviations_become_one_pending_entry_per_category() {
    let h = harness();
    let seqs = h
        .policy
        .record_deviations(&two_category_report(), &baseline())
        .await
        .unwrap();
    assert_eq!(seqs, vec![1, 2]);

    let entry = h.policy.log().get_commit(1).await.unwrap().unwrap();
    assert_eq!(entry.status, CommitStatus::Pending);
    match entry.payload {
        CommitPayload::Config(config) => {
            assert_eq!(config.category, ProfileCategory::RooCore);
            assert_eq!(config.deviation_count, 2);
            assert_eq!(config.severity, Severity::Critical);
            assert_eq!(config.expected, json!({"modes": ["code", "ask"]}));
            assert_eq!(config.actual, Some(json!({"modes": ["code", "debug", "extra"]})));
        }
        other => panic!("expected CONFIG payload, got {other:?}"),
    }
}

#[tokio::test]
async fn unresolved_duplicates_are_not_recorded_twice() {
    let h = harness();
    let report = two_category_report();
    h.policy.record_deviations(&report, &baseline()).await.unwrap();
    let again = h.policy.record_deviations(&report, &baseline()).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(h.policy.log().statistics().await.unwrap().total_entries, 2);
}

#[tokio::test]
async fn applied_deviation_is_recorded_again_only_after_rollback() {
    let h = harness();
    let report = two_category_report();
    h.policy.record_deviations(&report, &baseline()).await.unwrap();
    h.policy.apply_pending().await.unwrap();

    // The applier does not touch the inventory, so the same report comes back.
    let again = h.policy.record_deviations(&report, &baseline()).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(h.policy.log().statistics().await.unwrap().total_entries, 2);

    h.policy.rollback_entry(1, "modes broke").await.unwrap();
    let after_rollback = h.policy.record_deviations(&report, &baseline()).await.unwrap();
    assert_eq!(after_rollback, vec![3]);

    let mut other = baseline();
    other.baseline_id = "b-2".into();
    let mut moved = report.clone();
    moved.baseline_id = "b-2".into();
    let new_baseline = h.policy.record_deviations(&moved, &other).await.unwrap();
    assert_eq!(new_baseline, vec![4, 5]);
}

#[tokio::test]
async fn mismatched_baseline_is_rejected() {
    let h = harness();
    let mut other = baseline();
    other.baseline_id = "b-2".into();
    let err = h
        .policy
        .record_deviations(&two_category_report(), &other)
        .await
        .unwrap_err();
    assert!(matches!(err, PolicyError::CommitLog(CommitLogError::Validation(_))));
}

#[tokio::test]
async fn apply_writes_config_and_rollback_restores_previous_state() {
    let h = harness();
    std::fs::create_dir_all(&h.applied).unwrap();
    let core_file = h.applied.join("roo-core.json");
    std::fs::write(&core_file, b"{\"modes\":[\"code\"]}").unwrap();

    h.policy
        .record_deviations(&two_category_report(), &baseline())
        .await
        .unwrap();
    let results = h.policy.apply_pending().await.unwrap();
    assert_eq!(results.len(), 2);
    for (_, result) in &results {
        assert_eq!(result.as_ref().unwrap().status, CommitStatus::Applied);
    }

    let written: Value = serde_json::from_slice(&std::fs::read(&core_file).unwrap()).unwrap();
    assert_eq!(written, json!({"modes": ["code", "ask"]}));
    assert!(h
        .policy
        .rollback_manager()
        .has_rollback_point(&decision_id_for(1))
        .await
        .unwrap());

    let restore = h.policy.rollback_entry(1, "modes broke").await.unwrap();
    assert!(restore.success);
    assert_eq!(std::fs::read(&core_file).unwrap(), b"{\"modes\":[\"code\"]}");
    // The node config did not exist before its entry was applied.
    h.policy.rollback_entry(2, "pinning node").await.unwrap();
    assert!(!h.applied.join("software-node.json").exists());

    let stats = h.policy.log().statistics().await.unwrap();
    assert_eq!(stats.rolled_back_entries, 2);
    assert_eq!(stats.applied_entries, 0);
}

#[tokio::test]
async fn rollback_of_pending_entry_is_refused() {
    let h = harness();
    h.policy
        .record_deviations(&two_category_report(), &baseline())
        .await
        .unwrap();
    let err = h.policy.rollback_entry(1, "why").await.unwrap_err();
    assert!(matches!(
        err,
        PolicyError::CommitLog(CommitLogError::InvalidTransition { .. })
    ));
}

/// Writes a half-finished file, then reports failure.
struct BrokenApplier {
    root: PathBuf,
}

impl ConfigApplier for BrokenApplier {
    fn affected_files(&self, request: &ApplyRequest) -> Vec<PathBuf> {
        request
            .targets
            .iter()
            .map(|t| self.root.join(format!("{}.json", t.category)))
            .collect()
    }

    fn apply_config(&self, request: &ApplyRequest) -> ApplyOutcome {
        let files = self.affected_files(request);
        std::fs::create_dir_all(&self.root).unwrap();
        for file in &files {
            std::fs::write(file, "{ half").unwrap();
        }
        ApplyOutcome {
            success: false,
            files_applied: files,
            errors: vec!["disk full".into()],
        }
    }
}

#[tokio::test]
async fn failed_apply_is_undone_and_marked_retry() {
    let h = harness_with(|root| {
        Arc::new(BrokenApplier {
            root: root.to_path_buf(),
        })
    });
    let h = Harness {
        policy: h.policy.with_max_attempts(2),
        ..h
    };
    h.policy
        .record_deviations(
            &report(vec![deviation(
                ProfileCategory::RooCore,
                "",
                json!({"modes": ["code", "ask"]}),
                json!({"modes": []}),
            )]),
            &baseline(),
        )
        .await
        .unwrap();

    let first = h.policy.apply_entry(1).await.unwrap();
    assert_eq!(first.status, CommitStatus::Retry);
    assert_eq!(first.errors, vec!["disk full".to_string()]);
    assert!(!h.applied.join("roo-core.json").exists(), "partial write undone");
    assert!(!h
        .policy
        .rollback_manager()
        .has_rollback_point(&decision_id_for(1))
        .await
        .unwrap());

    // Second attempt is allowed, third is over the limit.
    assert_eq!(h.policy.apply_pending().await.unwrap().len(), 1);
    assert!(h.policy.apply_pending().await.unwrap().is_empty());
    let entry = h.policy.log().get_commit(1).await.unwrap().unwrap();
    assert_eq!(entry.attempts, 2);
    assert_eq!(entry.last_error.as_deref(), Some("disk full"));
}

#[tokio::test]
async fn non_config_entries_only_change_status() {
    let h = harness();
    let receipt = h
        .policy
        .log()
        .append_commit(
            MachineId::from("desk"),
            CommitStatus::Pending,
            CommitPayload::Decision(DecisionCommit {
                decision_id: "adopt-node-20".into(),
                title: "Adopt Node 20".into(),
                description: String::new(),
            }),
        )
        .await
        .unwrap();
    let report = h.policy.apply_entry(receipt.sequence_number).await.unwrap();
    assert_eq!(report.status, CommitStatus::Applied);
    assert!(report.files_applied.is_empty());
    assert!(!h.applied.exists());

    let restore = h
        .policy
        .rollback_entry(receipt.sequence_number, "reverted decision")
        .await
        .unwrap();
    assert!(restore.success);
}

/// Wrecks every backup of the entry's rollback point, then fails, so the
/// restore that follows cannot complete.
struct BackupWreckingApplier {
    root: PathBuf,
    point: PathBuf,
}

fn overwrite_files(dir: &Path) {
    for item in std::fs::read_dir(dir).unwrap() {
        let path = item.unwrap().path();
        if path.is_dir() {
            overwrite_files(&path);
        } else if path.file_name().and_then(|n| n.to_str()) != Some("rollback.json") {
            std::fs::write(&path, "garbage").unwrap();
        }
    }
}

impl ConfigApplier for BackupWreckingApplier {
    fn affected_files(&self, request: &ApplyRequest) -> Vec<PathBuf> {
        request
            .targets
            .iter()
            .map(|t| self.root.join(format!("{}.json", t.category)))
            .collect()
    }

    fn apply_config(&self, request: &ApplyRequest) -> ApplyOutcome {
        overwrite_files(&self.point);
        let files = self.affected_files(request);
        for file in &files {
            std::fs::write(file, "{ half").unwrap();
        }
        ApplyOutcome {
            success: false,
            files_applied: files,
            errors: vec!["disk full".into()],
        }
    }
}

#[tokio::test]
async fn stale_rollback_point_counts_as_a_failed_attempt() {
    let h = harness_with(|root| {
        Arc::new(BackupWreckingApplier {
            root: root.to_path_buf(),
            point: root.parent().unwrap().join("rollback").join(decision_id_for(1)),
        })
    });
    let h = Harness {
        policy: h.policy.with_max_attempts(3),
        ..h
    };
    std::fs::create_dir_all(&h.applied).unwrap();
    std::fs::write(h.applied.join("roo-core.json"), b"{\"modes\":[\"code\"]}").unwrap();
    h.policy
        .record_deviations(&two_category_report(), &baseline())
        .await
        .unwrap();

    let first = h.policy.apply_entry(1).await.unwrap();
    assert_eq!(first.status, CommitStatus::Retry);
    assert!(h
        .policy
        .rollback_manager()
        .has_rollback_point(&decision_id_for(1))
        .await
        .unwrap());

    let second = h.policy.apply_entry(1).await.unwrap();
    assert_eq!(second.status, CommitStatus::Retry);
    assert!(second.errors[0].contains("already exists"));
    let third = h.policy.apply_entry(1).await.unwrap();
    assert_eq!(third.status, CommitStatus::Retry);

    let entry = h.policy.log().get_commit(1).await.unwrap().unwrap();
    assert_eq!(entry.attempts, 3);
    // Over the limit: no longer picked up.
    assert!(h.policy.apply_pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn rollback_that_cannot_be_journaled_leaves_entry_applied() {
    let tmp = TempDir::new().unwrap();
    let log_dir = tmp.path().join("log");
    let applied = tmp.path().join("applied");
    let log = CommitLog::open_at(log_dir.clone(), policy(), Duration::from_secs(3600));
    let rollback = Arc::new(RollbackManager::new(tmp.path().join("rollback"), policy()));
    let reconcile = ReconciliationPolicy::new(
        log,
        rollback,
        Arc::new(FileApplier::new(applied.clone())),
        MachineId::from("desk"),
    );
    reconcile
        .record_deviations(&two_category_report(), &baseline())
        .await
        .unwrap();
    reconcile.apply_entry(1).await.unwrap();
    assert!(applied.join("roo-core.json").exists());

    // The entry's record can no longer be replaced.
    let record = log_dir.join("0000001.json");
    std::fs::remove_file(&record).unwrap();
    std::fs::create_dir_all(record.join("blocker")).unwrap();

    let err = reconcile.rollback_entry(1, "modes broke").await.unwrap_err();
    assert!(matches!(err, PolicyError::CommitLog(CommitLogError::Persist(_))));
    assert!(!applied.join("roo-core.json").exists(), "files were restored");
    let entry = reconcile.log().get_commit(1).await.unwrap().unwrap();
    assert_eq!(entry.status, CommitStatus::Applied);
}
