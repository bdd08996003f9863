//! Serialisation contract tests for the shared-store record shapes.
//!
//! Every machine reads these files, so field names and tags are pinned here.

use chrono::Utc;
use roosync_core::{
    Baseline, BaselineAction, BaselineCommit, CommitEntry, CommitPayload, CommitStatus,
    ConfigCommit, DecisionCommit, MachineId, Profile, ProfileCategory, Severity, SyncCommit,
};
use rstest::rstest;
use serde_json::json;

fn baseline_payload() -> CommitPayload {
    CommitPayload::Baseline(BaselineCommit {
        baseline_id: "b-1".into(),
        action: BaselineAction::Aggregated,
        profiles_count: 4,
    })
}

fn config_payload() -> CommitPayload {
    CommitPayload::Config(ConfigCommit {
        baseline_id: "b-1".into(),
        category: ProfileCategory::RooCore,
        expected: json!({"modes": ["code", "architect"]}),
        actual: None,
        severity: Severity::Critical,
        deviation_count: 2,
    })
}

fn sync_payload() -> CommitPayload {
    CommitPayload::Sync(SyncCommit {
        source_machine: MachineId::from("tower"),
        baseline_id: "b-1".into(),
        categories: vec![ProfileCategory::SoftwareNode],
    })
}

fn unicode_payload() -> CommitPayload {
    CommitPayload::Decision(DecisionCommit {
        decision_id: "d-🚀".into(),
        title: "Décision: 日本語・한국어 <>&\"'".into(),
        description: "العربية".into(),
    })
}

#[rstest]
#[case("baseline", baseline_payload(), "BASELINE")]
#[case("config", config_payload(), "CONFIG")]
#[case("sync", sync_payload(), "SYNC")]
#[case("unicode", unicode_payload(), "DECISION")]
fn entry_type_tag_and_hash_survive_roundtrip(
    #[case] label: &str,
    #[case] payload: CommitPayload,
    #[case] tag: &str,
) {
    let entry = CommitEntry::new(9, MachineId::from("desk"), CommitStatus::Pending, payload)
        .unwrap_or_else(|e| panic!("[{label}] build failed: {e}"));
    let json = serde_json::to_string_pretty(&entry)
        .unwrap_or_else(|e| panic!("[{label}] serialize failed: {e}"));
    let value: serde_json::Value = serde_json::from_str(&json).expect("value");
    assert_eq!(value["type"], json!(tag), "[{label}] type tag");
    assert_eq!(value["contentHash"], json!(entry.content_hash), "[{label}] hash field");

    let back: CommitEntry = serde_json::from_str(&json)
        .unwrap_or_else(|e| panic!("[{label}] deserialize failed: {e}"));
    assert_eq!(back, entry, "[{label}] entry");
    assert!(back.integrity_issue().is_none(), "[{label}] integrity");
}

#[rstest]
#[case(CommitStatus::Pending, "PENDING")]
#[case(CommitStatus::Applied, "APPLIED")]
#[case(CommitStatus::RolledBack, "ROLLED_BACK")]
#[case(CommitStatus::Retry, "RETRY")]
fn status_wire_names(#[case] status: CommitStatus, #[case] wire: &str) {
    assert_eq!(serde_json::to_value(status).unwrap(), json!(wire));
    assert_eq!(status.to_string(), wire);
}

#[test]
fn baseline_file_shape_is_camel_case() {
    let baseline = Baseline {
        baseline_id: "b-7".into(),
        name: "team".into(),
        description: "shared modes".into(),
        profiles: vec![Profile::new(
            "roo-core-1",
            ProfileCategory::RooCore,
            json!(["code"]),
        )],
        timestamp: Utc::now(),
    };
    let value = serde_json::to_value(&baseline).unwrap();
    assert_eq!(value["baselineId"], json!("b-7"));
    let profile = &value["profiles"][0];
    assert_eq!(profile["profileId"], json!("roo-core-1"));
    assert_eq!(profile["category"], json!("roo-core"));
    assert_eq!(profile["metadata"]["stability"], json!("stable"));
    assert!(profile["compatibility"]["requiredProfiles"].is_array());
}

#[test]
fn unknown_category_is_rejected() {
    let raw = json!({
        "profileId": "p",
        "category": "hardware-quantum",
        "configuration": {}
    });
    assert!(serde_json::from_value::<Profile>(raw).is_err());
}
