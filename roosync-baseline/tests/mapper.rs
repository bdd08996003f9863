use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tempfile::TempDir;

use roosync_baseline::{
    render_deviation, BaselineError, BaselineStore, DeviationMapper, SharedInventorySource,
};
use roosync_core::paths;
use roosync_core::{
    DeviationKind, InventoryModel, MachineId, MachineMapping, Profile, ProfileCategory,
    RetryPolicy, Severity,
};

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 1,
        delay: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
    }
}

struct Fixture {
    tmp: TempDir,
    source: Arc<SharedInventorySource>,
    mapper: DeviationMapper,
}

fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let shared = tmp.path().to_path_buf();
    let store = Arc::new(BaselineStore::new(shared.clone(), policy()));
    let source = Arc::new(SharedInventorySource::new(shared.clone()));
    let mapper = DeviationMapper::new(shared, policy(), store, source.clone());
    Fixture { tmp, source, mapper }
}

fn inventory(machine: &str, config: Value) -> InventoryModel {
    InventoryModel {
        machine_id: MachineId::from(machine),
        timestamp: Utc::now(),
        config,
    }
}

fn team_profiles() -> Vec<Profile> {
    vec![
        Profile::new("core", ProfileCategory::RooCore, json!(["code", "ask"])),
        Profile::new("node", ProfileCategory::SoftwareNode, json!({"version": "20.11.0"})),
        Profile::new("os", ProfileCategory::SystemOs, json!("Windows 11")),
    ]
}

#[tokio::test]
async fn comparing_without_baseline_fails() {
    let fx = fixture();
    let err = fx
        .mapper
        .compare_with_non_nominative_baseline(&MachineId::from("desk"))
        .await
        .unwrap_err();
    assert!(matches!(err, BaselineError::NoActiveBaseline));
}

#[tokio::test]
async fn comparing_without_inventory_fails() {
    let fx = fixture();
    fx.mapper.store().create_baseline("team", "", team_profiles()).await.unwrap();
    let err = fx
        .mapper
        .compare_with_non_nominative_baseline(&MachineId::from("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, BaselineError::InventoryNotFound(m) if m.as_str() == "ghost"));
}

#[tokio::test]
async fn comparison_reports_each_difference() {
    let fx = fixture();
    let baseline = fx
        .mapper
        .store()
        .create_baseline("team", "", team_profiles())
        .await
        .unwrap();
    fx.source
        .publish(&inventory(
            "desk",
            json!({
                "roo": {"modes": ["code", "ask"]},
                "software": {"node": {"version": "18.19.0"}}
            }),
        ))
        .unwrap();

    let report = fx
        .mapper
        .compare_with_non_nominative_baseline(&MachineId::from("desk"))
        .await
        .unwrap();

    assert_eq!(report.baseline_id, baseline.baseline_id);
    assert_eq!(report.statistics.total, 2);
    let node = &report.differences[0];
    assert_eq!(node.category, ProfileCategory::SoftwareNode);
    assert_eq!(node.path, "/version");
    assert_eq!(node.kind, DeviationKind::Changed);
    assert_eq!(node.severity, Severity::Warning);
    let os = &report.differences[1];
    assert_eq!(os.category, ProfileCategory::SystemOs);
    assert_eq!(os.kind, DeviationKind::Missing);
    assert_eq!(os.path, "");

    let rendered = render_deviation(node);
    assert!(rendered.contains("-\"20.11.0\""));
    assert!(rendered.contains("+\"18.19.0\""));

    // Comparisons are never persisted.
    assert!(!paths::mappings_dir(fx.tmp.path(), &MachineId::from("desk")).exists());
}

#[tokio::test]
async fn mapping_is_persisted_with_applied_profiles() {
    let fx = fixture();
    let baseline = fx
        .mapper
        .store()
        .create_baseline("team", "", team_profiles())
        .await
        .unwrap();
    let machine = MachineId::from("desk");
    let inv = inventory(
        "desk",
        json!({
            "roo": {"modes": ["code", "ask"]},
            "software": {"node": {"version": "20.11.0"}},
            "system": {"os": "Windows 10"}
        }),
    );

    let mapping = fx
        .mapper
        .map_machine_to_baseline(&machine, &inv, &baseline.baseline_id)
        .await
        .unwrap();

    let applied: Vec<&str> = mapping
        .applied_profiles
        .iter()
        .map(|p| p.profile_id.as_str())
        .collect();
    assert_eq!(applied, vec!["core", "node", "os"]);
    assert_eq!(mapping.deviations.len(), 1);
    assert_eq!(mapping.deviations[0].severity, Severity::Important);

    let path = paths::mappings_dir(fx.tmp.path(), &machine)
        .join(format!("{}.json", mapping.mapping_id));
    let stored: MachineMapping = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
    assert_eq!(stored, mapping);
}

#[tokio::test]
async fn required_profile_must_be_satisfied() {
    let fx = fixture();
    let mut profiles = team_profiles();
    profiles[1].compatibility.required_profiles = vec!["os".to_string()];
    profiles[0].compatibility.conflicting_profiles = vec!["node".to_string()];
    let baseline = fx.mapper.store().create_baseline("team", "", profiles).await.unwrap();

    let inv = inventory(
        "desk",
        json!({
            "roo": {"modes": ["code", "ask"]},
            "software": {"node": {"version": "20.11.0"}},
            "system": {"os": "Windows 10"}
        }),
    );
    let mapping = fx
        .mapper
        .map_machine_to_baseline(&MachineId::from("desk"), &inv, &baseline.baseline_id)
        .await
        .unwrap();

    // "node" requires "os", which the machine does not match; "core"
    // conflicts with "node", which the machine does match.
    let applied: Vec<&str> = mapping
        .applied_profiles
        .iter()
        .map(|p| p.profile_id.as_str())
        .collect();
    assert_eq!(applied, vec!["os"]);
}

#[tokio::test]
async fn mapping_against_stale_baseline_is_refused() {
    let fx = fixture();
    let old = fx.mapper.store().create_baseline("old", "", vec![]).await.unwrap();
    let new = fx.mapper.store().create_baseline("new", "", vec![]).await.unwrap();
    let machine = MachineId::from("desk");

    let err = fx
        .mapper
        .map_machine_to_baseline(&machine, &inventory("desk", json!({})), &old.baseline_id)
        .await
        .unwrap_err();
    match err {
        BaselineError::NotActive { requested, active } => {
            assert_eq!(requested, old.baseline_id);
            assert_eq!(active, new.baseline_id);
        }
        other => panic!("expected NotActive, got {other:?}"),
    }
}

#[tokio::test]
async fn inventory_of_another_machine_is_rejected() {
    let fx = fixture();
    let baseline = fx.mapper.store().create_baseline("b", "", vec![]).await.unwrap();
    let err = fx
        .mapper
        .map_machine_to_baseline(
            &MachineId::from("desk"),
            &inventory("laptop", json!({})),
            &baseline.baseline_id,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BaselineError::Validation(_)));
}
