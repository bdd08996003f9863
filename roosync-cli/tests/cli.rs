use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use serde_json::{json, Value};
use tempfile::TempDir;

struct Env {
    home: TempDir,
    shared: PathBuf,
}

impl Env {
    fn new() -> Self {
        let home = TempDir::new().expect("home");
        let shared = home.path().join("shared");
        Self { home, shared }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("roosync").expect("roosync binary");
        cmd.env("HOME", self.home.path())
            .env("USERPROFILE", self.home.path())
            .env_remove("ROOSYNC_SHARED_PATH")
            .env_remove("ROOSYNC_MACHINE_ID")
            .env_remove("RUST_LOG");
        cmd
    }

    fn init(&self) {
        self.cmd()
            .args(["init", "--machine", "desk", "--shared"])
            .arg(&self.shared)
            .assert()
            .success()
            .stdout(contains("Initialized machine 'desk'"));
    }

    fn write(&self, name: &str, value: &Value) -> PathBuf {
        let path = self.home.path().join(name);
        fs::write(&path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
        path
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().arg("--json").args(args).output().unwrap();
        assert!(
            output.status.success(),
            "{args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).expect("JSON on stdout")
    }
}

fn seed_baseline(env: &Env) {
    let profiles = env.write(
        "profiles.json",
        &json!([
            {"profileId": "core", "category": "roo-core", "configuration": ["code", "ask"]},
            {"profileId": "os", "category": "system-os", "configuration": "Windows 11"}
        ]),
    );
    env.cmd()
        .args(["baseline", "create", "--name", "team", "--profiles"])
        .arg(&profiles)
        .assert()
        .success()
        .stdout(contains("Baseline 'team' is now active (2 profile(s))"));

    let inventory = env.write(
        "inventory.json",
        &json!({"roo": {"modes": ["code"]}, "system": {"os": "Windows 11"}}),
    );
    env.cmd()
        .args(["inventory", "publish"])
        .arg(&inventory)
        .assert()
        .success()
        .stdout(contains("Published inventory for 'desk' (2 categories)"));
}

fn applied_file(env: &Env) -> PathBuf {
    env.home.path().join(".roosync/applied/roo-core.json")
}

#[test]
fn commands_require_init() {
    let env = Env::new();
    env.cmd()
        .args(["commit", "list"])
        .assert()
        .failure()
        .stderr(contains("roosync init"));
}

#[test]
fn init_refuses_to_overwrite_without_force() {
    let env = Env::new();
    env.init();
    env.cmd()
        .args(["init", "--machine", "desk", "--shared"])
        .arg(&env.shared)
        .assert()
        .failure()
        .stderr(contains("--force"));
    env.cmd()
        .args(["init", "--force", "--machine", "laptop", "--shared"])
        .arg(&env.shared)
        .assert()
        .success();
}

#[test]
fn invalid_machine_id_is_rejected() {
    let env = Env::new();
    env.cmd()
        .args(["init", "--machine", "bad id", "--shared"])
        .arg(&env.shared)
        .assert()
        .failure()
        .stderr(contains("machine_id"));
}

#[test]
fn compare_reports_deviations_without_recording() {
    let env = Env::new();
    env.init();
    seed_baseline(&env);

    let report = env.json(&["compare"]);
    assert_eq!(report["statistics"]["total"], 1);
    assert_eq!(report["differences"][0]["category"], "roo-core");
    assert_eq!(report["differences"][0]["path"], "/1");
    assert_eq!(report["differences"][0]["kind"], "missing");

    env.cmd()
        .args(["compare", "--diff"])
        .assert()
        .success()
        .stdout(contains("--- baseline/roo-core/1"));

    // Only the baseline installation is journaled.
    let log = env.json(&["commit", "list"]);
    assert_eq!(log["totalCount"], 1);
    assert_eq!(log["entries"][0]["type"], "BASELINE");
}

#[test]
fn recorded_deviation_applies_and_rolls_back() {
    let env = Env::new();
    env.init();
    seed_baseline(&env);

    env.cmd()
        .args(["compare", "--record"])
        .assert()
        .success()
        .stdout(contains("Recorded 1 new commit entr(ies)"));
    // Recording twice does not duplicate the entry.
    env.cmd()
        .args(["compare", "--record"])
        .assert()
        .success()
        .stdout(contains("Recorded 0 new commit entr(ies)"));

    let applied = env.json(&["commit", "apply-pending"]);
    assert_eq!(applied[0]["sequenceNumber"], 2);
    assert_eq!(applied[0]["status"], "APPLIED");
    let written: Value = serde_json::from_slice(&fs::read(applied_file(&env)).unwrap()).unwrap();
    assert_eq!(written, json!(["code", "ask"]));

    let points = env.json(&["rollback", "list"]);
    assert_eq!(points[0]["decisionId"], "commit-0000002");

    env.cmd()
        .args(["commit", "rollback", "2", "--reason", "broke the editor"])
        .assert()
        .success()
        .stdout(contains("Entry 2 rolled back"));
    assert!(!applied_file(&env).exists());

    let entry = env.json(&["commit", "show", "2"]);
    assert_eq!(entry["status"], "ROLLED_BACK");
    assert_eq!(entry["rollbackReason"], "broke the editor");

    env.cmd().args(["commit", "verify"]).assert().success();
}

#[test]
fn rollback_requires_a_reason() {
    let env = Env::new();
    env.init();
    env.cmd()
        .args(["commit", "rollback", "1"])
        .assert()
        .failure()
        .stderr(contains("--reason"));
}

#[test]
fn tampered_entry_fails_verification() {
    let env = Env::new();
    env.init();
    seed_baseline(&env);

    let record = env.shared.join("commit-log/desk/0000001.json");
    let mut entry: Value = serde_json::from_slice(&fs::read(&record).unwrap()).unwrap();
    entry["data"]["profilesCount"] = json!(99);
    fs::write(&record, serde_json::to_vec_pretty(&entry).unwrap()).unwrap();

    env.cmd()
        .args(["commit", "verify"])
        .assert()
        .failure()
        .stdout(contains("entry 1"));
}

#[test]
fn aggregate_from_published_inventories() {
    let env = Env::new();
    env.init();
    for (machine, os) in [("a", "Windows 11"), ("b", "Windows 11"), ("c", "Linux")] {
        let file = env.write(
            &format!("{machine}.json"),
            &json!({"system": {"os": os}, "roo": {"modes": [machine]}}),
        );
        env.cmd()
            .args(["inventory", "publish", "--machine", machine])
            .arg(&file)
            .assert()
            .success();
    }

    let outcome = env.json(&["baseline", "aggregate", "--name", "fleet"]);
    let profiles = outcome["baseline"]["profiles"].as_array().unwrap();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0]["category"], "system-os");
    assert_eq!(profiles[0]["configuration"], "Windows 11");
    assert_eq!(outcome["conflicts"][0]["category"], "roo-core");

    env.cmd()
        .args(["baseline", "aggregate", "--name", "strict", "--threshold", "0.9"])
        .assert()
        .failure()
        .stderr(contains("aggregation failed"));
}

#[test]
fn package_collect_show_and_verify() {
    let env = Env::new();
    env.init();
    let settings = env.write("settings.json", &json!({"modes": ["code"]}));

    let manifest = env.json(&["package", "collect", "--author", "ops", settings.to_str().unwrap()]);
    let version = manifest["version"].as_str().unwrap().to_string();
    assert_eq!(manifest["files"][0]["type"], "json");

    env.cmd()
        .args(["package", "show"])
        .assert()
        .success()
        .stdout(contains(version.as_str()).and(contains("settings.json")));
    env.cmd()
        .args(["package", "verify"])
        .assert()
        .success()
        .stdout(contains("is intact"));

    let artifact = package_dir(&env.shared, &version).join("settings.json");
    fs::write(&artifact, "{}").unwrap();
    env.cmd()
        .args(["package", "verify", "--version", &version])
        .assert()
        .failure()
        .stdout(contains("settings.json: hash mismatch"));
}

fn package_dir(shared: &Path, version: &str) -> PathBuf {
    shared.join("packages/desk").join(version)
}
