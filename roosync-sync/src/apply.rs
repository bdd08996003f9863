//! Materializing baseline configuration on this machine.
//!
//! [`ConfigApplier`] is the seam between the reconciliation policy and
//! whatever actually changes a machine. [`FileApplier`] is the built-in
//! implementation: one pretty-printed JSON file per category.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use roosync_core::persist::write_bytes_atomic;
use roosync_core::{MachineId, ProfileCategory};

/// One category's desired configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyTarget {
    pub category: ProfileCategory,
    pub configuration: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
    /// Baseline id the configuration comes from.
    pub version: String,
    pub machine_id: MachineId,
    pub targets: Vec<ApplyTarget>,
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyOutcome {
    pub success: bool,
    pub files_applied: Vec<PathBuf>,
    pub errors: Vec<String>,
}

/// Applies configuration to the local machine. Called on the blocking pool.
pub trait ConfigApplier: Send + Sync {
    /// Files `apply_config` may write for `request`; backed up beforehand.
    fn affected_files(&self, request: &ApplyRequest) -> Vec<PathBuf>;

    fn apply_config(&self, request: &ApplyRequest) -> ApplyOutcome;
}

/// Writes `<root>/<category>.json` for every target.
#[derive(Debug, Clone)]
pub struct FileApplier {
    root: PathBuf,
}

impl FileApplier {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, category: ProfileCategory) -> PathBuf {
        self.root.join(format!("{}.json", category.as_str()))
    }
}

impl ConfigApplier for FileApplier {
    fn affected_files(&self, request: &ApplyRequest) -> Vec<PathBuf> {
        request
            .targets
            .iter()
            .map(|target| self.path_for(target.category))
            .collect()
    }

    fn apply_config(&self, request: &ApplyRequest) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();
        for target in &request.targets {
            let path = self.path_for(target.category);
            if request.dry_run {
                outcome.files_applied.push(path);
                continue;
            }
            let written = serde_json::to_vec_pretty(&target.configuration)
                .map_err(std::io::Error::other)
                .and_then(|bytes| write_bytes_atomic(&path, &bytes));
            match written {
                Ok(()) => outcome.files_applied.push(path),
                Err(err) => outcome
                    .errors
                    .push(format!("{}: {err}", path.display())),
            }
        }
        outcome.success = outcome.errors.is_empty();
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn request(dry_run: bool) -> ApplyRequest {
        ApplyRequest {
            version: "b-1".into(),
            machine_id: MachineId::from("m1"),
            targets: vec![ApplyTarget {
                category: ProfileCategory::RooCore,
                configuration: json!({"modes": ["code"]}),
            }],
            dry_run,
        }
    }

    #[test]
    fn writes_one_file_per_category() {
        let tmp = TempDir::new().unwrap();
        let applier = FileApplier::new(tmp.path().join("applied"));
        let outcome = applier.apply_config(&request(false));
        assert!(outcome.success);
        let path = tmp.path().join("applied/roo-core.json");
        assert_eq!(outcome.files_applied, vec![path.clone()]);
        let written: Value = serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!(written, json!({"modes": ["code"]}));
    }

    #[test]
    fn dry_run_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let applier = FileApplier::new(tmp.path().join("applied"));
        let outcome = applier.apply_config(&request(true));
        assert!(outcome.success);
        assert_eq!(outcome.files_applied.len(), 1);
        assert!(!tmp.path().join("applied").exists());
    }

    #[test]
    fn affected_files_match_applied_files() {
        let tmp = TempDir::new().unwrap();
        let applier = FileApplier::new(tmp.path().to_path_buf());
        let req = request(false);
        assert_eq!(applier.affected_files(&req), applier.apply_config(&req).files_applied);
    }
}
