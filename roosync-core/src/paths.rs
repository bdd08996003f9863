//! Directory layout of the shared store and of machine-local state.
//!
//! ```text
//! <shared>/
//!   commit-log/<machine>/0000001.json      one CommitEntry per file
//!   commit-log/<machine>/state.json        aggregate snapshot
//!   non-nominative-baseline.json           the single active Baseline
//!   sync-config.ref.json                   legacy single-machine baseline
//!   baseline-backups/                      pre-mutation copies
//!   mappings/<machine>/<mapping_id>.json   MachineMapping history
//!   inventories/<machine>.json             InventoryModel per machine
//!   packages/<machine>/<version>/          config package (manifest.json + artifacts)
//!   packages/<machine>/latest.json         {path} pointer to the newest package
//!
//! <home>/.roosync/
//!   config.yaml
//!   rollback/<decision_id>/                rollback points
//!   applied/<category>.json                materialized configuration
//! ```

use std::path::{Path, PathBuf};

use crate::types::MachineId;

pub const STATE_FILE: &str = "state.json";
pub const BASELINE_FILE: &str = "non-nominative-baseline.json";
pub const LEGACY_BASELINE_FILE: &str = "sync-config.ref.json";
pub const MANIFEST_FILE: &str = "manifest.json";
pub const LATEST_POINTER_FILE: &str = "latest.json";
pub const ROLLBACK_MANIFEST_FILE: &str = "rollback.json";

/// Width of the zero-padded sequence number in record file names.
pub const SEQUENCE_WIDTH: usize = 7;

// ---------------------------------------------------------------------------
// Shared store
// ---------------------------------------------------------------------------

pub fn commit_log_dir(shared: &Path, machine: &MachineId) -> PathBuf {
    shared.join("commit-log").join(machine.as_str())
}

/// `<dir>/0000042.json`
pub fn commit_record_path(log_dir: &Path, sequence: u64) -> PathBuf {
    log_dir.join(format!("{sequence:0width$}.json", width = SEQUENCE_WIDTH))
}

pub fn commit_state_path(log_dir: &Path) -> PathBuf {
    log_dir.join(STATE_FILE)
}

/// Sequence number encoded in a record file name, if it is one.
///
/// Accepts all-digit stems of at least [`SEQUENCE_WIDTH`] digits so that
/// numbers past 9,999,999 still round-trip.
pub fn parse_record_file_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(".json")?;
    if stem.len() < SEQUENCE_WIDTH || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok().filter(|seq| *seq > 0)
}

pub fn baseline_path(shared: &Path) -> PathBuf {
    shared.join(BASELINE_FILE)
}

pub fn legacy_baseline_path(shared: &Path) -> PathBuf {
    shared.join(LEGACY_BASELINE_FILE)
}

pub fn baseline_backups_dir(shared: &Path) -> PathBuf {
    shared.join("baseline-backups")
}

pub fn mappings_dir(shared: &Path, machine: &MachineId) -> PathBuf {
    shared.join("mappings").join(machine.as_str())
}

pub fn inventories_dir(shared: &Path) -> PathBuf {
    shared.join("inventories")
}

pub fn inventory_path(shared: &Path, machine: &MachineId) -> PathBuf {
    inventories_dir(shared).join(format!("{}.json", machine.as_str()))
}

pub fn packages_dir(shared: &Path, machine: &MachineId) -> PathBuf {
    shared.join("packages").join(machine.as_str())
}

pub fn latest_package_pointer(shared: &Path, machine: &MachineId) -> PathBuf {
    packages_dir(shared, machine).join(LATEST_POINTER_FILE)
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

/// `<home>/.roosync/`
pub fn roosync_root(home: &Path) -> PathBuf {
    home.join(".roosync")
}

pub fn config_path(home: &Path) -> PathBuf {
    roosync_root(home).join("config.yaml")
}

pub fn rollback_dir(local_root: &Path) -> PathBuf {
    local_root.join("rollback")
}

pub fn apply_root(local_root: &Path) -> PathBuf {
    local_root.join("applied")
}
