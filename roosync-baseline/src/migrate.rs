//! Conversion of the legacy single-machine reference file
//! (`sync-config.ref.json`) into category profiles.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use roosync_core::{Baseline, InventoryModel, MachineId, Profile, ProfileCategory, ProfileMetadata};

/// The legacy reference file: one machine's whole configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyBaseline {
    pub machine_id: MachineId,
    #[serde(default)]
    pub version: String,
    /// Free-form in legacy files, so kept as text.
    #[serde(default)]
    pub last_updated: Option<String>,
    pub config: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationOptions {
    /// Copy the legacy file and the current baseline to `baseline-backups/` first.
    pub create_backup: bool,
    /// Name of the new baseline; derived from the legacy machine when absent.
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOutcome {
    pub success: bool,
    pub new_baseline: Baseline,
    pub profiles_count: usize,
}

/// One profile per category the legacy config reports, tagged `migrated`.
pub fn profiles_from_legacy(legacy: &LegacyBaseline) -> Vec<Profile> {
    // The legacy config uses the same layout as an inventory.
    let view = InventoryModel {
        machine_id: legacy.machine_id.clone(),
        timestamp: chrono::Utc::now(),
        config: legacy.config.clone(),
    };
    let version = if legacy.version.trim().is_empty() {
        ProfileMetadata::default().version
    } else {
        legacy.version.clone()
    };

    ProfileCategory::all()
        .iter()
        .filter_map(|&category| {
            let value = view.category_value(category)?;
            let mut profile = Profile::new(format!("migrated-{category}"), category, value.clone());
            profile.metadata = ProfileMetadata {
                version: version.clone(),
                tags: vec![
                    "migrated".to_string(),
                    format!("source:{}", legacy.machine_id),
                ],
                ..ProfileMetadata::default()
            };
            Some(profile)
        })
        .collect()
}
