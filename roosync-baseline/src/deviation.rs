//! Comparing one machine against the active baseline.
//!
//! For every category the baseline has an opinion on, the machine's value is
//! deep-compared with the winning profile's configuration. Objects are
//! compared key by key and arrays index by index; every differing leaf is
//! one [`Deviation`] addressed by a JSON pointer inside the category. A
//! category the machine does not report at all is a single deviation at the
//! empty path.

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use roosync_core::paths;
use roosync_core::persist::{persist_json, retry_io};
use roosync_core::{
    Baseline, ComparisonReport, Deviation, DeviationKind, InventoryModel, MachineId,
    MachineMapping, Profile, ProfileCategory, ReportStatistics, RetryPolicy, Severity,
};

use crate::error::BaselineError;
use crate::inventory::InventorySource;
use crate::store::BaselineStore;

// ---------------------------------------------------------------------------
// Pure comparison
// ---------------------------------------------------------------------------

/// Severity of a deviation at `path` inside `category`.
pub fn severity_for(category: ProfileCategory, path: &str) -> Severity {
    let leaf = path.rsplit('/').next().unwrap_or_default();
    if category.is_software() && leaf == "version" {
        return Severity::Warning;
    }
    category.default_severity()
}

/// Every deviation of `inventory` from `baseline`, in canonical category order.
pub fn compute_deviations(baseline: &Baseline, inventory: &InventoryModel) -> Vec<Deviation> {
    let mut deviations = Vec::new();
    for category in baseline.categories() {
        let Some(profile) = baseline.profile_for(category) else {
            continue;
        };
        diff_category(category, &profile.configuration, inventory, &mut deviations);
    }
    deviations
}

fn diff_category(
    category: ProfileCategory,
    expected: &Value,
    inventory: &InventoryModel,
    out: &mut Vec<Deviation>,
) {
    match inventory.category_value(category) {
        Some(actual) => diff_values(category, String::new(), Some(expected), Some(actual), out),
        None => out.push(deviation(
            category,
            String::new(),
            DeviationKind::Missing,
            Some(expected.clone()),
            None,
        )),
    }
}

fn diff_values(
    category: ProfileCategory,
    path: String,
    expected: Option<&Value>,
    actual: Option<&Value>,
    out: &mut Vec<Deviation>,
) {
    match (expected, actual) {
        (Some(Value::Object(e)), Some(Value::Object(a))) => {
            let keys: BTreeSet<&String> = e.keys().chain(a.keys()).collect();
            for key in keys {
                let child = format!("{path}/{}", escape_pointer_token(key));
                diff_values(category, child, e.get(key), a.get(key), out);
            }
        }
        (Some(Value::Array(e)), Some(Value::Array(a))) => {
            for index in 0..e.len().max(a.len()) {
                let child = format!("{path}/{index}");
                diff_values(category, child, e.get(index), a.get(index), out);
            }
        }
        (Some(e), Some(a)) if e == a => {}
        (Some(e), Some(a)) => out.push(deviation(
            category,
            path,
            DeviationKind::Changed,
            Some(e.clone()),
            Some(a.clone()),
        )),
        (Some(e), None) => out.push(deviation(
            category,
            path,
            DeviationKind::Missing,
            Some(e.clone()),
            None,
        )),
        (None, Some(a)) => out.push(deviation(
            category,
            path,
            DeviationKind::Unexpected,
            None,
            Some(a.clone()),
        )),
        (None, None) => {}
    }
}

fn deviation(
    category: ProfileCategory,
    path: String,
    kind: DeviationKind,
    expected: Option<Value>,
    actual: Option<Value>,
) -> Deviation {
    let location = format!("{category}{path}");
    let description = match kind {
        DeviationKind::Missing => format!("{location}: missing on this machine"),
        DeviationKind::Unexpected => format!("{location}: not in the baseline"),
        DeviationKind::Changed => format!(
            "{location}: expected {}, found {}",
            compact(expected.as_ref()),
            compact(actual.as_ref())
        ),
    };
    Deviation {
        severity: severity_for(category, &path),
        category,
        path,
        kind,
        expected,
        actual,
        description,
    }
}

fn compact(value: Option<&Value>) -> String {
    value.map(Value::to_string).unwrap_or_else(|| "nothing".to_string())
}

/// RFC 6901 escaping of one pointer segment.
fn escape_pointer_token(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

/// Profiles whose required profiles are all satisfied and whose conflicting
/// profiles are not. A profile is satisfied when the machine's value for its
/// category matches the profile's configuration exactly.
pub fn applied_profiles(baseline: &Baseline, inventory: &InventoryModel) -> Vec<Profile> {
    let satisfied: HashSet<&str> = baseline
        .profiles
        .iter()
        .filter(|profile| {
            let mut found = Vec::new();
            diff_category(profile.category, &profile.configuration, inventory, &mut found);
            found.is_empty()
        })
        .map(|profile| profile.profile_id.as_str())
        .collect();

    baseline
        .profiles
        .iter()
        .filter(|profile| {
            let compat = &profile.compatibility;
            compat
                .required_profiles
                .iter()
                .all(|id| satisfied.contains(id.as_str()))
                && !compat
                    .conflicting_profiles
                    .iter()
                    .any(|id| satisfied.contains(id.as_str()))
        })
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// DeviationMapper
// ---------------------------------------------------------------------------

/// Maps machines onto the active baseline.
pub struct DeviationMapper {
    shared: PathBuf,
    policy: RetryPolicy,
    store: Arc<BaselineStore>,
    inventories: Arc<dyn InventorySource>,
}

impl DeviationMapper {
    pub fn new(
        shared: PathBuf,
        policy: RetryPolicy,
        store: Arc<BaselineStore>,
        inventories: Arc<dyn InventorySource>,
    ) -> Self {
        Self {
            shared,
            policy,
            store,
            inventories,
        }
    }

    pub fn store(&self) -> &BaselineStore {
        &self.store
    }

    async fn active_baseline(&self) -> Result<Baseline, BaselineError> {
        self.store
            .get_active_baseline()
            .await?
            .ok_or(BaselineError::NoActiveBaseline)
    }

    /// Compare `inventory` with the active baseline, which must be
    /// `baseline_id`, and persist the result as a new mapping.
    pub async fn map_machine_to_baseline(
        &self,
        machine_id: &MachineId,
        inventory: &InventoryModel,
        baseline_id: &str,
    ) -> Result<MachineMapping, BaselineError> {
        if inventory.machine_id != *machine_id {
            return Err(BaselineError::Validation(format!(
                "inventory belongs to '{}', not '{machine_id}'",
                inventory.machine_id
            )));
        }
        let baseline = self.active_baseline().await?;
        if baseline.baseline_id != baseline_id {
            return Err(BaselineError::NotActive {
                requested: baseline_id.to_string(),
                active: baseline.baseline_id,
            });
        }

        let mapping = MachineMapping {
            mapping_id: Uuid::new_v4().to_string(),
            machine_id: machine_id.clone(),
            baseline_id: baseline.baseline_id.clone(),
            applied_profiles: applied_profiles(&baseline, inventory),
            deviations: compute_deviations(&baseline, inventory),
            created_at: Utc::now(),
        };
        let path = paths::mappings_dir(&self.shared, machine_id)
            .join(format!("{}.json", mapping.mapping_id));
        persist_json(&self.policy, &path, &mapping).await?;
        tracing::info!(
            machine = %machine_id,
            baseline_id,
            deviations = mapping.deviations.len(),
            applied_profiles = mapping.applied_profiles.len(),
            "machine mapped to baseline",
        );
        Ok(mapping)
    }

    /// Compare `machine_id`'s current inventory with the active baseline.
    /// Nothing is persisted.
    pub async fn compare_with_non_nominative_baseline(
        &self,
        machine_id: &MachineId,
    ) -> Result<ComparisonReport, BaselineError> {
        let baseline = self.active_baseline().await?;
        let inventory = self.collect(machine_id).await?;
        Ok(compare(&baseline, &inventory))
    }

    async fn collect(&self, machine_id: &MachineId) -> Result<InventoryModel, BaselineError> {
        let source = Arc::clone(&self.inventories);
        let machine = machine_id.clone();
        let location = paths::inventory_path(&self.shared, machine_id);
        retry_io(&self.policy, &location, move || source.collect_inventory(&machine))
            .await?
            .ok_or_else(|| BaselineError::InventoryNotFound(machine_id.clone()))
    }
}

/// Build an ephemeral report for `inventory` against `baseline`.
pub fn compare(baseline: &Baseline, inventory: &InventoryModel) -> ComparisonReport {
    let differences = compute_deviations(baseline, inventory);
    ComparisonReport {
        report_id: Uuid::new_v4().to_string(),
        baseline_id: baseline.baseline_id.clone(),
        machine_id: inventory.machine_id.clone(),
        statistics: ReportStatistics::from_deviations(&differences),
        differences,
        generated_at: Utc::now(),
    }
}
