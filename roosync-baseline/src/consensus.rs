//! Consensus over many machine inventories.
//!
//! For each category the candidate values are grouped by their canonical
//! JSON form and weighed by the reporting machines' weights. A category's
//! support is the winning group's weight over the total weight of *all*
//! inventories, so machines that do not report the category count against
//! it. Categories below their confidence threshold are left out and
//! reported as conflicts.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use roosync_core::digest::canonical_json;
use roosync_core::{InventoryModel, MachineId, Profile, ProfileCategory, ProfileMetadata};

use crate::error::{BaselineError, CategoryConflict};

/// How agreement between machines is decided.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusStrategy {
    /// The value with the largest weight wins; ties go to the first seen.
    #[default]
    Majority,
    /// Every inventory must report the same value.
    Unanimous,
}

fn default_threshold() -> f64 {
    0.5
}

/// Tunables of [`aggregate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationConfig {
    #[serde(default)]
    pub strategy: ConsensusStrategy,
    /// Threshold for categories without an entry in `thresholds`.
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
    /// Per-category confidence thresholds in `(0, 1]`.
    #[serde(default)]
    pub thresholds: BTreeMap<ProfileCategory, f64>,
    /// Per-machine weights; 1.0 when absent.
    #[serde(default)]
    pub weights: BTreeMap<MachineId, f64>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            strategy: ConsensusStrategy::Majority,
            default_threshold: default_threshold(),
            thresholds: BTreeMap::new(),
            weights: BTreeMap::new(),
        }
    }
}

impl AggregationConfig {
    pub fn threshold_for(&self, category: ProfileCategory) -> f64 {
        self.thresholds
            .get(&category)
            .copied()
            .unwrap_or(self.default_threshold)
    }

    pub fn weight_for(&self, machine: &MachineId) -> f64 {
        self.weights.get(machine).copied().unwrap_or(1.0)
    }

    fn validate(&self) -> Result<(), BaselineError> {
        let thresholds = std::iter::once(("default", self.default_threshold))
            .chain(self.thresholds.iter().map(|(c, t)| (c.as_str(), *t)));
        for (name, threshold) in thresholds {
            if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
                return Err(BaselineError::Validation(format!(
                    "threshold for {name} must be in (0, 1], got {threshold}"
                )));
            }
        }
        for (machine, weight) in &self.weights {
            if !weight.is_finite() || *weight <= 0.0 {
                return Err(BaselineError::Validation(format!(
                    "weight for '{machine}' must be finite and > 0, got {weight}"
                )));
            }
        }
        Ok(())
    }
}

/// Profiles that reached consensus, plus the categories that did not.
#[derive(Debug, Clone, PartialEq)]
pub struct Consensus {
    pub profiles: Vec<Profile>,
    pub conflicts: Vec<CategoryConflict>,
}

struct Candidate<'a> {
    key: String,
    value: &'a Value,
    weight: f64,
}

/// Derive one profile per category the inventories agree on.
pub fn aggregate(
    inventories: &[InventoryModel],
    config: &AggregationConfig,
) -> Result<Consensus, BaselineError> {
    if inventories.is_empty() {
        return Err(BaselineError::Validation(
            "at least one inventory is required".to_string(),
        ));
    }
    config.validate()?;
    let mut seen = HashSet::new();
    for inventory in inventories {
        if !seen.insert(&inventory.machine_id) {
            return Err(BaselineError::Validation(format!(
                "duplicate inventory for machine '{}'",
                inventory.machine_id
            )));
        }
    }

    let total_weight: f64 = inventories
        .iter()
        .map(|inv| config.weight_for(&inv.machine_id))
        .sum();

    let mut consensus = Consensus {
        profiles: Vec::new(),
        conflicts: Vec::new(),
    };
    for &category in ProfileCategory::all() {
        let mut candidates: Vec<Candidate<'_>> = Vec::new();
        for inventory in inventories {
            let Some(value) = inventory.category_value(category) else {
                continue;
            };
            let weight = config.weight_for(&inventory.machine_id);
            let key = canonical_json(value);
            match candidates.iter().position(|c| c.key == key) {
                Some(index) => candidates[index].weight += weight,
                None => candidates.push(Candidate { key, value, weight }),
            }
        }
        if candidates.is_empty() {
            continue;
        }

        // Strictly greater keeps the first-seen candidate on ties.
        let mut best = &candidates[0];
        for candidate in &candidates[1..] {
            if candidate.weight > best.weight {
                best = candidate;
            }
        }
        let support = best.weight / total_weight;
        let threshold = config.threshold_for(category);
        let agreed = match config.strategy {
            ConsensusStrategy::Majority => support >= threshold,
            // Silent machines break unanimity as much as dissenting ones.
            ConsensusStrategy::Unanimous => {
                candidates.len() == 1 && support >= 1.0 - 1e-9 && support >= threshold
            }
        };

        if agreed {
            let mut profile = Profile::new(
                format!("aggregated-{category}"),
                category,
                best.value.clone(),
            );
            profile.metadata = ProfileMetadata {
                tags: vec!["aggregated".to_string()],
                ..ProfileMetadata::default()
            };
            consensus.profiles.push(profile);
        } else {
            tracing::info!(
                %category,
                support,
                threshold,
                candidates = candidates.len(),
                "category below confidence threshold, omitted",
            );
            consensus.conflicts.push(CategoryConflict {
                category,
                support,
                threshold,
                candidates: candidates.len(),
            });
        }
    }
    Ok(consensus)
}
