//! Domain types for the desired-state model.
//!
//! Everything that lands in the shared store serializes with camelCase field
//! names so that every machine reads the same JSON shape.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A strongly-typed identifier for a machine participating in the shared store.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(pub String);

impl MachineId {
    /// Machine ids become directory names in the shared store, so only a
    /// conservative character set is accepted.
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for MachineId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MachineId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Profile categories
// ---------------------------------------------------------------------------

/// The fixed set of configuration categories a profile can describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProfileCategory {
    RooCore,
    RooAdvanced,
    HardwareCpu,
    HardwareMemory,
    HardwareStorage,
    HardwareGpu,
    SoftwarePowershell,
    SoftwareNode,
    SoftwarePython,
    SystemOs,
    SystemArchitecture,
}

impl ProfileCategory {
    /// Every category, in canonical order.
    pub fn all() -> &'static [ProfileCategory] {
        &[
            ProfileCategory::RooCore,
            ProfileCategory::RooAdvanced,
            ProfileCategory::HardwareCpu,
            ProfileCategory::HardwareMemory,
            ProfileCategory::HardwareStorage,
            ProfileCategory::HardwareGpu,
            ProfileCategory::SoftwarePowershell,
            ProfileCategory::SoftwareNode,
            ProfileCategory::SoftwarePython,
            ProfileCategory::SystemOs,
            ProfileCategory::SystemArchitecture,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProfileCategory::RooCore => "roo-core",
            ProfileCategory::RooAdvanced => "roo-advanced",
            ProfileCategory::HardwareCpu => "hardware-cpu",
            ProfileCategory::HardwareMemory => "hardware-memory",
            ProfileCategory::HardwareStorage => "hardware-storage",
            ProfileCategory::HardwareGpu => "hardware-gpu",
            ProfileCategory::SoftwarePowershell => "software-powershell",
            ProfileCategory::SoftwareNode => "software-node",
            ProfileCategory::SoftwarePython => "software-python",
            ProfileCategory::SystemOs => "system-os",
            ProfileCategory::SystemArchitecture => "system-architecture",
        }
    }

    /// JSON pointer locating this category inside an inventory's `config` object.
    pub fn inventory_pointer(self) -> &'static str {
        match self {
            ProfileCategory::RooCore => "/roo/modes",
            ProfileCategory::RooAdvanced => "/roo/mcpSettings",
            ProfileCategory::HardwareCpu => "/hardware/cpu",
            ProfileCategory::HardwareMemory => "/hardware/memory",
            ProfileCategory::HardwareStorage => "/hardware/disks",
            ProfileCategory::HardwareGpu => "/hardware/gpu",
            ProfileCategory::SoftwarePowershell => "/software/powershell",
            ProfileCategory::SoftwareNode => "/software/node",
            ProfileCategory::SoftwarePython => "/software/python",
            ProfileCategory::SystemOs => "/system/os",
            ProfileCategory::SystemArchitecture => "/system/architecture",
        }
    }

    /// Severity assigned to a mismatch in this category when nothing more
    /// specific applies.
    pub fn default_severity(self) -> Severity {
        match self {
            ProfileCategory::RooCore => Severity::Critical,
            ProfileCategory::RooAdvanced
            | ProfileCategory::SystemOs
            | ProfileCategory::SystemArchitecture => Severity::Important,
            ProfileCategory::SoftwarePowershell
            | ProfileCategory::SoftwareNode
            | ProfileCategory::SoftwarePython => Severity::Warning,
            ProfileCategory::HardwareCpu
            | ProfileCategory::HardwareMemory
            | ProfileCategory::HardwareStorage
            | ProfileCategory::HardwareGpu => Severity::Info,
        }
    }

    pub fn is_software(self) -> bool {
        matches!(
            self,
            ProfileCategory::SoftwarePowershell
                | ProfileCategory::SoftwareNode
                | ProfileCategory::SoftwarePython
        )
    }
}

impl fmt::Display for ProfileCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProfileCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProfileCategory::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown profile category '{s}'"))
    }
}

// ---------------------------------------------------------------------------
// Profiles and baselines
// ---------------------------------------------------------------------------

/// Release maturity of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Stability {
    #[default]
    Stable,
    Experimental,
    Deprecated,
}

/// Relationships between profiles inside one baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProfileCompatibility {
    #[serde(default)]
    pub required_profiles: Vec<String>,
    #[serde(default)]
    pub conflicting_profiles: Vec<String>,
    #[serde(default)]
    pub optional_profiles: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileMetadata {
    pub version: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub stability: Stability,
}

impl Default for ProfileMetadata {
    fn default() -> Self {
        Self {
            version: "1.0.0".to_string(),
            tags: vec![],
            stability: Stability::Stable,
        }
    }
}

/// One categorized, versioned configuration fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub profile_id: String,
    pub category: ProfileCategory,
    pub configuration: Value,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub compatibility: ProfileCompatibility,
    #[serde(default)]
    pub metadata: ProfileMetadata,
}

impl Profile {
    /// A stable profile with no compatibility constraints.
    pub fn new(profile_id: impl Into<String>, category: ProfileCategory, configuration: Value) -> Self {
        Self {
            profile_id: profile_id.into(),
            category,
            configuration,
            priority: 0,
            compatibility: ProfileCompatibility::default(),
            metadata: ProfileMetadata::default(),
        }
    }
}

/// Canonical desired-state configuration composed of profiles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    pub baseline_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    pub timestamp: DateTime<Utc>,
}

impl Baseline {
    /// The profile that speaks for `category`: highest priority wins, first
    /// listed wins among equals.
    pub fn profile_for(&self, category: ProfileCategory) -> Option<&Profile> {
        self.profiles
            .iter()
            .filter(|p| p.category == category)
            .fold(None, |best: Option<&Profile>, p| match best {
                Some(b) if b.priority >= p.priority => Some(b),
                _ => Some(p),
            })
    }

    /// Categories this baseline has an opinion on, in canonical order.
    pub fn categories(&self) -> Vec<ProfileCategory> {
        ProfileCategory::all()
            .iter()
            .copied()
            .filter(|c| self.profiles.iter().any(|p| p.category == *c))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Inventories
// ---------------------------------------------------------------------------

/// One machine's current configuration snapshot, as collected externally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryModel {
    pub machine_id: MachineId,
    pub timestamp: DateTime<Utc>,
    pub config: Value,
}

impl InventoryModel {
    /// The machine's value for `category`; `None` when the machine does not
    /// report it (an explicit JSON `null` counts as not reported).
    pub fn category_value(&self, category: ProfileCategory) -> Option<&Value> {
        self.config
            .pointer(category.inventory_pointer())
            .filter(|v| !v.is_null())
    }
}

// ---------------------------------------------------------------------------
// Deviations and reports
// ---------------------------------------------------------------------------

/// Severity of a deviation, ordered from most to least urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Important,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Important => write!(f, "important"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviationKind {
    /// Baseline has a value the machine lacks.
    Missing,
    /// Machine has a value inside a baseline category the baseline lacks.
    Unexpected,
    /// Both sides have a value and they differ.
    Changed,
}

/// A detected difference between a machine and the active baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deviation {
    pub category: ProfileCategory,
    /// JSON pointer inside the category value; empty for the whole category.
    pub path: String,
    pub kind: DeviationKind,
    pub expected: Option<Value>,
    pub actual: Option<Value>,
    pub severity: Severity,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportStatistics {
    pub total: usize,
    pub critical: usize,
    pub important: usize,
    pub warning: usize,
    pub info: usize,
}

impl ReportStatistics {
    pub fn from_deviations(deviations: &[Deviation]) -> Self {
        let mut stats = Self {
            total: deviations.len(),
            ..Self::default()
        };
        for d in deviations {
            match d.severity {
                Severity::Critical => stats.critical += 1,
                Severity::Important => stats.important += 1,
                Severity::Warning => stats.warning += 1,
                Severity::Info => stats.info += 1,
            }
        }
        stats
    }
}

/// Result of mapping one machine onto a baseline. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineMapping {
    pub mapping_id: String,
    pub machine_id: MachineId,
    pub baseline_id: String,
    pub applied_profiles: Vec<Profile>,
    pub deviations: Vec<Deviation>,
    pub created_at: DateTime<Utc>,
}

/// Ephemeral comparison of one machine against the active baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonReport {
    pub report_id: String,
    pub baseline_id: String,
    pub machine_id: MachineId,
    pub statistics: ReportStatistics,
    pub differences: Vec<Deviation>,
    pub generated_at: DateTime<Utc>,
}

impl ComparisonReport {
    pub fn is_clean(&self) -> bool {
        self.differences.is_empty()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.differences.iter().map(|d| d.severity).min()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
