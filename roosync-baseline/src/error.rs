//! Error types for roosync-baseline.

use std::path::PathBuf;

use thiserror::Error;

use roosync_core::{MachineId, PersistError, ProfileCategory};

/// A category that could not be included in an aggregated baseline.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryConflict {
    pub category: ProfileCategory,
    /// Weight fraction behind the best candidate value.
    pub support: f64,
    pub threshold: f64,
    /// Number of distinct values observed.
    pub candidates: usize,
}

/// All errors that can arise from baseline operations.
#[derive(Debug, Error)]
pub enum BaselineError {
    /// Malformed input; nothing was written.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("no active baseline; create, aggregate or migrate one first")]
    NoActiveBaseline,

    #[error("baseline '{requested}' is not the active baseline ('{active}')")]
    NotActive { requested: String, active: String },

    #[error("no category reached its confidence threshold ({} conflict(s))", conflicts.len())]
    NoConsensus { conflicts: Vec<CategoryConflict> },

    #[error("legacy baseline not found at {0}")]
    LegacyNotFound(PathBuf),

    #[error("legacy baseline at {path} has no recognizable category")]
    EmptyLegacy { path: PathBuf },

    #[error("no inventory for machine '{0}'")]
    InventoryNotFound(MachineId),

    #[error("no config package for machine '{machine}' version '{version}'")]
    PackageNotFound { machine: MachineId, version: String },

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
