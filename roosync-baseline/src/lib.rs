//! # roosync-baseline
//!
//! The non-nominative baseline and how machines relate to it.
//!
//! - [`BaselineStore`]: the single active baseline (author, aggregate, migrate).
//! - [`DeviationMapper`]: per-machine deviations and applied profiles.
//! - [`ConfigPackages`]: versioned, hash-verified configuration packages.
//! - [`render_deviation`]: human-readable diff of one deviation.

pub mod consensus;
pub mod deviation;
pub mod error;
pub mod inventory;
pub mod migrate;
pub mod package;
pub mod render;
pub mod store;

pub use consensus::{aggregate, AggregationConfig, Consensus, ConsensusStrategy};
pub use deviation::{applied_profiles, compare, compute_deviations, severity_for, DeviationMapper};
pub use error::{BaselineError, CategoryConflict};
pub use inventory::{InventorySource, SharedInventorySource};
pub use migrate::{profiles_from_legacy, LegacyBaseline, MigrationOptions, MigrationOutcome};
pub use package::{ConfigPackages, PackageFile, PackageManifest, PackageVerification};
pub use render::render_deviation;
pub use store::{AggregationOutcome, BaselineStore};
