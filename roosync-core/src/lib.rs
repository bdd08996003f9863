//! roosync core library: domain types, commit entry model, configuration,
//! shared-store layout and persistence primitives.
//!
//! Public API surface:
//! - [`types`]: machine ids, profiles, baselines, inventories, deviations
//! - [`commit`]: [`CommitEntry`], its tagged payload and lifecycle statuses
//! - [`digest`]: canonical JSON content hashing
//! - [`config`]: [`SyncConfig`] load / save / validate
//! - [`paths`]: shared-store and local directory layout
//! - [`persist`]: atomic JSON writes and the retry/timeout discipline

pub mod commit;
pub mod config;
pub mod digest;
pub mod error;
pub mod paths;
pub mod persist;
pub mod types;

pub use commit::{
    BaselineAction, BaselineCommit, CommitEntry, CommitLogState, CommitPayload, CommitStatistics,
    CommitStatus, CommitType, ConfigCommit, DecisionCommit, SyncCommit,
};
pub use config::SyncConfig;
pub use error::ConfigError;
pub use persist::{PersistError, RetryPolicy};
pub use types::{
    Baseline, ComparisonReport, Deviation, DeviationKind, InventoryModel, MachineId,
    MachineMapping, Profile, ProfileCategory, ProfileCompatibility, ProfileMetadata,
    ReportStatistics, Severity, Stability,
};
