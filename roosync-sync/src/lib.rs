//! # roosync-sync
//!
//! The commit log and everything that acts on it.
//!
//! - [`CommitLog`]: append-only, hash-verified journal of change intents.
//! - [`RollbackManager`]: byte-exact snapshots of files around a change.
//! - [`ReconciliationPolicy`]: records deviations as entries and applies
//!   them through a [`ConfigApplier`] inside rollback points.

pub mod apply;
pub mod commit_log;
pub mod error;
pub mod policy;
pub mod rollback;

pub use apply::{ApplyOutcome, ApplyRequest, ApplyTarget, ConfigApplier, FileApplier};
pub use commit_log::{
    AppendReceipt, CommitLog, ConsistencyReport, InconsistentEntry, LatestCommits,
    PendingApplication, TransitionOutcome,
};
pub use error::{CommitLogError, PolicyError, RollbackError};
pub use policy::{decision_id_for, EntryApplyReport, ReconciliationPolicy};
pub use rollback::{BackedUpFile, RestoreReport, RollbackManager, RollbackPoint};
