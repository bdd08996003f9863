//! Long-running reconciliation for one machine: commit-log auto-sync,
//! periodic compare/record/apply passes and a watcher on the shared baseline.

mod components;
mod error;
mod runtime;

pub use components::{reconcile_once, Components, TickSummary};
pub use error::DaemonError;
pub use runtime::{init_tracing, run, run_with_shutdown, start_blocking, DEBOUNCE_WINDOW};
